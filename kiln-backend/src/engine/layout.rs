//! Frame and global layout
//!
//! Every `alloca` in a function gets a fixed offset in that function's
//! frame, computed once when the module is submitted.

use kiln_common::{ExecutionError, TempId};
use kiln_ir::{Function, Instruction, IrType};
use log::debug;
use std::collections::HashMap;

/// Natural alignment, capped at 8
pub fn align_of(ty: &IrType) -> u64 {
    match ty {
        IrType::Array { element_type, .. } => align_of(element_type),
        other => other.size_in_bytes().unwrap_or(1).clamp(1, 8).next_power_of_two(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLayout {
    /// Offset of each alloca result within the frame
    pub slots: HashMap<TempId, u64>,
    pub size: u64,
    pub align: u64,
}

impl FrameLayout {
    pub fn slot(&self, temp: TempId) -> Option<u64> {
        self.slots.get(&temp).copied()
    }
}

/// Lay out every alloca of `function` in one frame
pub fn calculate_frame_layout(function: &Function) -> Result<FrameLayout, ExecutionError> {
    let mut layout = FrameLayout {
        align: 1,
        ..FrameLayout::default()
    };

    for block in &function.blocks {
        for instruction in &block.instructions {
            if let Instruction::Alloca { result, alloc_type, .. } = instruction {
                let size = alloc_type.size_in_bytes().ok_or_else(|| {
                    ExecutionError::backend(format!("cannot allocate unsized {alloc_type} in '{}'", function.name))
                })?;
                let align = align_of(alloc_type);
                let offset = layout.size.div_ceil(align).checked_mul(align);
                let end = offset.and_then(|offset| offset.checked_add(size).map(|end| (offset, end)));
                let Some((offset, end)) = end else {
                    return Err(ExecutionError::backend(format!(
                        "frame of '{}' does not fit in the address space",
                        function.name
                    )));
                };
                layout.slots.insert(*result, offset);
                layout.size = end;
                layout.align = layout.align.max(align);
            }
        }
    }

    debug!(
        "Frame for '{}': {} slot(s), {} bytes",
        function.name,
        layout.slots.len(),
        layout.size
    );
    Ok(layout)
}
