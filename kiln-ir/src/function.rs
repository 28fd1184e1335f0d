//! Function Definitions
//! 
//! A function is a declaration (no blocks, resolved externally) or a
//! definition (one or more blocks, the first being the entry).

use kiln_common::{FunctionId, LabelId, TempId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::{BasicBlock, IrType, Value, ValueKind};

/// Linkage types for module symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    External,  // Visible to, or provided by, other modules
    Internal,  // Only visible within this module
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Option<String>,
    pub ty: IrType,
}

/// Function in IR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub return_type: IrType,
    pub params: Vec<Parameter>,
    pub is_vararg: bool,
    pub linkage: Linkage,
    pub blocks: Vec<BasicBlock>,
    /// Names given to instruction results, for listings
    pub value_names: BTreeMap<TempId, String>,
}

impl Function {
    /// Create a declaration from a function type
    pub fn declare(id: FunctionId, name: &str, fn_type: &IrType) -> Option<Self> {
        let (return_type, param_types, is_vararg) = fn_type.as_function()?;
        Some(Self {
            id,
            name: name.to_string(),
            return_type: return_type.clone(),
            params: param_types
                .iter()
                .map(|ty| Parameter { name: None, ty: ty.clone() })
                .collect(),
            is_vararg,
            linkage: Linkage::External,
            blocks: Vec::new(),
            value_names: BTreeMap::new(),
        })
    }

    /// The signature as a function type
    pub fn fn_type(&self) -> IrType {
        IrType::function(
            self.return_type.clone(),
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.is_vararg,
        )
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Value for the parameter at `index`
    pub fn param(&self, index: u32) -> Option<Value> {
        self.params.get(index as usize).map(|p| {
            Value::new(ValueKind::Argument { function: self.id, index }, p.ty.clone())
        })
    }

    pub fn set_param_name(&mut self, index: u32, name: &str) {
        if let Some(param) = self.params.get_mut(index as usize) {
            param.name = Some(name.to_string());
        }
    }
    
    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.push(block);
    }
    
    pub fn get_block(&self, id: LabelId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }
    
    pub fn get_block_mut(&mut self, id: LabelId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }
    
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn next_label(&self) -> LabelId {
        self.blocks.iter().map(|b| b.id + 1).max().unwrap_or(0)
    }

    /// Total instruction count over all blocks
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::len).sum()
    }
}
