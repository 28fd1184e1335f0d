//! Basic Block Management
//! 
//! Defines basic blocks - ordered instruction sequences ending in a
//! terminator.

use kiln_common::LabelId;
use serde::{Deserialize, Serialize};
use crate::Instruction;

/// Basic Block - a sequence of instructions with a single entry and exit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: LabelId,
    /// Empty for anonymous blocks
    pub name: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(id: LabelId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            instructions: Vec::new(),
        }
    }
    
    pub fn add_instruction(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    /// Insert before the instruction currently at `index` (or append when
    /// `index` is the length)
    pub fn insert_instruction(&mut self, index: usize, instr: Instruction) {
        self.instructions.insert(index, instr);
    }
    
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }
    
    pub fn has_terminator(&self) -> bool {
        self.instructions.last().is_some_and(Instruction::is_terminator)
    }

    pub fn contains_terminator(&self) -> bool {
        self.instructions.iter().any(Instruction::is_terminator)
    }

    /// Name used in listings and diagnostics
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}
