//! IR Instructions
//!
//! Defines all instruction types available in the IR.

use kiln_common::{FunctionId, TempId};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::{CastKind, IrBinaryOp, IrType, Value};

/// Stable instruction opcodes, shared by the bitcode format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Alloca = 0x01,
    Store = 0x02,
    Load = 0x03,
    Binary = 0x04,
    Cast = 0x05,
    Call = 0x06,
    Return = 0x07,
}

impl Opcode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Opcode::Alloca),
            0x02 => Some(Opcode::Store),
            0x03 => Some(Opcode::Load),
            0x04 => Some(Opcode::Binary),
            0x05 => Some(Opcode::Cast),
            0x06 => Some(Opcode::Call),
            0x07 => Some(Opcode::Return),
            _ => None,
        }
    }
}

/// IR Instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Allocate stack memory for one value: result = alloca type
    Alloca {
        result: TempId,
        alloc_type: IrType,
        result_type: IrType, // Always pointer type
    },

    /// Store to memory: store value, ptr
    Store {
        value: Value,
        ptr: Value,
    },

    /// Load from memory: result = load ptr
    Load {
        result: TempId,
        ptr: Value,
        result_type: IrType,
    },

    /// Binary operation: result = op lhs, rhs
    Binary {
        result: TempId,
        op: IrBinaryOp,
        lhs: Value,
        rhs: Value,
        result_type: IrType,
    },

    /// Conversion: result = kind value to target_type
    Cast {
        result: TempId,
        kind: CastKind,
        value: Value,
        target_type: IrType,
    },

    /// Function call: result = call callee(args...)
    /// `callee_type` is the signature the call was built against.
    Call {
        result: Option<TempId>,
        callee: FunctionId,
        callee_type: IrType,
        args: Vec<Value>,
        result_type: IrType,
    },

    /// Return: ret value or ret void
    Return(Option<Value>),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Alloca { .. } => Opcode::Alloca,
            Instruction::Store { .. } => Opcode::Store,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Binary { .. } => Opcode::Binary,
            Instruction::Cast { .. } => Opcode::Cast,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Return(_) => Opcode::Return,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Instruction::Return(_))
    }

    /// The temp this instruction defines, with its type
    pub fn result(&self) -> Option<(TempId, &IrType)> {
        match self {
            Instruction::Alloca { result, result_type, .. }
            | Instruction::Load { result, result_type, .. }
            | Instruction::Binary { result, result_type, .. } => Some((*result, result_type)),
            Instruction::Cast { result, target_type, .. } => Some((*result, target_type)),
            Instruction::Call { result: Some(result), result_type, .. } => Some((*result, result_type)),
            Instruction::Call { result: None, .. } | Instruction::Store { .. } | Instruction::Return(_) => None,
        }
    }

    /// Every value this instruction reads, in operand order
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Alloca { .. } => Vec::new(),
            Instruction::Store { value, ptr } => vec![value, ptr],
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Cast { value, .. } => vec![value],
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Return(value) => value.iter().collect(),
        }
    }

    /// Render with the spelling chosen by `namer`
    pub fn render(&self, namer: &dyn ValueNamer) -> String {
        match self {
            Instruction::Alloca { result, alloc_type, .. } => {
                format!("{} = alloca {alloc_type}", namer.temp(*result))
            }
            Instruction::Store { value, ptr } => {
                format!("store {}, {}", namer.value(value), namer.value(ptr))
            }
            Instruction::Load { result, ptr, result_type } => {
                format!("{} = load {result_type}, {}", namer.temp(*result), namer.value(ptr))
            }
            Instruction::Binary { result, op, lhs, rhs, .. } => {
                format!("{} = {op} {}, {}", namer.temp(*result), namer.value(lhs), namer.value(rhs))
            }
            Instruction::Cast { result, kind, value, target_type } => {
                format!("{} = {kind} {} to {target_type}", namer.temp(*result), namer.value(value))
            }
            Instruction::Call { result, callee, args, result_type, .. } => {
                let args = args.iter().map(|a| namer.value(a)).collect::<Vec<_>>().join(", ");
                match result {
                    Some(result) => format!(
                        "{} = call {result_type} {}({args})",
                        namer.temp(*result),
                        namer.callee(*callee)
                    ),
                    None => format!("call {result_type} {}({args})", namer.callee(*callee)),
                }
            }
            Instruction::Return(Some(value)) => format!("ret {}", namer.value(value)),
            Instruction::Return(None) => "ret void".to_string(),
        }
    }
}

/// Spelling of values in textual listings
pub trait ValueNamer {
    fn temp(&self, id: TempId) -> String {
        format!("%{id}")
    }

    fn value(&self, value: &Value) -> String {
        value.to_string()
    }

    fn callee(&self, id: FunctionId) -> String {
        format!("@{id}")
    }
}

/// Numbered spelling with no module context
pub struct PlainNamer;

impl ValueNamer for PlainNamer {}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&PlainNamer))
    }
}
