//! IR Value Representations
//!
//! Defines the typed operands instructions read: instruction results,
//! constants, globals, functions and parameters.

use kiln_common::{FunctionId, GlobalId, TempId};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::IrType;

/// What a value refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Result of an instruction
    Temp(TempId),

    /// Integer constant, stored as its low `width` bits
    ConstInt(u64),

    /// Floating point constant, stored as IEEE bits
    ConstFloat(u64),

    /// Null pointer constant
    Null,

    /// Address of a global
    Global(GlobalId),

    /// Address of a function
    Function(FunctionId),

    /// Incoming parameter of a function
    Argument { function: FunctionId, index: u32 },

    /// Undefined value (for uninitialized variables)
    Undef,
}

/// IR Value - a typed operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    pub kind: ValueKind,
    pub ty: IrType,
}

/// Mask `value` down to `width` bits
pub fn truncate_bits(value: u64, width: u32) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

/// Interpret the low `width` bits of `value` as a two's complement number
pub fn sign_extend_bits(value: u64, width: u32) -> i64 {
    if width == 0 || width >= 64 {
        value as i64
    } else {
        let shift = 64 - width;
        ((value << shift) as i64) >> shift
    }
}

impl Value {
    pub fn new(kind: ValueKind, ty: IrType) -> Self {
        Self { kind, ty }
    }

    /// Integer constant of type `ty`; the value is truncated to the width
    pub fn const_int(ty: IrType, value: i64) -> Self {
        let bits = match ty {
            IrType::Int(width) => truncate_bits(value as u64, width),
            _ => value as u64,
        };
        Self::new(ValueKind::ConstInt(bits), ty)
    }

    pub fn const_i32(value: i32) -> Self {
        Self::const_int(IrType::i32(), i64::from(value))
    }

    pub fn const_f64(value: f64) -> Self {
        Self::new(ValueKind::ConstFloat(value.to_bits()), IrType::F64)
    }

    pub fn null(pointer_type: IrType) -> Self {
        Self::new(ValueKind::Null, pointer_type)
    }

    pub fn undef(ty: IrType) -> Self {
        Self::new(ValueKind::Undef, ty)
    }

    pub fn temp(id: TempId, ty: IrType) -> Self {
        Self::new(ValueKind::Temp(id), ty)
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::ConstInt(_) | ValueKind::ConstFloat(_) | ValueKind::Null | ValueKind::Undef
        )
    }

    pub fn as_temp(&self) -> Option<TempId> {
        match self.kind {
            ValueKind::Temp(id) => Some(id),
            _ => None,
        }
    }

    /// Signed view of an integer constant
    pub fn as_const_int(&self) -> Option<i64> {
        match (&self.kind, &self.ty) {
            (ValueKind::ConstInt(bits), IrType::Int(width)) => Some(sign_extend_bits(*bits, *width)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Temp(id) => write!(f, "%{id}"),
            ValueKind::ConstInt(bits) => write!(f, "{bits}"),
            ValueKind::ConstFloat(bits) => write!(f, "{:e}", f64::from_bits(*bits)),
            ValueKind::Null => write!(f, "null"),
            ValueKind::Global(id) => write!(f, "@{id}"),
            ValueKind::Function(id) => write!(f, "@{id}"),
            ValueKind::Argument { index, .. } => write!(f, "%arg{index}"),
            ValueKind::Undef => write!(f, "undef"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.ty) {
            (ValueKind::ConstInt(bits), IrType::Int(width)) if *width > 1 => {
                write!(f, "{} {}", self.ty, sign_extend_bits(*bits, *width))
            }
            (kind, ty) => write!(f, "{ty} {kind}"),
        }
    }
}
