//! Runtime values passed in and out of the engine

use kiln_ir::values::{sign_extend_bits, truncate_bits};
use kiln_ir::IrType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A primitive value crossing the engine boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GenericValue {
    /// Integer of `width` bits, stored zero-extended
    Int { width: u32, bits: u64 },
    /// Both `float` and `double`; `float` results are rounded through f32
    Float(f64),
    Pointer(u64),
    Void,
}

impl GenericValue {
    /// Integer of `width` bits holding the two's complement of `value`
    pub fn int(width: u32, value: i64) -> Self {
        GenericValue::Int {
            width,
            bits: truncate_bits(value as u64, width),
        }
    }

    pub fn i32(value: i32) -> Self {
        Self::int(32, i64::from(value))
    }

    /// Zero value of `ty`
    pub fn zero(ty: &IrType) -> Self {
        match ty {
            IrType::Int(width) => GenericValue::Int { width: *width, bits: 0 },
            IrType::F32 | IrType::F64 => GenericValue::Float(0.0),
            IrType::Ptr { .. } => GenericValue::Pointer(0),
            _ => GenericValue::Void,
        }
    }

    /// Rebuild a value of `ty` from raw bits (integers, pointers, IEEE floats)
    pub fn from_bits(ty: &IrType, bits: u64) -> Self {
        match ty {
            IrType::Int(width) => GenericValue::Int {
                width: *width,
                bits: truncate_bits(bits, *width),
            },
            IrType::F32 => GenericValue::Float(f64::from(f32::from_bits(bits as u32))),
            IrType::F64 => GenericValue::Float(f64::from_bits(bits)),
            IrType::Ptr { .. } => GenericValue::Pointer(bits),
            _ => GenericValue::Void,
        }
    }

    /// Raw bits as they would sit in memory for a value of `ty`
    pub fn to_bits(self, ty: &IrType) -> u64 {
        match (self, ty) {
            (GenericValue::Float(value), IrType::F32) => u64::from((value as f32).to_bits()),
            (GenericValue::Float(value), _) => value.to_bits(),
            (GenericValue::Int { bits, .. }, _) | (GenericValue::Pointer(bits), _) => bits,
            (GenericValue::Void, _) => 0,
        }
    }

    /// Whether this value can stand for an operand of type `ty`
    pub fn fits(&self, ty: &IrType) -> bool {
        match (self, ty) {
            (GenericValue::Int { width, .. }, IrType::Int(expected)) => width == expected,
            (GenericValue::Float(_), IrType::F32 | IrType::F64) => true,
            (GenericValue::Pointer(_), IrType::Ptr { .. }) => true,
            (GenericValue::Void, IrType::Void) => true,
            _ => false,
        }
    }

    /// Zero-extended integer or pointer bits
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            GenericValue::Int { bits, .. } | GenericValue::Pointer(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Sign-extended integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GenericValue::Int { width, bits } => Some(sign_extend_bits(*bits, *width)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GenericValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<u64> {
        match self {
            GenericValue::Pointer(address) => Some(*address),
            _ => None,
        }
    }
}

impl fmt::Display for GenericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenericValue::Int { width, bits } => write!(f, "i{width} {}", sign_extend_bits(*bits, *width)),
            GenericValue::Float(value) => write!(f, "{value}"),
            GenericValue::Pointer(address) => write!(f, "ptr {address:#x}"),
            GenericValue::Void => write!(f, "void"),
        }
    }
}
