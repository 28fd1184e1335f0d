//! IR Type System
//!
//! Types are plain values compared structurally: two descriptors built
//! from the same arguments are interchangeable, so the "registry" is just
//! the set of constructors below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a pointer in bytes on every target the engine models
pub const POINTER_SIZE: u64 = 8;

/// IR Type system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Void type (function returns only)
    Void,

    /// Integer with an explicit bit width
    Int(u32),

    /// IEEE single precision
    F32,

    /// IEEE double precision
    F64,

    /// Pointer type
    Ptr {
        pointee: Box<IrType>,
        address_space: u32,
    },

    /// Array type [size x element_type]
    Array { size: u64, element_type: Box<IrType> },

    /// Function type
    Function {
        return_type: Box<IrType>,
        param_types: Vec<IrType>,
        is_vararg: bool,
    },
}

impl IrType {
    pub fn int(width: u32) -> Self {
        debug_assert!(width > 0, "integer types need a non-zero width");
        IrType::Int(width)
    }

    pub fn pointer(element: IrType, address_space: u32) -> Self {
        IrType::Ptr {
            pointee: Box::new(element),
            address_space,
        }
    }

    pub fn function(return_type: IrType, param_types: Vec<IrType>, is_vararg: bool) -> Self {
        IrType::Function {
            return_type: Box::new(return_type),
            param_types,
            is_vararg,
        }
    }

    pub fn array(size: u64, element: IrType) -> Self {
        IrType::Array {
            size,
            element_type: Box::new(element),
        }
    }

    pub fn void() -> Self {
        IrType::Void
    }

    pub fn i1() -> Self {
        IrType::Int(1)
    }

    pub fn i8() -> Self {
        IrType::Int(8)
    }

    pub fn i32() -> Self {
        IrType::Int(32)
    }

    pub fn i64() -> Self {
        IrType::Int(64)
    }

    pub fn f64() -> Self {
        IrType::F64
    }

    /// Pointer to `self` in the default address space
    pub fn ptr_to(&self) -> Self {
        IrType::pointer(self.clone(), 0)
    }

    /// Get the size of this type in bytes
    pub fn size_in_bytes(&self) -> Option<u64> {
        match self {
            IrType::Void => None,
            IrType::Int(width) => Some(u64::from(width.div_ceil(8))),
            IrType::F32 => Some(4),
            IrType::F64 => Some(8),
            IrType::Ptr { .. } => Some(POINTER_SIZE),
            IrType::Array { size, element_type } => {
                element_type.size_in_bytes()?.checked_mul(*size)
            }
            IrType::Function { .. } => None, // Functions don't have size
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, IrType::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    /// Types a single SSA value can hold, and so can be loaded or stored
    pub fn is_first_class(&self) -> bool {
        self.is_integer() || self.is_float() || self.is_pointer()
    }

    pub fn int_width(&self) -> Option<u32> {
        match self {
            IrType::Int(width) => Some(*width),
            _ => None,
        }
    }

    /// Bit width of scalar types, used by cast validation
    pub fn scalar_bits(&self) -> Option<u64> {
        match self {
            IrType::Int(width) => Some(u64::from(*width)),
            IrType::F32 => Some(32),
            IrType::F64 => Some(64),
            IrType::Ptr { .. } => Some(POINTER_SIZE * 8),
            _ => None,
        }
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    pub fn address_space(&self) -> Option<u32> {
        match self {
            IrType::Ptr { address_space, .. } => Some(*address_space),
            _ => None,
        }
    }

    /// Get the element type for pointers and arrays
    pub fn element_type(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr { pointee, .. } => Some(pointee),
            IrType::Array { element_type, .. } => Some(element_type),
            _ => None,
        }
    }

    /// Split a function type into (return, params, vararg)
    pub fn as_function(&self) -> Option<(&IrType, &[IrType], bool)> {
        match self {
            IrType::Function { return_type, param_types, is_vararg } => {
                Some((return_type, param_types, *is_vararg))
            }
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(width) => write!(f, "i{width}"),
            IrType::F32 => write!(f, "float"),
            IrType::F64 => write!(f, "double"),
            IrType::Ptr { pointee, address_space: 0 } => write!(f, "{pointee}*"),
            IrType::Ptr { pointee, address_space } => write!(f, "{pointee} addrspace({address_space})*"),
            IrType::Array { size, element_type } => write!(f, "[{size} x {element_type}]"),
            IrType::Function { return_type, param_types, is_vararg } => {
                write!(f, "{return_type} (")?;
                for (i, param) in param_types.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{param}")?;
                }
                if *is_vararg {
                    if !param_types.is_empty() { write!(f, ", ")?; }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}
