//! IR Operations
//!
//! Defines binary operations and conversion kinds available in the IR.

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::IrType;

/// Binary operations in IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrBinaryOp {
    // Integer arithmetic
    Add, Sub, Mul,
    SDiv, UDiv,    // Signed/unsigned division
    SRem, URem,    // Signed/unsigned remainder

    // Bitwise
    And, Or, Xor,
    Shl, LShr, AShr, // Logical/arithmetic shift right

    // Floating point arithmetic
    FAdd, FSub, FMul, FDiv,
}

impl IrBinaryOp {
    pub const ALL: [IrBinaryOp; 17] = [
        IrBinaryOp::Add, IrBinaryOp::Sub, IrBinaryOp::Mul,
        IrBinaryOp::SDiv, IrBinaryOp::UDiv, IrBinaryOp::SRem, IrBinaryOp::URem,
        IrBinaryOp::And, IrBinaryOp::Or, IrBinaryOp::Xor,
        IrBinaryOp::Shl, IrBinaryOp::LShr, IrBinaryOp::AShr,
        IrBinaryOp::FAdd, IrBinaryOp::FSub, IrBinaryOp::FMul, IrBinaryOp::FDiv,
    ];

    pub fn is_float_op(self) -> bool {
        matches!(self, IrBinaryOp::FAdd | IrBinaryOp::FSub | IrBinaryOp::FMul | IrBinaryOp::FDiv)
    }

    /// Whether operands of type `ty` are acceptable for this opcode
    pub fn accepts(self, ty: &IrType) -> bool {
        if self.is_float_op() {
            ty.is_float()
        } else {
            ty.is_integer()
        }
    }
}

impl fmt::Display for IrBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            IrBinaryOp::Add => "add",
            IrBinaryOp::Sub => "sub",
            IrBinaryOp::Mul => "mul",
            IrBinaryOp::SDiv => "sdiv",
            IrBinaryOp::UDiv => "udiv",
            IrBinaryOp::SRem => "srem",
            IrBinaryOp::URem => "urem",
            IrBinaryOp::And => "and",
            IrBinaryOp::Or => "or",
            IrBinaryOp::Xor => "xor",
            IrBinaryOp::Shl => "shl",
            IrBinaryOp::LShr => "lshr",
            IrBinaryOp::AShr => "ashr",
            IrBinaryOp::FAdd => "fadd",
            IrBinaryOp::FSub => "fsub",
            IrBinaryOp::FMul => "fmul",
            IrBinaryOp::FDiv => "fdiv",
        };
        write!(f, "{op_str}")
    }
}

/// Conversion kinds accepted by the `cast` instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    Trunc,    // Narrow an integer
    ZExt,     // Zero extend
    SExt,     // Sign extend
    UIToFP,   // Unsigned integer to float
    SIToFP,   // Signed integer to float
    FPToUI,
    FPToSI,
    FPTrunc,
    FPExt,
    PtrToInt, // Pointer to integer cast
    IntToPtr, // Integer to pointer cast
    Bitcast,  // Reinterpret bits of equal width, or pointer to pointer
}

impl CastKind {
    pub const ALL: [CastKind; 12] = [
        CastKind::Trunc, CastKind::ZExt, CastKind::SExt,
        CastKind::UIToFP, CastKind::SIToFP, CastKind::FPToUI, CastKind::FPToSI,
        CastKind::FPTrunc, CastKind::FPExt,
        CastKind::PtrToInt, CastKind::IntToPtr, CastKind::Bitcast,
    ];

    /// Check whether converting `from` to `to` is meaningful for this kind
    pub fn is_valid(self, from: &IrType, to: &IrType) -> bool {
        let widths = (from.scalar_bits(), to.scalar_bits());
        match self {
            CastKind::Trunc => from.is_integer() && to.is_integer() && matches!(widths, (Some(a), Some(b)) if a > b),
            CastKind::ZExt | CastKind::SExt => {
                from.is_integer() && to.is_integer() && matches!(widths, (Some(a), Some(b)) if a < b)
            }
            CastKind::UIToFP | CastKind::SIToFP => from.is_integer() && to.is_float(),
            CastKind::FPToUI | CastKind::FPToSI => from.is_float() && to.is_integer(),
            CastKind::FPTrunc => from.is_float() && to.is_float() && matches!(widths, (Some(a), Some(b)) if a > b),
            CastKind::FPExt => from.is_float() && to.is_float() && matches!(widths, (Some(a), Some(b)) if a < b),
            CastKind::PtrToInt => from.is_pointer() && to.is_integer(),
            CastKind::IntToPtr => from.is_integer() && to.is_pointer(),
            CastKind::Bitcast => {
                if from.is_pointer() || to.is_pointer() {
                    from.is_pointer() && to.is_pointer() && from.address_space() == to.address_space()
                } else {
                    from.is_first_class() && to.is_first_class() && widths.0 == widths.1
                }
            }
        }
    }
}

impl fmt::Display for CastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            CastKind::Trunc => "trunc",
            CastKind::ZExt => "zext",
            CastKind::SExt => "sext",
            CastKind::UIToFP => "uitofp",
            CastKind::SIToFP => "sitofp",
            CastKind::FPToUI => "fptoui",
            CastKind::FPToSI => "fptosi",
            CastKind::FPTrunc => "fptrunc",
            CastKind::FPExt => "fpext",
            CastKind::PtrToInt => "ptrtoint",
            CastKind::IntToPtr => "inttoptr",
            CastKind::Bitcast => "bitcast",
        };
        write!(f, "{op_str}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_rules() {
        let i8t = IrType::i8();
        let i32t = IrType::i32();
        assert!(CastKind::Trunc.is_valid(&i32t, &i8t));
        assert!(!CastKind::Trunc.is_valid(&i8t, &i32t));
        assert!(CastKind::ZExt.is_valid(&i8t, &i32t));
        assert!(!CastKind::SExt.is_valid(&i32t, &i32t));
        assert!(CastKind::UIToFP.is_valid(&i32t, &IrType::F64));
        assert!(!CastKind::UIToFP.is_valid(&IrType::F64, &i32t));
        assert!(CastKind::FPExt.is_valid(&IrType::F32, &IrType::F64));
        assert!(CastKind::Bitcast.is_valid(&IrType::array(13, i8t.clone()).ptr_to(), &i8t.ptr_to()));
        assert!(!CastKind::Bitcast.is_valid(&i8t.ptr_to(), &IrType::pointer(IrType::i8(), 1)));
        assert!(CastKind::Bitcast.is_valid(&IrType::i64(), &IrType::F64));
        assert!(!CastKind::Bitcast.is_valid(&i32t, &IrType::F64));
        assert!(CastKind::PtrToInt.is_valid(&i8t.ptr_to(), &IrType::i64()));
    }

    #[test]
    fn test_binary_operand_classes() {
        assert!(IrBinaryOp::Add.accepts(&IrType::i32()));
        assert!(!IrBinaryOp::Add.accepts(&IrType::F64));
        assert!(IrBinaryOp::FMul.accepts(&IrType::F64));
        assert!(!IrBinaryOp::Shl.accepts(&IrType::i8().ptr_to()));
    }
}
