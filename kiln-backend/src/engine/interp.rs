//! Instruction execution
//!
//! Functions are straight-line: a call runs the entry block of its
//! callee until the `ret`.

use super::{Binding, GenericValue, HostContext, HostFunction, JitEngine};
use kiln_common::{ExecutionError, FunctionId, TempId};
use kiln_ir::values::{sign_extend_bits, truncate_bits};
use kiln_ir::{CastKind, Function, Instruction, IrBinaryOp, IrType, Value, ValueKind};
use log::trace;
use std::collections::HashMap;
use std::rc::Rc;

struct Frame<'f> {
    function: &'f Function,
    args: &'f [GenericValue],
    /// Absolute address of each alloca result
    slots: HashMap<TempId, u64>,
    temps: HashMap<TempId, GenericValue>,
}

fn unsupported_width(ty: &IrType) -> ExecutionError {
    ExecutionError::backend(format!("{ty} is wider than the engine supports (64 bits)"))
}

/// Byte size of a first-class value the engine can move through memory
fn scalar_size(ty: &IrType) -> Result<u64, ExecutionError> {
    match ty.size_in_bytes() {
        Some(size) if size <= 8 && ty.is_first_class() => Ok(size),
        _ => Err(unsupported_width(ty)),
    }
}

fn int_width(ty: &IrType) -> Result<u32, ExecutionError> {
    match ty {
        IrType::Int(width) if (1..=64).contains(width) => Ok(*width),
        _ => Err(unsupported_width(ty)),
    }
}

fn float_of(ty: &IrType, wide: f64, narrow: f32) -> GenericValue {
    match ty {
        IrType::F32 => GenericValue::Float(f64::from(narrow)),
        _ => GenericValue::Float(wide),
    }
}

fn expect_bits(value: GenericValue) -> Result<u64, ExecutionError> {
    value
        .as_u64()
        .ok_or_else(|| ExecutionError::backend(format!("expected an integer or pointer, found {value}")))
}

fn expect_float(value: GenericValue) -> Result<f64, ExecutionError> {
    value
        .as_f64()
        .ok_or_else(|| ExecutionError::backend(format!("expected a floating point value, found {value}")))
}

fn integer_binary(op: IrBinaryOp, width: u32, x: u64, y: u64) -> Result<u64, ExecutionError> {
    let (sx, sy) = (sign_extend_bits(x, width), sign_extend_bits(y, width));
    let signed_min = sign_extend_bits(1u64 << (width - 1), width);
    let check_divisor = |signed: bool| {
        if y == 0 {
            Err(ExecutionError::backend(format!("{op} by zero")))
        } else if signed && sx == signed_min && sy == -1 {
            Err(ExecutionError::backend(format!("{op} overflows i{width}")))
        } else {
            Ok(())
        }
    };
    let check_shift = || {
        if y >= u64::from(width) {
            Err(ExecutionError::backend(format!("{op} by {y} exceeds the width of i{width}")))
        } else {
            Ok(())
        }
    };

    let bits = match op {
        IrBinaryOp::Add => x.wrapping_add(y),
        IrBinaryOp::Sub => x.wrapping_sub(y),
        IrBinaryOp::Mul => x.wrapping_mul(y),
        IrBinaryOp::UDiv => {
            check_divisor(false)?;
            x / y
        }
        IrBinaryOp::URem => {
            check_divisor(false)?;
            x % y
        }
        IrBinaryOp::SDiv => {
            check_divisor(true)?;
            sx.wrapping_div(sy) as u64
        }
        IrBinaryOp::SRem => {
            check_divisor(true)?;
            sx.wrapping_rem(sy) as u64
        }
        IrBinaryOp::And => x & y,
        IrBinaryOp::Or => x | y,
        IrBinaryOp::Xor => x ^ y,
        IrBinaryOp::Shl => {
            check_shift()?;
            x << y
        }
        IrBinaryOp::LShr => {
            check_shift()?;
            x >> y
        }
        IrBinaryOp::AShr => {
            check_shift()?;
            (sx >> y) as u64
        }
        IrBinaryOp::FAdd | IrBinaryOp::FSub | IrBinaryOp::FMul | IrBinaryOp::FDiv => {
            return Err(ExecutionError::backend(format!("{op} applied to i{width}")));
        }
    };
    Ok(truncate_bits(bits, width))
}

fn float_binary(op: IrBinaryOp, ty: &IrType, x: f64, y: f64) -> Result<GenericValue, ExecutionError> {
    let (nx, ny) = (x as f32, y as f32);
    let value = match op {
        IrBinaryOp::FAdd => float_of(ty, x + y, nx + ny),
        IrBinaryOp::FSub => float_of(ty, x - y, nx - ny),
        IrBinaryOp::FMul => float_of(ty, x * y, nx * ny),
        IrBinaryOp::FDiv => float_of(ty, x / y, nx / ny),
        _ => return Err(ExecutionError::backend(format!("{op} applied to {ty}"))),
    };
    Ok(value)
}

fn cast(kind: CastKind, value: GenericValue, from: &IrType, to: &IrType) -> Result<GenericValue, ExecutionError> {
    let result = match kind {
        CastKind::Trunc | CastKind::ZExt | CastKind::PtrToInt | CastKind::IntToPtr => {
            GenericValue::from_bits(to, expect_bits(value)?)
        }
        CastKind::SExt => {
            let bits = expect_bits(value)?;
            GenericValue::from_bits(to, sign_extend_bits(bits, int_width(from)?) as u64)
        }
        CastKind::UIToFP => {
            let bits = expect_bits(value)?;
            float_of(to, bits as f64, bits as f32)
        }
        CastKind::SIToFP => {
            let signed = sign_extend_bits(expect_bits(value)?, int_width(from)?);
            float_of(to, signed as f64, signed as f32)
        }
        CastKind::FPToUI => GenericValue::from_bits(to, expect_float(value)? as u64),
        CastKind::FPToSI => GenericValue::from_bits(to, expect_float(value)? as i64 as u64),
        CastKind::FPTrunc | CastKind::FPExt => {
            let x = expect_float(value)?;
            float_of(to, x, x as f32)
        }
        CastKind::Bitcast => GenericValue::from_bits(to, value.to_bits(from)),
    };
    Ok(result)
}

impl JitEngine<'_> {
    pub(super) fn call(
        &mut self,
        id: FunctionId,
        args: &[GenericValue],
        depth: usize,
    ) -> Result<GenericValue, ExecutionError> {
        if depth >= self.options.max_call_depth {
            return Err(ExecutionError::backend(format!(
                "call depth exceeded {} frames",
                self.options.max_call_depth
            )));
        }
        let module = self.module;
        let function = module
            .function(id)
            .map_err(|e| ExecutionError::backend(e.to_string()))?;
        let binding = self
            .bindings
            .get(id.index())
            .ok_or_else(|| ExecutionError::unresolved(&function.name, "function was never bound"))?;

        let (size, align, slots) = match binding {
            Binding::Host(host) => {
                let host = Rc::clone(host);
                return self.call_host(&host, function, args);
            }
            Binding::Defined(layout) => (layout.size, layout.align, layout.slots.clone()),
        };

        let mark = self.memory.stack_mark();
        let base = self.memory.push_frame(size, align)?;
        let mut frame = Frame {
            function,
            args,
            slots: slots.into_iter().map(|(temp, offset)| (temp, base + offset)).collect(),
            temps: HashMap::new(),
        };
        let result = self.run_entry(&mut frame, depth);
        self.memory.release(mark);
        result
    }

    fn call_host(
        &mut self,
        host: &HostFunction,
        function: &Function,
        args: &[GenericValue],
    ) -> Result<GenericValue, ExecutionError> {
        trace!("Calling host '{}' with {} argument(s)", function.name, args.len());
        let mut ctx = HostContext::new(&mut self.memory, &mut *self.output);
        let value = (**host)(&mut ctx, args)?;
        Self::host_result(value, &function.return_type)
    }

    fn run_entry(&mut self, frame: &mut Frame<'_>, depth: usize) -> Result<GenericValue, ExecutionError> {
        let function = frame.function;
        let entry = function
            .entry_block()
            .ok_or_else(|| ExecutionError::backend(format!("'{}' has no body", function.name)))?;
        for instr in &entry.instructions {
            trace!("{}: {instr}", function.name);
            if let Some(value) = self.step(frame, instr, depth)? {
                return Ok(value);
            }
        }
        Err(ExecutionError::backend(format!(
            "'{}' ran off the end of block '{}'",
            function.name,
            entry.label()
        )))
    }

    fn eval(&self, frame: &Frame<'_>, value: &Value) -> Result<GenericValue, ExecutionError> {
        match &value.kind {
            ValueKind::Temp(id) => frame
                .temps
                .get(id)
                .copied()
                .ok_or_else(|| ExecutionError::backend(format!("%{id} read before it was computed"))),
            ValueKind::ConstInt(bits) => {
                int_width(&value.ty)?;
                Ok(GenericValue::from_bits(&value.ty, *bits))
            }
            ValueKind::ConstFloat(bits) => {
                let wide = f64::from_bits(*bits);
                Ok(float_of(&value.ty, wide, wide as f32))
            }
            ValueKind::Null => Ok(GenericValue::Pointer(0)),
            ValueKind::Global(id) => self
                .global_addresses
                .get(id.index())
                .map(|address| GenericValue::Pointer(*address))
                .ok_or_else(|| ExecutionError::backend(format!("{id} was never placed"))),
            ValueKind::Function(id) => Ok(GenericValue::Pointer(Self::function_address(*id))),
            ValueKind::Argument { index, .. } => frame
                .args
                .get(*index as usize)
                .copied()
                .ok_or_else(|| ExecutionError::backend(format!("argument {index} is missing"))),
            ValueKind::Undef => Ok(GenericValue::zero(&value.ty)),
        }
    }

    fn address_of(&self, frame: &Frame<'_>, ptr: &Value) -> Result<u64, ExecutionError> {
        let value = self.eval(frame, ptr)?;
        value
            .as_pointer()
            .ok_or_else(|| ExecutionError::backend(format!("expected a pointer, found {value}")))
    }

    fn step(
        &mut self,
        frame: &mut Frame<'_>,
        instr: &Instruction,
        depth: usize,
    ) -> Result<Option<GenericValue>, ExecutionError> {
        let (temp, value) = match instr {
            Instruction::Alloca { result, .. } => {
                let address = frame.slots.get(result).copied().ok_or_else(|| {
                    ExecutionError::backend(format!("%{result} has no stack slot"))
                })?;
                (*result, GenericValue::Pointer(address))
            }
            Instruction::Store { value, ptr } => {
                let stored = self.eval(frame, value)?;
                let address = self.address_of(frame, ptr)?;
                let size = scalar_size(&value.ty)?;
                self.memory.store_uint(address, size, stored.to_bits(&value.ty))?;
                return Ok(None);
            }
            Instruction::Load { result, ptr, result_type } => {
                let address = self.address_of(frame, ptr)?;
                let bits = self.memory.load_uint(address, scalar_size(result_type)?)?;
                (*result, GenericValue::from_bits(result_type, bits))
            }
            Instruction::Binary { result, op, lhs, rhs, result_type } => {
                let (a, b) = (self.eval(frame, lhs)?, self.eval(frame, rhs)?);
                let value = if result_type.is_float() {
                    float_binary(*op, result_type, expect_float(a)?, expect_float(b)?)?
                } else {
                    let width = int_width(result_type)?;
                    let bits = integer_binary(*op, width, expect_bits(a)?, expect_bits(b)?)?;
                    GenericValue::Int { width, bits }
                };
                (*result, value)
            }
            Instruction::Cast { result, kind, value, target_type } => {
                let source = self.eval(frame, value)?;
                (*result, cast(*kind, source, &value.ty, target_type)?)
            }
            Instruction::Call { result, callee, args, .. } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(frame, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let returned = self.call(*callee, &values, depth + 1)?;
                match result {
                    Some(result) => (*result, returned),
                    None => return Ok(None),
                }
            }
            Instruction::Return(value) => {
                let returned = match value {
                    Some(value) => self.eval(frame, value)?,
                    None => GenericValue::Void,
                };
                return Ok(Some(returned));
            }
        };
        frame.temps.insert(temp, value);
        Ok(None)
    }
}
