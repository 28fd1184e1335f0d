//! IR Builder
//!
//! Provides utilities for constructing IR programmatically. A builder
//! borrows one module mutably and owns its insertion cursor, so every
//! build session is independent.
//!
//! Every `build_*` call validates its operands before touching the
//! module: a failed call leaves the block exactly as it was.

use kiln_common::{ConstructionError, FunctionId, TempId};
use log::trace;
use crate::{
    BlockRef, CastKind, Constant, Function, Instruction, IrBinaryOp, IrType, Module, Value,
};

/// Where in the cursor's block the next instruction goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    End,
    /// Before the instruction currently at this index
    Before(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub block: BlockRef,
    pub position: InsertPosition,
}

/// Builder for constructing IR
pub struct IrBuilder<'m> {
    module: &'m mut Module,
    cursor: Option<Cursor>,
}

impl<'m> IrBuilder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self { module, cursor: None }
    }

    pub fn module(&self) -> &Module {
        &*self.module
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn set_insert_point(&mut self, block: BlockRef, position: InsertPosition) -> Result<(), ConstructionError> {
        let target = self.module.block(block).ok_or_else(|| {
            ConstructionError::insert_point(format!("block {} does not exist in {}", block.label, block.function))
        })?;
        if let InsertPosition::Before(index) = position {
            if index > target.len() {
                return Err(ConstructionError::insert_point(format!(
                    "index {index} is past the end of block '{}' ({} instructions)",
                    target.label(),
                    target.len()
                )));
            }
        }
        self.cursor = Some(Cursor { block, position });
        Ok(())
    }

    pub fn position_at_end(&mut self, block: BlockRef) -> Result<(), ConstructionError> {
        self.set_insert_point(block, InsertPosition::End)
    }

    pub fn clear_insert_point(&mut self) {
        self.cursor = None;
    }

    /// Append a block to `function` without moving the cursor
    pub fn append_block(&mut self, function: FunctionId, label: &str) -> Result<BlockRef, ConstructionError> {
        self.module.append_block(function, label)
    }

    pub fn param(&self, function: FunctionId, index: u32) -> Result<Value, ConstructionError> {
        let func = self.module.function(function)?;
        func.param(index).ok_or_else(|| ConstructionError::UnknownEntity {
            kind: "parameter".to_string(),
            name: format!("{index} of '{}'", func.name),
        })
    }

    fn require_cursor(&self) -> Result<Cursor, ConstructionError> {
        self.cursor
            .ok_or_else(|| ConstructionError::insert_point("builder has no insert point"))
    }

    fn cursor_function(&self) -> Result<&Function, ConstructionError> {
        let cursor = self.require_cursor()?;
        self.module.function(cursor.block.function)
    }

    /// Check that `instr` may be placed at the cursor
    fn check_placement(&self, terminator: bool) -> Result<Cursor, ConstructionError> {
        let cursor = self.require_cursor()?;
        let block = self
            .module
            .block(cursor.block)
            .ok_or_else(|| ConstructionError::insert_point("cursor block no longer exists"))?;

        match cursor.position {
            InsertPosition::End if block.has_terminator() => Err(ConstructionError::terminator(
                &block.label(),
                "block already ends in a terminator",
            )),
            InsertPosition::Before(index) if index > block.len() => Err(ConstructionError::insert_point(
                format!("index {index} is past the end of block '{}'", block.label()),
            )),
            InsertPosition::Before(index) if terminator && index < block.len() => Err(
                ConstructionError::terminator(&block.label(), "a terminator must be the last instruction"),
            ),
            InsertPosition::Before(index) if block.has_terminator() && index == block.len() => {
                Err(ConstructionError::terminator(&block.label(), "block already ends in a terminator"))
            }
            _ => Ok(cursor),
        }
    }

    /// Insert at the cursor and advance it past the new instruction
    fn insert(&mut self, cursor: Cursor, instr: Instruction) -> Result<(), ConstructionError> {
        trace!("Inserting '{instr}' into block {} of {}", cursor.block.label, cursor.block.function);
        let block = self
            .module
            .block_mut(cursor.block)
            .ok_or_else(|| ConstructionError::insert_point("cursor block no longer exists"))?;
        match cursor.position {
            InsertPosition::End => block.add_instruction(instr),
            InsertPosition::Before(index) => {
                block.insert_instruction(index, instr);
                self.cursor = Some(Cursor {
                    block: cursor.block,
                    position: InsertPosition::Before(index + 1),
                });
            }
        }
        Ok(())
    }

    fn fresh_result(&mut self, function: FunctionId, name: &str) -> Result<TempId, ConstructionError> {
        let temp = self.module.fresh_temp();
        if !name.is_empty() {
            let func = self.module.function_mut(function)?;
            let taken = |candidate: &str| func.value_names.values().any(|n| n == candidate)
                || func.params.iter().any(|p| p.name.as_deref() == Some(candidate));
            let unique = if taken(name) {
                (1u32..)
                    .map(|n| format!("{name}{n}"))
                    .find(|candidate| !taken(candidate))
                    .unwrap_or_else(|| name.to_string())
            } else {
                name.to_string()
            };
            func.value_names.insert(temp, unique);
        }
        Ok(temp)
    }

    /// Reserve stack storage for one value of `ty`; yields a `ty*`
    pub fn build_alloca(&mut self, ty: &IrType, name: &str) -> Result<Value, ConstructionError> {
        let cursor = self.check_placement(false)?;
        if ty.size_in_bytes().is_none() {
            return Err(ConstructionError::type_mismatch("alloca", "a sized type", ty));
        }
        let result_type = ty.ptr_to();
        let result = self.fresh_result(cursor.block.function, name)?;
        self.insert(cursor, Instruction::Alloca {
            result,
            alloc_type: ty.clone(),
            result_type: result_type.clone(),
        })?;
        Ok(Value::temp(result, result_type))
    }

    pub fn build_store(&mut self, value: &Value, ptr: &Value) -> Result<(), ConstructionError> {
        let cursor = self.check_placement(false)?;
        let pointee = ptr
            .ty
            .pointee()
            .ok_or_else(|| ConstructionError::type_mismatch("store destination", "a pointer", &ptr.ty))?;
        if !value.ty.is_first_class() {
            return Err(ConstructionError::type_mismatch("store", "a first-class value", &value.ty));
        }
        if *pointee != value.ty {
            return Err(ConstructionError::type_mismatch(
                "store",
                format!("a pointer to {}", value.ty),
                &ptr.ty,
            ));
        }
        self.insert(cursor, Instruction::Store {
            value: value.clone(),
            ptr: ptr.clone(),
        })
    }

    /// Load the value `ptr` points at
    pub fn build_load(&mut self, ptr: &Value, name: &str) -> Result<Value, ConstructionError> {
        let cursor = self.check_placement(false)?;
        let pointee = ptr
            .ty
            .pointee()
            .ok_or_else(|| ConstructionError::type_mismatch("load source", "a pointer", &ptr.ty))?
            .clone();
        if !pointee.is_first_class() {
            return Err(ConstructionError::type_mismatch("load", "a pointer to a first-class type", &ptr.ty));
        }
        let result = self.fresh_result(cursor.block.function, name)?;
        self.insert(cursor, Instruction::Load {
            result,
            ptr: ptr.clone(),
            result_type: pointee.clone(),
        })?;
        Ok(Value::temp(result, pointee))
    }

    pub fn build_binary(
        &mut self,
        op: IrBinaryOp,
        lhs: &Value,
        rhs: &Value,
        name: &str,
    ) -> Result<Value, ConstructionError> {
        let cursor = self.check_placement(false)?;
        if lhs.ty != rhs.ty {
            return Err(ConstructionError::type_mismatch(&format!("{op} operands"), &lhs.ty, &rhs.ty));
        }
        if !op.accepts(&lhs.ty) {
            let class = if op.is_float_op() { "a floating point type" } else { "an integer type" };
            return Err(ConstructionError::type_mismatch(&format!("{op} operands"), class, &lhs.ty));
        }
        let result_type = lhs.ty.clone();
        let result = self.fresh_result(cursor.block.function, name)?;
        self.insert(cursor, Instruction::Binary {
            result,
            op,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            result_type: result_type.clone(),
        })?;
        Ok(Value::temp(result, result_type))
    }

    pub fn build_cast(
        &mut self,
        kind: CastKind,
        value: &Value,
        target_type: &IrType,
        name: &str,
    ) -> Result<Value, ConstructionError> {
        let cursor = self.check_placement(false)?;
        if !kind.is_valid(&value.ty, target_type) {
            return Err(ConstructionError::InvalidCast {
                kind: kind.to_string(),
                from: value.ty.to_string(),
                to: target_type.to_string(),
            });
        }
        let result = self.fresh_result(cursor.block.function, name)?;
        self.insert(cursor, Instruction::Cast {
            result,
            kind,
            value: value.clone(),
            target_type: target_type.clone(),
        })?;
        Ok(Value::temp(result, target_type.clone()))
    }

    /// Add `text` plus a terminating NUL as an internal `[N x i8]` constant.
    /// Yields the global's address; no instruction is inserted.
    pub fn build_global_string(&mut self, text: &str, name: &str) -> Result<Value, ConstructionError> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let ty = IrType::array(bytes.len() as u64, IrType::i8());
        let name = if name.is_empty() { ".str" } else { name };
        let id = self.module.add_global_constant(name, &ty, Constant::Bytes(bytes))?;
        self.module
            .global_address(id)
            .ok_or_else(|| ConstructionError::UnknownEntity {
                kind: "global".to_string(),
                name: id.to_string(),
            })
    }

    /// Global string plus a bitcast of its address to `i8*` at the cursor
    pub fn build_global_string_ptr(&mut self, text: &str, name: &str) -> Result<Value, ConstructionError> {
        self.check_placement(false)?;
        let global = self.build_global_string(text, name)?;
        self.build_cast(CastKind::Bitcast, &global, &IrType::i8().ptr_to(), "")
    }

    /// Call `callee`; void calls yield `None`
    pub fn build_call(
        &mut self,
        callee: FunctionId,
        args: &[Value],
        name: &str,
    ) -> Result<Option<Value>, ConstructionError> {
        let cursor = self.check_placement(false)?;
        let target = self.module.function(callee)?;
        let callee_type = target.fn_type();

        let fixed = target.params.len();
        let arity_ok = if target.is_vararg { args.len() >= fixed } else { args.len() == fixed };
        if !arity_ok {
            return Err(ConstructionError::ArityMismatch {
                callee: target.name.clone(),
                expected: if target.is_vararg { format!("at least {fixed}") } else { fixed.to_string() },
                found: args.len(),
            });
        }
        for (i, (param, arg)) in target.params.iter().zip(args).enumerate() {
            if param.ty != arg.ty {
                return Err(ConstructionError::type_mismatch(
                    &format!("argument {i} of call to '{}'", target.name),
                    &param.ty,
                    &arg.ty,
                ));
            }
        }
        if let Some(extra) = args[fixed..].iter().find(|a| !a.ty.is_first_class()) {
            return Err(ConstructionError::type_mismatch(
                &format!("variadic argument of call to '{}'", target.name),
                "a first-class value",
                &extra.ty,
            ));
        }

        let result_type = target.return_type.clone();
        let result = if result_type.is_void() {
            None
        } else {
            Some(self.fresh_result(cursor.block.function, name)?)
        };
        self.insert(cursor, Instruction::Call {
            result,
            callee,
            callee_type,
            args: args.to_vec(),
            result_type: result_type.clone(),
        })?;
        Ok(result.map(|id| Value::temp(id, result_type)))
    }

    /// Terminate the cursor's block
    pub fn build_return(&mut self, value: Option<&Value>) -> Result<(), ConstructionError> {
        let cursor = self.check_placement(true)?;
        let function = self.cursor_function()?;
        let block_label = self
            .module
            .block(cursor.block)
            .map(|b| b.label())
            .unwrap_or_default();
        match (value, &function.return_type) {
            (None, IrType::Void) => {}
            (None, expected) => {
                return Err(ConstructionError::terminator(
                    &block_label,
                    format!("'{}' must return a value of type {expected}", function.name),
                ));
            }
            (Some(value), IrType::Void) => {
                return Err(ConstructionError::terminator(
                    &block_label,
                    format!("'{}' returns void but a value of type {} was given", function.name, value.ty),
                ));
            }
            (Some(value), expected) if value.ty != *expected => {
                return Err(ConstructionError::terminator(
                    &block_label,
                    format!("'{}' returns {expected} but a value of type {} was given", function.name, value.ty),
                ));
            }
            _ => {}
        }
        self.insert(cursor, Instruction::Return(value.cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Linkage;
    use pretty_assertions::assert_eq;

    fn main_with_entry(module: &mut Module) -> (FunctionId, BlockRef) {
        let main = module
            .declare_function("main", &IrType::function(IrType::i32(), vec![], false))
            .unwrap();
        let entry = module.append_block(main, "entry").unwrap();
        (main, entry)
    }

    #[test]
    fn test_no_insert_point() {
        let mut module = Module::new("m");
        let mut builder = IrBuilder::new(&mut module);
        let err = builder.build_alloca(&IrType::i32(), "x").unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidInsertPoint { .. }));
    }

    #[test]
    fn test_insert_before_advances_cursor() {
        let mut module = Module::new("m");
        let (_, entry) = main_with_entry(&mut module);
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();
        builder.build_return(Some(&Value::const_i32(0))).unwrap();

        builder.set_insert_point(entry, InsertPosition::Before(0)).unwrap();
        let a = builder.build_alloca(&IrType::i32(), "a").unwrap();
        builder.build_store(&Value::const_i32(1), &a).unwrap();
        assert_eq!(builder.cursor().unwrap().position, InsertPosition::Before(2));

        let block = module.block(entry).unwrap();
        assert_eq!(block.len(), 3);
        assert!(block.has_terminator());
    }

    #[test]
    fn test_value_names_are_uniqued() {
        let mut module = Module::new("m");
        let (main, entry) = main_with_entry(&mut module);
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();
        let first = builder.build_alloca(&IrType::i32(), "x").unwrap();
        let second = builder.build_alloca(&IrType::i32(), "x").unwrap();

        let names = &module.function(main).unwrap().value_names;
        assert_eq!(names[&first.as_temp().unwrap()], "x");
        assert_eq!(names[&second.as_temp().unwrap()], "x1");
    }

    #[test]
    fn test_binary_rejects_mixed_operands() {
        let mut module = Module::new("m");
        let (_, entry) = main_with_entry(&mut module);
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();
        let err = builder
            .build_binary(IrBinaryOp::Add, &Value::const_i32(1), &Value::const_f64(2.0), "s")
            .unwrap_err();
        assert!(matches!(err, ConstructionError::TypeMismatch { .. }));
        let err = builder
            .build_binary(IrBinaryOp::FAdd, &Value::const_i32(1), &Value::const_i32(2), "s")
            .unwrap_err();
        assert!(matches!(err, ConstructionError::TypeMismatch { .. }));
        assert!(module.block(entry).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_cast() {
        let mut module = Module::new("m");
        let (_, entry) = main_with_entry(&mut module);
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();
        let err = builder
            .build_cast(CastKind::Trunc, &Value::const_int(IrType::i8(), 1), &IrType::i32(), "")
            .unwrap_err();
        assert_eq!(
            err,
            ConstructionError::InvalidCast {
                kind: "trunc".to_string(),
                from: "i8".to_string(),
                to: "i32".to_string(),
            }
        );
    }

    #[test]
    fn test_call_arity() {
        let mut module = Module::new("m");
        let (_, entry) = main_with_entry(&mut module);
        let printf = module
            .declare_function("printf", &IrType::function(IrType::i32(), vec![IrType::i8().ptr_to()], true))
            .unwrap();
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();

        let err = builder.build_call(printf, &[], "").unwrap_err();
        assert_eq!(
            err,
            ConstructionError::ArityMismatch {
                callee: "printf".to_string(),
                expected: "at least 1".to_string(),
                found: 0,
            }
        );

        let fmt = builder.build_global_string_ptr("%d\n", "fmt").unwrap();
        let result = builder.build_call(printf, &[fmt, Value::const_i32(4)], "n").unwrap();
        assert_eq!(result.unwrap().ty, IrType::i32());
    }

    #[test]
    fn test_global_string() {
        let mut module = Module::new("m");
        let mut builder = IrBuilder::new(&mut module);
        let first = builder.build_global_string("hi", "").unwrap();
        let second = builder.build_global_string("hi", "").unwrap();
        assert_eq!(first.ty, IrType::array(3, IrType::i8()).ptr_to());
        assert_ne!(first, second);
        assert_eq!(module.globals[0].name, ".str");
        assert_eq!(module.globals[1].name, ".str.1");
        assert_eq!(module.globals[1].linkage, Linkage::Internal);
        assert_eq!(module.globals[0].initializer, Some(Constant::Bytes(b"hi\0".to_vec())));
    }

    #[test]
    fn test_return_type_checked() {
        let mut module = Module::new("m");
        let (_, entry) = main_with_entry(&mut module);
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();
        assert!(matches!(
            builder.build_return(None),
            Err(ConstructionError::TerminatorMismatch { .. })
        ));
        assert!(matches!(
            builder.build_return(Some(&Value::const_f64(1.0))),
            Err(ConstructionError::TerminatorMismatch { .. })
        ));
        assert!(module.block(entry).unwrap().is_empty());
    }
}
