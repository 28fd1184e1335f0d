//! Module verification
//!
//! The verifier walks a finished module and collects every structural
//! defect it finds; it never stops at the first one. A module that
//! verifies can be handed to the execution engine or the bitcode writer.

use kiln_common::{DiagnosticReporter, FunctionId, IrLocation, TempId, VerificationError};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use crate::{BasicBlock, Function, Instruction, IrType, Linkage, Module, Value, ValueKind};

/// A module that passed verification.
///
/// Holding one keeps the module borrowed, so it cannot change while a
/// consumer relies on the verdict.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedModule<'m> {
    module: &'m Module,
}

impl<'m> VerifiedModule<'m> {
    pub fn module(&self) -> &'m Module {
        self.module
    }
}

impl Deref for VerifiedModule<'_> {
    type Target = Module;

    fn deref(&self) -> &Module {
        self.module
    }
}

/// Check `module`, reporting every defect
pub fn verify(module: &Module) -> Result<(), VerificationError> {
    debug!("Verifying module '{}'", module.name);
    let mut verifier = Verifier {
        module,
        reporter: DiagnosticReporter::new(),
        defined: HashSet::new(),
    };
    verifier.run();
    debug!("Verification of '{}': {}", module.name, verifier.reporter.summary());
    verifier.reporter.finish()
}

/// Check `module` and hand back a frozen view of it
pub fn verify_module(module: &Module) -> Result<VerifiedModule<'_>, VerificationError> {
    verify(module)?;
    Ok(VerifiedModule { module })
}

struct Verifier<'a> {
    module: &'a Module,
    reporter: DiagnosticReporter,
    /// Temps defined anywhere so far; ids are module-unique
    defined: HashSet<TempId>,
}

/// Per-block view of the temps an operand may refer to
type Scope = HashMap<TempId, IrType>;

impl<'a> Verifier<'a> {
    fn run(&mut self) {
        let module = self.module;
        for (index, global) in module.globals.iter().enumerate() {
            if global.id.index() != index {
                self.reporter.error(
                    format!("global '{}' has id {} but sits at index {index}", global.name, global.id),
                    IrLocation::module(),
                );
            }
            match &global.initializer {
                Some(init) if !init.matches(&global.value_type) => self.reporter.error(
                    format!("initializer of '@{}' does not fit its type {}", global.name, global.value_type),
                    IrLocation::module(),
                ),
                None if global.linkage == Linkage::Internal => self.reporter.error(
                    format!("internal global '@{}' has no initializer and can never be resolved", global.name),
                    IrLocation::module(),
                ),
                _ => {}
            }
        }

        for (index, function) in module.functions.iter().enumerate() {
            if function.id.index() != index {
                self.reporter.error(
                    format!("function '{}' has id {} but sits at index {index}", function.name, function.id),
                    IrLocation::function(&function.name),
                );
            }
            if function.is_declaration() {
                if function.linkage == Linkage::Internal {
                    self.reporter.error(
                        format!("internal function '@{}' has no body and can never be resolved", function.name),
                        IrLocation::function(&function.name),
                    );
                }
                continue;
            }
            self.verify_function(function);
        }
    }

    fn verify_function(&mut self, function: &'a Function) {
        trace!("Verifying function '{}'", function.name);
        let mut entry_scope = Scope::new();

        for (position, block) in function.blocks.iter().enumerate() {
            let is_entry = position == 0;
            if !is_entry {
                self.reporter.warning(
                    format!("block '{}' is unreachable: only the entry block runs", block.label()),
                    IrLocation::block(&function.name, &block.label()),
                );
            }
            let mut scope = if is_entry { Scope::new() } else { entry_scope.clone() };
            self.verify_block(function, block, &mut scope);
            if is_entry {
                entry_scope = scope;
            }
        }
    }

    fn verify_block(&mut self, function: &'a Function, block: &'a BasicBlock, scope: &mut Scope) {
        let label = block.label();
        if block.is_empty() {
            self.reporter.error(
                format!("block '{label}' is empty and has no terminator"),
                IrLocation::block(&function.name, &label),
            );
            return;
        }

        let last = block.len() - 1;
        for (index, instr) in block.instructions.iter().enumerate() {
            let location = IrLocation::instruction(&function.name, &label, index);
            if instr.is_terminator() && index != last {
                self.reporter.error(
                    format!("terminator '{instr}' is followed by more instructions"),
                    location.clone(),
                );
            }

            for operand in instr.operands() {
                self.check_operand(function, operand, scope, &location);
            }
            self.check_instruction(function, instr, &location);

            if let Some((temp, ty)) = instr.result() {
                if !self.defined.insert(temp) {
                    self.reporter.error(format!("%{temp} is defined more than once"), location.clone());
                }
                scope.insert(temp, ty.clone());
            }
        }

        if !block.has_terminator() {
            self.reporter.error(
                format!("block '{label}' does not end in a terminator"),
                IrLocation::block(&function.name, &label),
            );
        }
    }

    fn check_operand(&mut self, function: &Function, value: &Value, scope: &Scope, location: &IrLocation) {
        let problem = match &value.kind {
            ValueKind::Temp(id) => match scope.get(id) {
                None => Some(format!("%{id} is used before it is defined in this block or the entry block")),
                Some(ty) if *ty != value.ty => Some(format!("%{id} is used as {} but was defined as {ty}", value.ty)),
                Some(_) => None,
            },
            ValueKind::Argument { function: owner, index } => {
                if *owner != function.id {
                    Some(format!("parameter {index} of {owner} used inside '{}'", function.name))
                } else {
                    match function.params.get(*index as usize) {
                        None => Some(format!("'{}' has no parameter {index}", function.name)),
                        Some(param) if param.ty != value.ty => Some(format!(
                            "parameter {index} is used as {} but declared as {}",
                            value.ty, param.ty
                        )),
                        Some(_) => None,
                    }
                }
            }
            ValueKind::Global(id) => match self.module.global(*id) {
                None => Some(format!("reference to unknown {id}")),
                Some(global) if global.value_type.ptr_to() != value.ty => Some(format!(
                    "'@{}' is used as {} but its address has type {}",
                    global.name,
                    value.ty,
                    global.value_type.ptr_to()
                )),
                Some(_) => None,
            },
            ValueKind::Function(id) => match self.module.functions.get(id.index()) {
                None => Some(format!("reference to unknown {id}")),
                Some(target) if target.fn_type().ptr_to() != value.ty => Some(format!(
                    "'@{}' is used as {} but its address has type {}",
                    target.name,
                    value.ty,
                    target.fn_type().ptr_to()
                )),
                Some(_) => None,
            },
            ValueKind::ConstInt(_) if !value.ty.is_integer() => {
                Some(format!("integer constant has non-integer type {}", value.ty))
            }
            ValueKind::ConstFloat(_) if !value.ty.is_float() => {
                Some(format!("floating point constant has type {}", value.ty))
            }
            ValueKind::Null if !value.ty.is_pointer() => Some(format!("null constant has type {}", value.ty)),
            ValueKind::Undef if !value.ty.is_first_class() => Some(format!("undef has type {}", value.ty)),
            _ => None,
        };
        if let Some(message) = problem {
            self.reporter.error(message, location.clone());
        }
    }

    fn check_instruction(&mut self, function: &Function, instr: &Instruction, location: &IrLocation) {
        let problem = match instr {
            Instruction::Alloca { alloc_type, result_type, .. } => {
                if alloc_type.size_in_bytes().is_none() {
                    Some(format!("alloca of unsized type {alloc_type}"))
                } else if *result_type != alloc_type.ptr_to() {
                    Some(format!("alloca of {alloc_type} yields {result_type}"))
                } else {
                    None
                }
            }
            Instruction::Store { value, ptr } => match ptr.ty.pointee() {
                None => Some(format!("store destination has non-pointer type {}", ptr.ty)),
                Some(pointee) if *pointee != value.ty => {
                    Some(format!("store of {} through {}", value.ty, ptr.ty))
                }
                Some(_) if !value.ty.is_first_class() => Some(format!("store of non-first-class {}", value.ty)),
                Some(_) => None,
            },
            Instruction::Load { ptr, result_type, .. } => match ptr.ty.pointee() {
                None => Some(format!("load source has non-pointer type {}", ptr.ty)),
                Some(pointee) if pointee != result_type => {
                    Some(format!("load of {result_type} through {}", ptr.ty))
                }
                Some(_) if !result_type.is_first_class() => Some(format!("load of non-first-class {result_type}")),
                Some(_) => None,
            },
            Instruction::Binary { op, lhs, rhs, result_type, .. } => {
                if lhs.ty != rhs.ty || lhs.ty != *result_type {
                    Some(format!("{op} mixes {}, {} and {result_type}", lhs.ty, rhs.ty))
                } else if !op.accepts(&lhs.ty) {
                    Some(format!("{op} does not accept {}", lhs.ty))
                } else {
                    None
                }
            }
            Instruction::Cast { kind, value, target_type, .. } => {
                if kind.is_valid(&value.ty, target_type) {
                    None
                } else {
                    Some(format!("invalid {kind} from {} to {target_type}", value.ty))
                }
            }
            Instruction::Call { result, callee, callee_type, args, result_type } => {
                self.check_call(*result, *callee, callee_type, args, result_type)
            }
            Instruction::Return(value) => {
                let matches = match value {
                    Some(value) => value.ty == function.return_type,
                    None => function.return_type.is_void(),
                };
                if matches {
                    None
                } else {
                    let found = value.as_ref().map_or("void".to_string(), |v| v.ty.to_string());
                    Some(format!("'{}' returns {} but ret carries {found}", function.name, function.return_type))
                }
            }
        };
        if let Some(message) = problem {
            self.reporter.error(message, location.clone());
        }
    }

    fn check_call(
        &self,
        result: Option<TempId>,
        callee: FunctionId,
        callee_type: &IrType,
        args: &[Value],
        result_type: &IrType,
    ) -> Option<String> {
        let Some(target) = self.module.functions.get(callee.index()) else {
            return Some(format!("call to unknown {callee}"));
        };
        let signature = target.fn_type();
        if signature != *callee_type {
            return Some(format!(
                "call to '@{}' was built against {callee_type} but the callee is now {signature}",
                target.name
            ));
        }
        let fixed = target.params.len();
        if args.len() < fixed || (!target.is_vararg && args.len() != fixed) {
            return Some(format!("call to '@{}' passes {} argument(s), expects {fixed}", target.name, args.len()));
        }
        if let Some((i, (param, arg))) = target
            .params
            .iter()
            .zip(args)
            .enumerate()
            .find(|(_, (param, arg))| param.ty != arg.ty)
        {
            return Some(format!(
                "argument {i} of call to '@{}' is {} but the parameter is {}",
                target.name, arg.ty, param.ty
            ));
        }
        if *result_type != target.return_type {
            return Some(format!("call to '@{}' yields {result_type}, callee returns {}", target.name, target.return_type));
        }
        if result.is_some() == result_type.is_void() {
            return Some(format!("call to '@{}' has a result that disagrees with its {result_type} return", target.name));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Constant, GlobalId, IrBuilder};

    #[test]
    fn test_empty_module_verifies() {
        assert!(verify(&Module::new("empty")).is_ok());
    }

    #[test]
    fn test_empty_block_reported() {
        let mut module = Module::new("m");
        let f = module
            .declare_function("f", &IrType::function(IrType::void(), vec![], false))
            .unwrap();
        module.append_block(f, "entry").unwrap();
        let err = verify(&module).unwrap_err();
        assert_eq!(err.for_block("f", "entry").count(), 1);
    }

    #[test]
    fn test_internal_declaration_unresolved() {
        let mut module = Module::new("m");
        let f = module
            .declare_function("helper", &IrType::function(IrType::void(), vec![], false))
            .unwrap();
        module.set_linkage(f, Linkage::Internal).unwrap();
        let err = verify(&module).unwrap_err();
        assert!(err.diagnostics[0].message.contains("never be resolved"));
    }

    #[test]
    fn test_internal_global_declaration_unresolved() {
        let mut module = Module::new("m");
        let g = module.declare_global("table", &IrType::i32()).unwrap();
        assert!(verify(&module).is_ok());

        module.set_global_linkage(g, Linkage::Internal).unwrap();
        let err = verify(&module).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err.diagnostics[0].message.contains("table"));
        assert!(module.set_global_linkage(GlobalId(7), Linkage::External).is_err());
    }

    #[test]
    fn test_stale_call_signature() {
        let mut module = Module::new("m");
        let callee = module
            .declare_function("g", &IrType::function(IrType::i32(), vec![], false))
            .unwrap();
        let main = module
            .declare_function("main", &IrType::function(IrType::i32(), vec![], false))
            .unwrap();
        let entry = module.append_block(main, "entry").unwrap();
        {
            let mut builder = IrBuilder::new(&mut module);
            builder.position_at_end(entry).unwrap();
            let value = builder.build_call(callee, &[], "v").unwrap().unwrap();
            builder.build_return(Some(&value)).unwrap();
        }
        assert!(verify(&module).is_ok());

        module.function_mut(callee).unwrap().return_type = IrType::i64();
        let err = verify(&module).unwrap_err();
        assert!(err.diagnostics.iter().any(|d| d.message.contains("was built against")));
    }

    #[test]
    fn test_use_across_blocks_needs_entry_definition() {
        let mut module = Module::new("m");
        let f = module
            .declare_function("f", &IrType::function(IrType::i32(), vec![], false))
            .unwrap();
        let entry = module.append_block(f, "entry").unwrap();
        let other = module.append_block(f, "other").unwrap();
        let late = module.append_block(f, "late").unwrap();
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();
        let slot = builder.build_alloca(&IrType::i32(), "slot").unwrap();
        builder.build_return(Some(&Value::const_i32(0))).unwrap();
        builder.position_at_end(other).unwrap();
        let loaded = builder.build_load(&slot, "v").unwrap();
        builder.build_return(Some(&loaded)).unwrap();
        builder.position_at_end(late).unwrap();
        builder.build_return(Some(&loaded)).unwrap();

        let err = verify(&module).unwrap_err();
        assert_eq!(err.for_block("f", "other").filter(|d| d.severity == kiln_common::Severity::Error).count(), 0);
        assert!(err.for_block("f", "late").any(|d| d.message.contains("used before it is defined")));
    }

    #[test]
    fn test_bad_initializer() {
        let mut module = Module::new("m");
        module
            .add_global_constant("s", &IrType::array(2, IrType::i8()), Constant::Bytes(b"a\0".to_vec()))
            .unwrap();
        module.globals[0].initializer = Some(Constant::Bytes(b"abc".to_vec()));
        assert!(verify(&module).is_err());
    }
}
