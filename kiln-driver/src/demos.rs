//! Built-in demo programs

use clap::ValueEnum;
use kiln_common::{ConstructionError, TargetDescription};
use kiln_ir::{Attribute, AttributeIndex, CastKind, IrBinaryOp, IrBuilder, IrType, Module, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// `main` adds 32 and 16 through two stack slots
    Sum,
    /// `main` prints a greeting through `puts`
    Hello,
    /// The sum, converted to a double
    Convert,
}

impl Demo {
    pub fn name(self) -> &'static str {
        match self {
            Demo::Sum => "sum",
            Demo::Hello => "hello",
            Demo::Convert => "convert",
        }
    }

    pub fn build(self, target: TargetDescription) -> Result<Module, ConstructionError> {
        let mut module = Module::new(self.name());
        module.set_target(target);
        match self {
            Demo::Sum => build_sum(&mut module, IrType::i32())?,
            Demo::Hello => build_hello(&mut module)?,
            Demo::Convert => build_sum(&mut module, IrType::f64())?,
        }
        Ok(module)
    }
}

/// `a = 32; b = 16; return a + b;`, widened to `ret_type` when it is a float
fn build_sum(module: &mut Module, ret_type: IrType) -> Result<(), ConstructionError> {
    let main = module.declare_function("main", &IrType::function(ret_type.clone(), vec![], false))?;
    let entry = module.append_block(main, "entry")?;
    let mut builder = IrBuilder::new(module);
    builder.position_at_end(entry)?;

    let a = builder.build_alloca(&IrType::i32(), "a")?;
    let b = builder.build_alloca(&IrType::i32(), "b")?;
    builder.build_store(&Value::const_i32(32), &a)?;
    builder.build_store(&Value::const_i32(16), &b)?;
    let a_val = builder.build_load(&a, "")?;
    let b_val = builder.build_load(&b, "")?;
    let sum = builder.build_binary(IrBinaryOp::Add, &a_val, &b_val, "sum")?;
    let result = if ret_type.is_float() {
        builder.build_cast(CastKind::UIToFP, &sum, &ret_type, "conv")?
    } else {
        sum
    };
    builder.build_return(Some(&result))
}

fn build_hello(module: &mut Module) -> Result<(), ConstructionError> {
    let puts_type = IrType::function(IrType::i32(), vec![IrType::i8().ptr_to()], false);
    let puts = module.declare_function("puts", &puts_type)?;
    module.add_attribute(puts, AttributeIndex::Param(0), Attribute::NoCapture)?;

    let main = module.declare_function("main", &IrType::function(IrType::i32(), vec![], false))?;
    let entry = module.append_block(main, "entry")?;
    let mut builder = IrBuilder::new(module);
    builder.position_at_end(entry)?;
    let text = builder.build_global_string_ptr("hello world\n", "")?;
    builder.build_call(puts, &[text], "")?;
    builder.build_return(Some(&Value::const_i32(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::verify;

    #[test]
    fn test_demos_verify() {
        for demo in Demo::value_variants() {
            let module = demo.build(TargetDescription::default()).unwrap();
            assert!(verify(&module).is_ok(), "{} does not verify", demo.name());
        }
    }

    #[test]
    fn test_convert_returns_double() {
        let module = Demo::Convert.build(TargetDescription::default()).unwrap();
        assert_eq!(module.get_function("main").unwrap().return_type, IrType::f64());
    }

    #[test]
    fn test_hello_string_ends_in_newline() {
        let module = Demo::Hello.build(TargetDescription::default()).unwrap();
        let text = module.get_global(".str").unwrap();
        assert_eq!(
            text.initializer,
            Some(kiln_ir::Constant::Bytes(b"hello world\n\0".to_vec()))
        );
    }
}
