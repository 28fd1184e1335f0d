//! Programs shared by the backend integration tests

#![allow(dead_code)]

use kiln_ir::{
    Attribute, AttributeIndex, CastKind, FunctionId, IrBinaryOp, IrBuilder, IrType, Linkage, Module,
    TargetDescription, Value,
};

pub fn main_type() -> IrType {
    IrType::function(IrType::i32(), vec![], false)
}

/// `int main() { int a = 32; int b = 16; return a + b; }`
pub fn sum_module() -> Module {
    let mut module = Module::new("sum");
    let main = module.declare_function("main", &main_type()).unwrap();
    let entry = module.append_block(main, "entry").unwrap();
    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();

    let a = builder.build_alloca(&IrType::i32(), "a").unwrap();
    let b = builder.build_alloca(&IrType::i32(), "b").unwrap();
    builder.build_store(&Value::const_i32(32), &a).unwrap();
    builder.build_store(&Value::const_i32(16), &b).unwrap();
    let a_val = builder.build_load(&a, "").unwrap();
    let b_val = builder.build_load(&b, "").unwrap();
    let sum = builder.build_binary(IrBinaryOp::Add, &a_val, &b_val, "sum").unwrap();
    builder.build_return(Some(&sum)).unwrap();
    module
}

/// `int main() { puts("hello world\n"); return 0; }`
pub fn hello_module() -> Module {
    let mut module = Module::new("hello");
    let puts_type = IrType::function(IrType::i32(), vec![IrType::i8().ptr_to()], false);
    let puts = module.declare_function("puts", &puts_type).unwrap();
    module
        .add_attribute(puts, AttributeIndex::Param(0), Attribute::NoCapture)
        .unwrap();
    let main = module.declare_function("main", &main_type()).unwrap();
    let entry = module.append_block(main, "entry").unwrap();

    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();
    let text = builder.build_global_string_ptr("hello world\n", "").unwrap();
    builder.build_call(puts, &[text], "").unwrap();
    builder.build_return(Some(&Value::const_i32(0))).unwrap();
    module
}

/// `int div(int a, int b) { return a / b; }`
pub fn div_module() -> Module {
    let mut module = Module::new("div");
    let ty = IrType::function(IrType::i32(), vec![IrType::i32(), IrType::i32()], false);
    let div = module.declare_function("div", &ty).unwrap();
    let entry = module.append_block(div, "entry").unwrap();
    module.function_mut(div).unwrap().set_param_name(0, "a");
    module.function_mut(div).unwrap().set_param_name(1, "b");

    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();
    let a = builder.param(div, 0).unwrap();
    let b = builder.param(div, 1).unwrap();
    let quotient = builder.build_binary(IrBinaryOp::SDiv, &a, &b, "q").unwrap();
    builder.build_return(Some(&quotient)).unwrap();
    module
}

/// `static double widen(int x) { return (double)(x << 1) * 0.5; }`
pub fn add_widen(module: &mut Module) -> FunctionId {
    let ty = IrType::function(IrType::f64(), vec![IrType::i32()], false);
    let widen = module.declare_function("widen", &ty).unwrap();
    module.set_linkage(widen, Linkage::Internal).unwrap();
    let entry = module.append_block(widen, "entry").unwrap();
    let mut builder = IrBuilder::new(module);
    builder.position_at_end(entry).unwrap();
    let x = builder.param(widen, 0).unwrap();
    let doubled = builder.build_binary(IrBinaryOp::Shl, &x, &Value::const_i32(1), "").unwrap();
    let wide = builder.build_cast(CastKind::UIToFP, &doubled, &IrType::f64(), "wide").unwrap();
    let half = builder
        .build_binary(IrBinaryOp::FMul, &wide, &Value::const_f64(0.5), "half")
        .unwrap();
    builder.build_return(Some(&half)).unwrap();
    widen
}

/// A module touching every section of the bitcode format
pub fn kitchen_sink_module() -> Module {
    let mut module = hello_module();
    module.name = "kitchen-sink".to_string();
    module.set_target(TargetDescription::new(
        "x86_64-unknown-linux-gnu",
        "e-m:e-i64:64-f80:128-n8:16:32:64-S128",
    ));
    module.declare_global("counter", &IrType::i64()).unwrap();
    let widen = add_widen(&mut module);
    module
        .add_attribute(widen, AttributeIndex::Function, Attribute::NoUnwind)
        .unwrap();
    module
        .add_attribute(widen, AttributeIndex::Return, Attribute::Align(8))
        .unwrap();
    module
}
