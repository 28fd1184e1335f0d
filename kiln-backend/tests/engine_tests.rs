//! End-to-end tests for the execution engine

mod common;

use common::*;
use kiln_backend::{execute, initialize, EngineOptions, GenericValue, HostSymbols, JitEngine};
use kiln_common::ExecutionError;
use kiln_ir::{verify_module, CastKind, IrBuilder, IrType, Module, Value};
use pretty_assertions::assert_eq;
use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::rc::Rc;

/// Output sink the test can read back after the engine is done with it
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_sum_returns_48() {
    initialize();
    let module = sum_module();
    let verified = verify_module(&module).unwrap();
    assert_eq!(execute(&verified, "main", &[]).unwrap(), GenericValue::i32(48));
}

#[test]
fn test_hello_calls_puts_once() {
    initialize();
    let module = hello_module();
    let verified = verify_module(&module).unwrap();

    let calls = Rc::new(Cell::new(0u32));
    let seen = calls.clone();
    let mut host = HostSymbols::with_libc();
    host.define("puts", move |ctx, args| {
        seen.set(seen.get() + 1);
        let address = args[0].as_pointer().unwrap_or(0);
        let text = ctx.read_c_string(address)?;
        ctx.print(&text)?;
        ctx.print(b"\n")?;
        Ok(GenericValue::i32(text.len() as i32 + 1))
    });

    let output = SharedBuffer::default();
    let mut engine = JitEngine::new(&verified, host).unwrap();
    engine.set_output(output.clone());

    assert_eq!(engine.run_function("main", &[]).unwrap(), GenericValue::i32(0));
    assert_eq!(calls.get(), 1);
    assert_eq!(String::from_utf8(output.0.borrow().clone()).unwrap(), "hello world\n\n");
}

#[test]
fn test_libc_puts_goes_to_output() {
    initialize();
    let module = hello_module();
    let verified = verify_module(&module).unwrap();
    let output = SharedBuffer::default();
    let mut engine = JitEngine::new(&verified, HostSymbols::with_libc()).unwrap();
    engine.set_output(output.clone());

    engine.run_function("main", &[]).unwrap();
    engine.run_function("main", &[]).unwrap();
    assert_eq!(output.0.borrow().as_slice(), b"hello world\n\nhello world\n\n");
    assert!(engine.global_address(".str").is_some());
}

#[test]
fn test_missing_host_symbol_is_unresolved() {
    initialize();
    let module = hello_module();
    let verified = verify_module(&module).unwrap();
    let err = JitEngine::new(&verified, HostSymbols::empty()).err().unwrap();
    assert!(matches!(err, ExecutionError::UnresolvedSymbol { ref name, .. } if name == "puts"));
}

#[test]
fn test_external_data_is_unresolved() {
    initialize();
    let mut module = sum_module();
    module.declare_global("errno", &IrType::i32()).unwrap();
    let verified = verify_module(&module).unwrap();
    assert!(matches!(
        JitEngine::new(&verified, HostSymbols::with_libc()),
        Err(ExecutionError::UnresolvedSymbol { .. })
    ));
}

#[test]
fn test_arguments_are_checked() {
    initialize();
    let module = div_module();
    let verified = verify_module(&module).unwrap();
    let mut engine = JitEngine::new(&verified, HostSymbols::empty()).unwrap();

    assert_eq!(
        engine
            .run_function("div", &[GenericValue::i32(-7), GenericValue::i32(2)])
            .unwrap(),
        GenericValue::i32(-3)
    );
    assert!(matches!(
        engine.run_function("div", &[GenericValue::i32(1)]),
        Err(ExecutionError::BackendFailure { .. })
    ));
    assert!(matches!(
        engine.run_function("div", &[GenericValue::Float(1.0), GenericValue::i32(1)]),
        Err(ExecutionError::BackendFailure { .. })
    ));
    assert!(matches!(
        engine.run_function("nope", &[]),
        Err(ExecutionError::UnresolvedSymbol { .. })
    ));
}

#[test]
fn test_division_by_zero_is_a_backend_failure() {
    initialize();
    let module = div_module();
    let verified = verify_module(&module).unwrap();
    let mut engine = JitEngine::new(&verified, HostSymbols::empty()).unwrap();
    assert!(matches!(
        engine.run_function("div", &[GenericValue::i32(7), GenericValue::i32(0)]),
        Err(ExecutionError::BackendFailure { .. })
    ));
    // The engine stays usable after a fault
    assert_eq!(
        engine
            .run_function("div", &[GenericValue::i32(8), GenericValue::i32(2)])
            .unwrap(),
        GenericValue::i32(4)
    );
}

#[test]
fn test_defined_functions_call_each_other() {
    initialize();
    let mut module = div_module();
    let div = module.get_function("div").unwrap().id;
    let main = module.declare_function("main", &main_type()).unwrap();
    let entry = module.append_block(main, "entry").unwrap();
    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();
    let q = builder
        .build_call(div, &[Value::const_i32(100), Value::const_i32(7)], "q")
        .unwrap()
        .unwrap();
    builder.build_return(Some(&q)).unwrap();

    let verified = verify_module(&module).unwrap();
    assert_eq!(execute(&verified, "main", &[]).unwrap(), GenericValue::i32(14));
}

#[test]
fn test_float_conversion() {
    initialize();
    let mut module = Module::new("widen");
    add_widen(&mut module);
    let verified = verify_module(&module).unwrap();
    let mut engine = JitEngine::new(&verified, HostSymbols::empty()).unwrap();
    assert_eq!(
        engine.run_function("widen", &[GenericValue::i32(21)]).unwrap(),
        GenericValue::Float(21.0)
    );
}

#[test]
fn test_kitchen_sink_needs_external_data() {
    initialize();
    let module = kitchen_sink_module();
    let verified = verify_module(&module).unwrap();
    let err = JitEngine::new(&verified, HostSymbols::with_libc()).err().unwrap();
    assert!(matches!(err, ExecutionError::UnresolvedSymbol { ref name, .. } if name == "counter"));
}

/// `int spin(int n) { return spin(n); }`
fn spin_module() -> Module {
    let mut module = Module::new("spin");
    let ty = IrType::function(IrType::i32(), vec![IrType::i32()], false);
    let spin = module.declare_function("spin", &ty).unwrap();
    let entry = module.append_block(spin, "entry").unwrap();
    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();
    let n = builder.param(spin, 0).unwrap();
    let again = builder.build_call(spin, &[n], "again").unwrap().unwrap();
    builder.build_return(Some(&again)).unwrap();
    module
}

#[test]
fn test_call_depth_limit() {
    initialize();
    let module = spin_module();
    let verified = verify_module(&module).unwrap();
    let options = EngineOptions {
        max_call_depth: 4,
        ..EngineOptions::default()
    };
    let mut engine = JitEngine::with_options(&verified, HostSymbols::empty(), options).unwrap();
    assert_eq!(engine.options().max_call_depth, 4);

    let err = engine.run_function("spin", &[GenericValue::i32(1)]).unwrap_err();
    assert!(matches!(err, ExecutionError::BackendFailure { ref message } if message.contains("call depth")));
}

#[test]
fn test_small_memory_overflows_stack() {
    initialize();
    let mut module = Module::new("big-frame");
    let main = module.declare_function("main", &main_type()).unwrap();
    let entry = module.append_block(main, "entry").unwrap();
    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();
    builder.build_alloca(&IrType::array(256, IrType::i8()), "buf").unwrap();
    builder.build_return(Some(&Value::const_i32(0))).unwrap();

    let verified = verify_module(&module).unwrap();
    let options = EngineOptions {
        memory_size: 128,
        ..EngineOptions::default()
    };
    let mut engine = JitEngine::with_options(&verified, HostSymbols::empty(), options).unwrap();
    assert!(matches!(
        engine.run_function("main", &[]),
        Err(ExecutionError::BackendFailure { .. })
    ));

    let mut engine = JitEngine::new(&verified, HostSymbols::empty()).unwrap();
    assert_eq!(engine.run_function("main", &[]).unwrap(), GenericValue::i32(0));
}

/// `int poke(long addr) { int *p = (int *)addr; *p = 7; return *p; }`
fn poke_module() -> Module {
    let mut module = Module::new("poke");
    let ty = IrType::function(IrType::i32(), vec![IrType::i64()], false);
    let poke = module.declare_function("poke", &ty).unwrap();
    let entry = module.append_block(poke, "entry").unwrap();
    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();
    let addr = builder.param(poke, 0).unwrap();
    let ptr = builder
        .build_cast(CastKind::IntToPtr, &addr, &IrType::i32().ptr_to(), "p")
        .unwrap();
    builder.build_store(&Value::const_i32(7), &ptr).unwrap();
    let value = builder.build_load(&ptr, "v").unwrap();
    builder.build_return(Some(&value)).unwrap();
    module
}

#[test]
fn test_wild_pointers_fault() {
    initialize();
    let module = poke_module();
    let verified = verify_module(&module).unwrap();
    let options = EngineOptions {
        memory_size: 4096,
        ..EngineOptions::default()
    };
    let mut engine = JitEngine::with_options(&verified, HostSymbols::empty(), options).unwrap();

    for address in [0, 8, 1 << 20, -4] {
        let err = engine.run_function("poke", &[GenericValue::int(64, address)]).unwrap_err();
        assert!(
            matches!(err, ExecutionError::BackendFailure { .. }),
            "address {address:#x} did not fault"
        );
    }
}
