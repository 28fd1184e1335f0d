//! Bitcode writer and reader tests

mod common;

use common::*;
use kiln_backend::{decode, encode, serialize, DecodeError};
use kiln_common::SerializationError;
use kiln_ir::{verify_module, IrBuilder, IrType, Module, Opcode};
use pretty_assertions::assert_eq;
use std::io::{self, Write};

/// A sink that refuses every write
struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn all_modules() -> Vec<Module> {
    vec![sum_module(), hello_module(), div_module(), kitchen_sink_module()]
}

#[test]
fn test_decode_restores_module() {
    for module in all_modules() {
        let decoded = decode(&encode(&module)).unwrap();
        assert_eq!(decoded, module);
        assert_eq!(decoded.to_string(), module.to_string());
    }
}

#[test]
fn test_encoding_is_deterministic() {
    for module in all_modules() {
        let first = encode(&module);
        assert_eq!(first, encode(&module));
        assert_eq!(encode(&module.clone()), first);
        assert_eq!(encode(&decode(&first).unwrap()), first);
    }
}

#[test]
fn test_decoded_module_still_verifies() {
    let module = kitchen_sink_module();
    let decoded = decode(&encode(&module)).unwrap();
    assert!(verify_module(&decoded).is_ok());
    assert_eq!(decoded.next_temp(), module.next_temp());
}

#[test]
fn test_header_layout() {
    let bytes = encode(&sum_module());
    assert_eq!(&bytes[..4], b"KILN");
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1);
    assert_eq!(u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]), 3);
    assert_eq!(&bytes[10..13], b"sum");
    // five temps: two slots, two loads and the sum
    assert_eq!(u32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]), 5);
    assert_eq!(bytes.last(), Some(&0xFF));
}

#[test]
fn test_serialize_writes_encoding() {
    let module = hello_module();
    let verified = verify_module(&module).unwrap();
    let mut sink = Vec::new();
    serialize(&verified, &mut sink).unwrap();
    assert_eq!(sink, encode(&module));
}

#[test]
fn test_serialize_reports_sink_failure() {
    let module = sum_module();
    let verified = verify_module(&module).unwrap();
    let err = serialize(&verified, &mut BrokenPipe).unwrap_err();
    assert!(matches!(err, SerializationError::IoFailure { .. }));
}

#[test]
fn test_corrupted_opcode_is_rejected() {
    let mut module = Module::new("m");
    let ty = IrType::function(IrType::void(), vec![], false);
    let f = module.declare_function("f", &ty).unwrap();
    let entry = module.append_block(f, "entry").unwrap();
    let mut builder = IrBuilder::new(&mut module);
    builder.position_at_end(entry).unwrap();
    builder.build_return(None).unwrap();

    let mut bytes = encode(&module);
    // ret, no value, empty attribute section, empty target, end
    let ret_at = bytes.len() - (1 + 1 + 5 + 9 + 1);
    assert_eq!(bytes[ret_at], Opcode::Return as u8);
    bytes[ret_at] = 0x7E;
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::UnknownTag { what: "opcode", tag: 0x7E, .. })
    ));
}
