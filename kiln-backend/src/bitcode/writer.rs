//! Bitcode encoding

use super::*;
use kiln_ir::{
    Attribute, AttributeIndex, BasicBlock, CastKind, Constant, Function, GlobalVariable, Instruction, IrBinaryOp,
    IrType, Linkage, Module, Value, ValueKind,
};
use log::debug;
use std::collections::HashMap;

// ── Writer ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }
    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }
    fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }
    fn count(&mut self, n: usize) {
        self.u32(n as u32);
    }
}

/// Types in first-use order, each after the types it refers to
#[derive(Default)]
struct TypeTable {
    types: Vec<IrType>,
    index: HashMap<IrType, u32>,
}

impl TypeTable {
    fn intern(&mut self, ty: &IrType) -> u32 {
        if let Some(&id) = self.index.get(ty) {
            return id;
        }
        match ty {
            IrType::Ptr { pointee, .. } => {
                self.intern(pointee);
            }
            IrType::Array { element_type, .. } => {
                self.intern(element_type);
            }
            IrType::Function { return_type, param_types, .. } => {
                self.intern(return_type);
                for param in param_types {
                    self.intern(param);
                }
            }
            IrType::Void | IrType::Int(_) | IrType::F32 | IrType::F64 => {}
        }
        let id = self.types.len() as u32;
        self.types.push(ty.clone());
        self.index.insert(ty.clone(), id);
        id
    }

    fn lookup(&self, ty: &IrType) -> u32 {
        self.index.get(ty).copied().unwrap_or(u32::MAX)
    }

    fn write(&self, w: &mut Writer) {
        w.count(self.types.len());
        for ty in &self.types {
            match ty {
                IrType::Void => w.u8(TY_VOID),
                IrType::Int(width) => {
                    w.u8(TY_INT);
                    w.u32(*width);
                }
                IrType::F32 => w.u8(TY_F32),
                IrType::F64 => w.u8(TY_F64),
                IrType::Ptr { pointee, address_space } => {
                    w.u8(TY_PTR);
                    w.u32(self.lookup(pointee));
                    w.u32(*address_space);
                }
                IrType::Array { size, element_type } => {
                    w.u8(TY_ARRAY);
                    w.u64(*size);
                    w.u32(self.lookup(element_type));
                }
                IrType::Function { return_type, param_types, is_vararg } => {
                    w.u8(TY_FUNCTION);
                    w.u32(self.lookup(return_type));
                    w.count(param_types.len());
                    for param in param_types {
                        w.u32(self.lookup(param));
                    }
                    w.bool(*is_vararg);
                }
            }
        }
    }
}

fn binary_op_code(op: IrBinaryOp) -> u8 {
    IrBinaryOp::ALL.iter().position(|o| *o == op).unwrap_or(0) as u8
}

fn cast_kind_code(kind: CastKind) -> u8 {
    CastKind::ALL.iter().position(|k| *k == kind).unwrap_or(0) as u8
}

fn linkage_code(linkage: Linkage) -> u8 {
    match linkage {
        Linkage::External => LINKAGE_EXTERNAL,
        Linkage::Internal => LINKAGE_INTERNAL,
    }
}

/// Body sections are written first so the type table can be emitted
/// ahead of them with every type already interned.
struct Encoder {
    body: Writer,
    types: TypeTable,
}

impl Encoder {
    fn ty(&mut self, ty: &IrType) {
        let id = self.types.intern(ty);
        self.body.u32(id);
    }

    fn value(&mut self, value: &Value) {
        let w = &mut self.body;
        match &value.kind {
            ValueKind::Temp(id) => {
                w.u8(VAL_TEMP);
                w.u32(*id);
            }
            ValueKind::ConstInt(bits) => {
                w.u8(VAL_CONST_INT);
                w.u64(*bits);
            }
            ValueKind::ConstFloat(bits) => {
                w.u8(VAL_CONST_FLOAT);
                w.u64(*bits);
            }
            ValueKind::Null => w.u8(VAL_NULL),
            ValueKind::Global(id) => {
                w.u8(VAL_GLOBAL);
                w.u32(id.0);
            }
            ValueKind::Function(id) => {
                w.u8(VAL_FUNCTION);
                w.u32(id.0);
            }
            ValueKind::Argument { function, index } => {
                w.u8(VAL_ARGUMENT);
                w.u32(function.0);
                w.u32(*index);
            }
            ValueKind::Undef => w.u8(VAL_UNDEF),
        }
        self.ty(&value.ty);
    }

    fn global(&mut self, global: &GlobalVariable) {
        self.body.str(&global.name);
        self.ty(&global.value_type);
        self.body.bool(global.is_constant);
        self.body.u8(linkage_code(global.linkage));
        match &global.initializer {
            None => self.body.u8(INIT_NONE),
            Some(Constant::Bytes(bytes)) => {
                self.body.u8(INIT_BYTES);
                self.body.bytes(bytes);
            }
            Some(Constant::Int(bits)) => {
                self.body.u8(INIT_INT);
                self.body.u64(*bits);
            }
            Some(Constant::Float(bits)) => {
                self.body.u8(INIT_FLOAT);
                self.body.u64(*bits);
            }
            Some(Constant::Zero) => self.body.u8(INIT_ZERO),
        }
    }

    fn function(&mut self, function: &Function) {
        self.body.str(&function.name);
        self.ty(&function.fn_type());
        self.body.u8(linkage_code(function.linkage));
        for param in &function.params {
            self.body.bool(param.name.is_some());
            if let Some(name) = &param.name {
                self.body.str(name);
            }
        }
        self.body.count(function.value_names.len());
        for (temp, name) in &function.value_names {
            self.body.u32(*temp);
            self.body.str(name);
        }
        self.body.count(function.blocks.len());
        for block in &function.blocks {
            self.block(block);
        }
    }

    fn block(&mut self, block: &BasicBlock) {
        self.body.u32(block.id);
        self.body.str(&block.name);
        self.body.count(block.instructions.len());
        for instr in &block.instructions {
            self.instruction(instr);
        }
    }

    fn instruction(&mut self, instr: &Instruction) {
        self.body.u8(instr.opcode() as u8);
        match instr {
            Instruction::Alloca { result, alloc_type, result_type } => {
                self.body.u32(*result);
                self.ty(alloc_type);
                self.ty(result_type);
            }
            Instruction::Store { value, ptr } => {
                self.value(value);
                self.value(ptr);
            }
            Instruction::Load { result, ptr, result_type } => {
                self.body.u32(*result);
                self.value(ptr);
                self.ty(result_type);
            }
            Instruction::Binary { result, op, lhs, rhs, result_type } => {
                self.body.u32(*result);
                self.body.u8(binary_op_code(*op));
                self.value(lhs);
                self.value(rhs);
                self.ty(result_type);
            }
            Instruction::Cast { result, kind, value, target_type } => {
                self.body.u32(*result);
                self.body.u8(cast_kind_code(*kind));
                self.value(value);
                self.ty(target_type);
            }
            Instruction::Call { result, callee, callee_type, args, result_type } => {
                self.body.bool(result.is_some());
                if let Some(result) = result {
                    self.body.u32(*result);
                }
                self.body.u32(callee.0);
                self.ty(callee_type);
                self.body.count(args.len());
                for arg in args {
                    self.value(arg);
                }
                self.ty(result_type);
            }
            Instruction::Return(value) => {
                self.body.bool(value.is_some());
                if let Some(value) = value {
                    self.value(value);
                }
            }
        }
    }

    fn attribute(&mut self, index: AttributeIndex, attribute: Attribute) {
        let w = &mut self.body;
        match index {
            AttributeIndex::Function => w.u8(ATTR_INDEX_FUNCTION),
            AttributeIndex::Return => w.u8(ATTR_INDEX_RETURN),
            AttributeIndex::Param(n) => {
                w.u8(ATTR_INDEX_PARAM);
                w.u32(n);
            }
        }
        match attribute {
            Attribute::NoCapture => w.u8(ATTR_NOCAPTURE),
            Attribute::NoUnwind => w.u8(ATTR_NOUNWIND),
            Attribute::ReadOnly => w.u8(ATTR_READONLY),
            Attribute::NonNull => w.u8(ATTR_NONNULL),
            Attribute::NoReturn => w.u8(ATTR_NORETURN),
            Attribute::Dereferenceable(bytes) => {
                w.u8(ATTR_DEREFERENCEABLE);
                w.u64(bytes);
            }
            Attribute::Align(bytes) => {
                w.u8(ATTR_ALIGN);
                w.u64(bytes);
            }
        }
    }
}

/// Encode `module` into self-describing bitcode
pub fn encode(module: &Module) -> Vec<u8> {
    let mut enc = Encoder {
        body: Writer::default(),
        types: TypeTable::default(),
    };

    enc.body.u8(SECTION_GLOBALS);
    enc.body.count(module.globals.len());
    for global in &module.globals {
        enc.global(global);
    }

    enc.body.u8(SECTION_FUNCTIONS);
    enc.body.count(module.functions.len());
    for function in &module.functions {
        enc.function(function);
    }

    enc.body.u8(SECTION_ATTRIBUTES);
    enc.body.count(module.attributes.len());
    for entry in module.attributes.entries() {
        enc.body.u32(entry.function.0);
        enc.attribute(entry.index, entry.attribute);
    }

    enc.body.u8(SECTION_TARGET);
    enc.body.str(&module.target.triple);
    enc.body.str(&module.target.data_layout);
    enc.body.u8(SECTION_END);

    let mut out = Writer::default();
    out.buf.extend_from_slice(MAGIC);
    out.u16(VERSION);
    out.str(&module.name);
    out.u32(module.next_temp());
    out.u8(SECTION_TYPES);
    enc.types.write(&mut out);
    out.buf.extend_from_slice(&enc.body.buf);

    debug!(
        "Encoded module '{}': {} type(s), {} bytes",
        module.name,
        enc.types.types.len(),
        out.buf.len()
    );
    out.buf
}
