//! Bitcode decoding

use super::*;
use kiln_common::{FunctionId, GlobalId, TargetDescription};
use kiln_ir::{
    Attribute, AttributeIndex, BasicBlock, CastKind, Constant, Function, GlobalVariable, Instruction, IrBinaryOp,
    IrType, Linkage, Module, Opcode, Value, ValueKind,
};
use log::debug;

// ── Reader ───────────────────────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof { what, offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1, "u8")?[0])
    }
    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array("u16")?))
    }
    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array("u32")?))
    }
    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array("u64")?))
    }
    fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }
    fn count(&mut self) -> Result<usize, DecodeError> {
        Ok(self.u32()? as usize)
    }
    fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.count()?;
        Ok(self.take(len, "bytes")?.to_vec())
    }
    fn str(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        let len = self.count()?;
        let raw = self.take(len, "string")?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Read a tag byte, remembering where it was for error reports
    fn tag(&mut self) -> Result<(u8, usize), DecodeError> {
        let offset = self.pos;
        Ok((self.u8()?, offset))
    }

    fn section(&mut self, expected: u8) -> Result<(), DecodeError> {
        let found = self.u8()?;
        if found == expected {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedSection { expected, found })
        }
    }
}

struct Decoder<'a> {
    r: Reader<'a>,
    types: Vec<IrType>,
}

impl Decoder<'_> {
    fn ty(&mut self) -> Result<IrType, DecodeError> {
        let id = self.r.u32()?;
        self.types.get(id as usize).cloned().ok_or(DecodeError::BadTypeIndex(id))
    }

    fn type_table(&mut self) -> Result<(), DecodeError> {
        let count = self.r.count()?;
        for _ in 0..count {
            let (tag, offset) = self.r.tag()?;
            let ty = match tag {
                TY_VOID => IrType::Void,
                TY_INT => IrType::Int(self.r.u32()?),
                TY_F32 => IrType::F32,
                TY_F64 => IrType::F64,
                TY_PTR => {
                    let pointee = self.ty()?;
                    IrType::pointer(pointee, self.r.u32()?)
                }
                TY_ARRAY => {
                    let size = self.r.u64()?;
                    IrType::array(size, self.ty()?)
                }
                TY_FUNCTION => {
                    let return_type = self.ty()?;
                    let params = (0..self.r.count()?).map(|_| self.ty()).collect::<Result<Vec<_>, _>>()?;
                    IrType::function(return_type, params, self.r.bool()?)
                }
                tag => return Err(DecodeError::UnknownTag { what: "type", tag, offset }),
            };
            self.types.push(ty);
        }
        Ok(())
    }

    fn linkage(&mut self) -> Result<Linkage, DecodeError> {
        match self.r.tag()? {
            (LINKAGE_EXTERNAL, _) => Ok(Linkage::External),
            (LINKAGE_INTERNAL, _) => Ok(Linkage::Internal),
            (tag, offset) => Err(DecodeError::UnknownTag { what: "linkage", tag, offset }),
        }
    }

    fn value(&mut self) -> Result<Value, DecodeError> {
        let (tag, offset) = self.r.tag()?;
        let kind = match tag {
            VAL_TEMP => ValueKind::Temp(self.r.u32()?),
            VAL_CONST_INT => ValueKind::ConstInt(self.r.u64()?),
            VAL_CONST_FLOAT => ValueKind::ConstFloat(self.r.u64()?),
            VAL_NULL => ValueKind::Null,
            VAL_GLOBAL => ValueKind::Global(GlobalId(self.r.u32()?)),
            VAL_FUNCTION => ValueKind::Function(FunctionId(self.r.u32()?)),
            VAL_ARGUMENT => ValueKind::Argument {
                function: FunctionId(self.r.u32()?),
                index: self.r.u32()?,
            },
            VAL_UNDEF => ValueKind::Undef,
            tag => return Err(DecodeError::UnknownTag { what: "value", tag, offset }),
        };
        Ok(Value::new(kind, self.ty()?))
    }

    fn opt_value(&mut self) -> Result<Option<Value>, DecodeError> {
        if self.r.bool()? {
            Ok(Some(self.value()?))
        } else {
            Ok(None)
        }
    }

    fn global(&mut self, id: GlobalId) -> Result<GlobalVariable, DecodeError> {
        let name = self.r.str()?;
        let value_type = self.ty()?;
        let is_constant = self.r.bool()?;
        let linkage = self.linkage()?;
        let (tag, offset) = self.r.tag()?;
        let initializer = match tag {
            INIT_NONE => None,
            INIT_BYTES => Some(Constant::Bytes(self.r.bytes()?)),
            INIT_INT => Some(Constant::Int(self.r.u64()?)),
            INIT_FLOAT => Some(Constant::Float(self.r.u64()?)),
            INIT_ZERO => Some(Constant::Zero),
            tag => return Err(DecodeError::UnknownTag { what: "initializer", tag, offset }),
        };
        Ok(GlobalVariable {
            id,
            name,
            value_type,
            is_constant,
            initializer,
            linkage,
        })
    }

    fn function(&mut self, id: FunctionId) -> Result<Function, DecodeError> {
        let name = self.r.str()?;
        let fn_type = self.ty()?;
        let mut function = Function::declare(id, &name, &fn_type)
            .ok_or_else(|| DecodeError::Malformed(format!("'{name}' has non-function type {fn_type}")))?;
        function.linkage = self.linkage()?;
        for index in 0..function.params.len() {
            if self.r.bool()? {
                let param_name = self.r.str()?;
                function.set_param_name(index as u32, &param_name);
            }
        }
        for _ in 0..self.r.count()? {
            let temp = self.r.u32()?;
            let value_name = self.r.str()?;
            function.value_names.insert(temp, value_name);
        }
        for _ in 0..self.r.count()? {
            let block = self.block()?;
            function.add_block(block);
        }
        Ok(function)
    }

    fn block(&mut self) -> Result<BasicBlock, DecodeError> {
        let id = self.r.u32()?;
        let name = self.r.str()?;
        let mut block = BasicBlock::new(id, &name);
        for _ in 0..self.r.count()? {
            let instr = self.instruction()?;
            block.add_instruction(instr);
        }
        Ok(block)
    }

    fn instruction(&mut self) -> Result<Instruction, DecodeError> {
        let (code, offset) = self.r.tag()?;
        let opcode = Opcode::from_u8(code).ok_or(DecodeError::UnknownTag {
            what: "opcode",
            tag: code,
            offset,
        })?;
        let instr = match opcode {
            Opcode::Alloca => Instruction::Alloca {
                result: self.r.u32()?,
                alloc_type: self.ty()?,
                result_type: self.ty()?,
            },
            Opcode::Store => Instruction::Store {
                value: self.value()?,
                ptr: self.value()?,
            },
            Opcode::Load => Instruction::Load {
                result: self.r.u32()?,
                ptr: self.value()?,
                result_type: self.ty()?,
            },
            Opcode::Binary => {
                let result = self.r.u32()?;
                let (code, offset) = self.r.tag()?;
                let op = IrBinaryOp::ALL.get(code as usize).copied().ok_or(DecodeError::UnknownTag {
                    what: "binary op",
                    tag: code,
                    offset,
                })?;
                Instruction::Binary {
                    result,
                    op,
                    lhs: self.value()?,
                    rhs: self.value()?,
                    result_type: self.ty()?,
                }
            }
            Opcode::Cast => {
                let result = self.r.u32()?;
                let (code, offset) = self.r.tag()?;
                let kind = CastKind::ALL.get(code as usize).copied().ok_or(DecodeError::UnknownTag {
                    what: "cast kind",
                    tag: code,
                    offset,
                })?;
                Instruction::Cast {
                    result,
                    kind,
                    value: self.value()?,
                    target_type: self.ty()?,
                }
            }
            Opcode::Call => {
                let result = if self.r.bool()? { Some(self.r.u32()?) } else { None };
                let callee = FunctionId(self.r.u32()?);
                let callee_type = self.ty()?;
                let args = (0..self.r.count()?).map(|_| self.value()).collect::<Result<Vec<_>, _>>()?;
                Instruction::Call {
                    result,
                    callee,
                    callee_type,
                    args,
                    result_type: self.ty()?,
                }
            }
            Opcode::Return => Instruction::Return(self.opt_value()?),
        };
        Ok(instr)
    }

    fn attribute(&mut self) -> Result<(AttributeIndex, Attribute), DecodeError> {
        let index = match self.r.tag()? {
            (ATTR_INDEX_FUNCTION, _) => AttributeIndex::Function,
            (ATTR_INDEX_RETURN, _) => AttributeIndex::Return,
            (ATTR_INDEX_PARAM, _) => AttributeIndex::Param(self.r.u32()?),
            (tag, offset) => return Err(DecodeError::UnknownTag { what: "attribute index", tag, offset }),
        };
        let attribute = match self.r.tag()? {
            (ATTR_NOCAPTURE, _) => Attribute::NoCapture,
            (ATTR_NOUNWIND, _) => Attribute::NoUnwind,
            (ATTR_READONLY, _) => Attribute::ReadOnly,
            (ATTR_NONNULL, _) => Attribute::NonNull,
            (ATTR_NORETURN, _) => Attribute::NoReturn,
            (ATTR_DEREFERENCEABLE, _) => Attribute::Dereferenceable(self.r.u64()?),
            (ATTR_ALIGN, _) => Attribute::Align(self.r.u64()?),
            (tag, offset) => return Err(DecodeError::UnknownTag { what: "attribute", tag, offset }),
        };
        Ok((index, attribute))
    }
}

/// Rebuild a module from bitcode produced by [`encode`]
pub fn decode(data: &[u8]) -> Result<Module, DecodeError> {
    let mut dec = Decoder {
        r: Reader::new(data),
        types: Vec::new(),
    };

    let magic: [u8; 4] = dec.r.array("magic").map_err(|_| DecodeError::BadMagic)?;
    if &magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = dec.r.u16()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let name = dec.r.str()?;
    let next_temp = dec.r.u32()?;
    let mut module = Module::new(&name);
    module.reserve_temps(next_temp);

    dec.r.section(SECTION_TYPES)?;
    dec.type_table()?;

    dec.r.section(SECTION_GLOBALS)?;
    for index in 0..dec.r.count()? {
        let global = dec.global(GlobalId(index as u32))?;
        module.globals.push(global);
    }

    dec.r.section(SECTION_FUNCTIONS)?;
    for index in 0..dec.r.count()? {
        let function = dec.function(FunctionId(index as u32))?;
        module.functions.push(function);
    }

    dec.r.section(SECTION_ATTRIBUTES)?;
    for _ in 0..dec.r.count()? {
        let function = FunctionId(dec.r.u32()?);
        let (index, attribute) = dec.attribute()?;
        module.attributes.add(function, index, attribute);
    }

    dec.r.section(SECTION_TARGET)?;
    let triple = dec.r.str()?;
    let data_layout = dec.r.str()?;
    module.set_target(TargetDescription::new(triple, data_layout));

    dec.r.section(SECTION_END)?;
    let trailing = data.len() - dec.r.pos;
    if trailing > 0 {
        return Err(DecodeError::TrailingBytes(trailing));
    }

    debug!(
        "Decoded module '{}': {} function(s), {} global(s)",
        module.name,
        module.functions.len(),
        module.globals.len()
    );
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcode::encode;
    use kiln_ir::IrBuilder;
    use pretty_assertions::assert_eq;

    fn small_module() -> Module {
        let mut module = Module::new("small");
        let ty = IrType::function(IrType::i32(), vec![IrType::i32()], false);
        let id = module.declare_function("id", &ty).unwrap();
        let entry = module.append_block(id, "entry").unwrap();
        let mut builder = IrBuilder::new(&mut module);
        builder.position_at_end(entry).unwrap();
        let arg = builder.param(id, 0).unwrap();
        builder.build_return(Some(&arg)).unwrap();
        module
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        assert_eq!(decode(b"ELF\x7f\x01\x00"), Err(DecodeError::BadMagic));
        assert_eq!(decode(b""), Err(DecodeError::BadMagic));
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let mut bytes = encode(&small_module());
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = encode(&small_module());
        for cut in [6, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                matches!(decode(&bytes[..cut]), Err(DecodeError::UnexpectedEof { .. })),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = encode(&small_module());
        bytes.extend_from_slice(&[0, 0]);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn test_decode_small_module() {
        let module = small_module();
        assert_eq!(decode(&encode(&module)).unwrap(), module);
    }
}
