//! Textual IR listing
//!
//! Module-aware spelling of values: named results print as `%name`,
//! globals and functions by symbol, parameters by their given name.

use kiln_common::{FunctionId, TempId};
use std::fmt;
use crate::{
    AttributeIndex, BasicBlock, Constant, Function, GlobalVariable, Linkage, Module, PlainNamer, Value,
    ValueKind, ValueNamer,
};

struct ModuleNamer<'a> {
    module: &'a Module,
    function: &'a Function,
}

impl ValueNamer for ModuleNamer<'_> {
    fn temp(&self, id: TempId) -> String {
        match self.function.value_names.get(&id) {
            Some(name) => format!("%{name}"),
            None => format!("%{id}"),
        }
    }

    fn value(&self, value: &Value) -> String {
        match &value.kind {
            ValueKind::Temp(id) => format!("{} {}", value.ty, self.temp(*id)),
            ValueKind::Global(id) => match self.module.global(*id) {
                Some(global) => format!("{} @{}", value.ty, global.name),
                None => value.to_string(),
            },
            ValueKind::Function(id) => format!("{} {}", value.ty, self.callee(*id)),
            ValueKind::Argument { function, index } if *function == self.function.id => {
                match self.function.params.get(*index as usize).and_then(|p| p.name.as_deref()) {
                    Some(name) => format!("{} %{name}", value.ty),
                    None => value.to_string(),
                }
            }
            _ => value.to_string(),
        }
    }

    fn callee(&self, id: FunctionId) -> String {
        match self.module.functions.get(id.index()) {
            Some(function) => format!("@{}", function.name),
            None => format!("@{id}"),
        }
    }
}

/// `c"..."` with non-printable bytes as `\XX`
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("c\"");
    for &byte in bytes {
        if byte == b' ' || (byte.is_ascii_graphic() && byte != b'"' && byte != b'\\') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{byte:02X}"));
        }
    }
    out.push('"');
    out
}

fn write_global(f: &mut fmt::Formatter<'_>, global: &GlobalVariable) -> fmt::Result {
    let linkage = match global.linkage {
        Linkage::Internal => "internal ",
        Linkage::External if global.is_declaration() => "external ",
        Linkage::External => "",
    };
    let kind = if global.is_constant { "constant" } else { "global" };
    write!(f, "@{} = {linkage}{kind} {}", global.name, global.value_type)?;
    match &global.initializer {
        Some(Constant::Bytes(bytes)) => write!(f, " {}", escape_bytes(bytes))?,
        Some(Constant::Int(bits)) => write!(f, " {bits}")?,
        Some(Constant::Float(bits)) => write!(f, " {:e}", f64::from_bits(*bits))?,
        Some(Constant::Zero) => write!(f, " zeroinitializer")?,
        None => {}
    }
    writeln!(f)
}

fn attribute_suffix(module: Option<&Module>, function: &Function, index: AttributeIndex) -> String {
    let Some(module) = module else {
        return String::new();
    };
    module
        .attributes
        .get(function.id, index)
        .map(|a| format!(" {a}"))
        .collect()
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &BasicBlock, namer: &dyn ValueNamer) -> fmt::Result {
    writeln!(f, "{}:", block.label())?;
    for instr in &block.instructions {
        writeln!(f, "  {}", instr.render(namer))?;
    }
    Ok(())
}

fn write_function(f: &mut fmt::Formatter<'_>, module: Option<&Module>, function: &Function) -> fmt::Result {
    let keyword = if function.is_declaration() { "declare" } else { "define" };
    let linkage = if function.linkage == Linkage::Internal { "internal " } else { "" };
    let ret_attrs = attribute_suffix(module, function, AttributeIndex::Return);
    write!(f, "{keyword} {linkage}{}{ret_attrs} @{}(", function.return_type, function.name)?;
    for (i, param) in function.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        let attrs = attribute_suffix(module, function, AttributeIndex::Param(i as u32));
        write!(f, "{}{attrs}", param.ty)?;
        match &param.name {
            Some(name) if !function.is_declaration() => write!(f, " %{name}")?,
            _ if !function.is_declaration() => write!(f, " %arg{i}")?,
            _ => {}
        }
    }
    if function.is_vararg {
        if !function.params.is_empty() {
            write!(f, ", ")?;
        }
        write!(f, "...")?;
    }
    write!(f, "){}", attribute_suffix(module, function, AttributeIndex::Function))?;

    if function.is_declaration() {
        return writeln!(f);
    }

    writeln!(f, " {{")?;
    match module {
        Some(module) => {
            let namer = ModuleNamer { module, function };
            for block in &function.blocks {
                write_block(f, block, &namer)?;
            }
        }
        None => {
            for block in &function.blocks {
                write_block(f, block, &PlainNamer)?;
            }
        }
    }
    writeln!(f, "}}")
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if !self.target.data_layout.is_empty() {
            writeln!(f, "target datalayout = \"{}\"", self.target.data_layout)?;
        }
        if !self.target.triple.is_empty() {
            writeln!(f, "target triple = \"{}\"", self.target.triple)?;
        }

        if !self.globals.is_empty() {
            writeln!(f)?;
            for global in &self.globals {
                write_global(f, global)?;
            }
        }

        for function in &self.functions {
            writeln!(f)?;
            write_function(f, Some(self), function)?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, None, self)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, self, &PlainNamer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"Hello, World!\n\0"), "c\"Hello, World!\\0A\\00\"");
        assert_eq!(escape_bytes(b"a\"b"), "c\"a\\22b\"");
    }
}
