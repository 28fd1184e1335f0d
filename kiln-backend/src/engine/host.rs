//! Host symbols
//!
//! External function declarations are bound by name against a table of
//! Rust closures when a module is submitted to the engine.

use super::memory::Memory;
use super::GenericValue;
use kiln_common::ExecutionError;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

/// Native implementation of an external function
pub type HostFunction = Rc<dyn Fn(&mut HostContext<'_>, &[GenericValue]) -> Result<GenericValue, ExecutionError>>;

/// What a host function may touch while it runs
pub struct HostContext<'a> {
    memory: &'a mut Memory,
    output: &'a mut dyn Write,
}

impl<'a> HostContext<'a> {
    pub(crate) fn new(memory: &'a mut Memory, output: &'a mut dyn Write) -> Self {
        Self { memory, output }
    }

    pub fn read_c_string(&self, address: u64) -> Result<Vec<u8>, ExecutionError> {
        self.memory.read_c_string(address)
    }

    /// Write to the engine's output sink
    pub fn print(&mut self, data: &[u8]) -> Result<(), ExecutionError> {
        self.output
            .write_all(data)
            .map_err(|e| ExecutionError::backend(format!("host output failed: {e}")))
    }
}

fn pointer_arg(name: &str, args: &[GenericValue], index: usize) -> Result<u64, ExecutionError> {
    args.get(index)
        .and_then(GenericValue::as_pointer)
        .ok_or_else(|| ExecutionError::backend(format!("'{name}' expects a pointer as argument {index}")))
}

fn int_arg(name: &str, args: &[GenericValue], index: usize) -> Result<i64, ExecutionError> {
    args.get(index)
        .and_then(GenericValue::as_i64)
        .ok_or_else(|| ExecutionError::backend(format!("'{name}' expects an integer as argument {index}")))
}

/// Name to host function table
#[derive(Clone, Default)]
pub struct HostSymbols {
    functions: HashMap<String, HostFunction>,
}

impl HostSymbols {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `puts` and `putchar`, writing to the engine output
    pub fn with_libc() -> Self {
        let mut symbols = Self::empty();
        symbols.define("puts", |ctx, args| {
            let text = ctx.read_c_string(pointer_arg("puts", args, 0)?)?;
            ctx.print(&text)?;
            ctx.print(b"\n")?;
            Ok(GenericValue::i32(text.len() as i32 + 1))
        });
        symbols.define("putchar", |ctx, args| {
            let ch = int_arg("putchar", args, 0)?;
            ctx.print(&[ch as u8])?;
            Ok(GenericValue::i32(i32::from(ch as u8)))
        });
        symbols
    }

    /// Add or replace a host function
    pub fn define<F>(&mut self, name: &str, function: F) -> &mut Self
    where
        F: Fn(&mut HostContext<'_>, &[GenericValue]) -> Result<GenericValue, ExecutionError> + 'static,
    {
        self.functions.insert(name.to_string(), Rc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<HostFunction> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for HostSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("HostSymbols").field("functions", &names).finish()
    }
}
