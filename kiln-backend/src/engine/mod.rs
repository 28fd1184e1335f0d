//! Execution engine
//!
//! Runs verified modules in process. Submitting a module lays out its
//! globals, computes a frame layout for every defined function and binds
//! every external declaration against [`HostSymbols`]; after that any
//! defined function can be invoked by name.

mod host;
mod interp;
mod layout;
mod memory;
mod value;

pub use host::{HostContext, HostFunction, HostSymbols};
pub use layout::{align_of, calculate_frame_layout, FrameLayout};
pub use value::GenericValue;

use crate::backend_info;
use kiln_common::{ExecutionError, FunctionId};
use kiln_ir::{Constant, IrType, Module, VerifiedModule};
use log::{debug, info, warn};
use memory::{Memory, FUNCTION_BASE};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Bytes of engine memory shared by globals and the stack
    pub memory_size: usize,
    pub max_call_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            memory_size: 1 << 20,
            max_call_depth: 256,
        }
    }
}

/// How a function is reached at run time
enum Binding {
    Defined(FrameLayout),
    Host(HostFunction),
}

/// A module submitted for execution
pub struct JitEngine<'m> {
    module: &'m Module,
    memory: Memory,
    global_addresses: Vec<u64>,
    bindings: Vec<Binding>,
    options: EngineOptions,
    output: Box<dyn Write>,
}

impl<'m> JitEngine<'m> {
    pub fn new(module: &VerifiedModule<'m>, host: HostSymbols) -> Result<Self, ExecutionError> {
        Self::with_options(module, host, EngineOptions::default())
    }

    /// Submit `module`; every external declaration must resolve against `host`
    pub fn with_options(
        module: &VerifiedModule<'m>,
        host: HostSymbols,
        options: EngineOptions,
    ) -> Result<Self, ExecutionError> {
        let info = backend_info();
        let module = module.module();
        if !module.target.triple.is_empty() && module.target.triple != info.host.triple {
            warn!(
                "Module '{}' targets {} but runs on {}",
                module.name, module.target.triple, info.host.triple
            );
        }

        let mut memory = Memory::new(options.memory_size);
        let mut global_addresses = Vec::with_capacity(module.globals.len());
        for global in &module.globals {
            let Some(initializer) = &global.initializer else {
                return Err(ExecutionError::unresolved(
                    &global.name,
                    "external data symbols cannot be provided by the host",
                ));
            };
            let size = global.value_type.size_in_bytes().ok_or_else(|| {
                ExecutionError::backend(format!("global '{}' has unsized type {}", global.name, global.value_type))
            })?;
            let address = memory.alloc_global(size, align_of(&global.value_type))?;
            match initializer {
                Constant::Bytes(bytes) => memory.write(address, bytes)?,
                Constant::Int(bits) => memory.store_uint(address, size.min(8), *bits)?,
                Constant::Float(bits) => {
                    let value = GenericValue::Float(f64::from_bits(*bits));
                    memory.store_uint(address, size, value.to_bits(&global.value_type))?;
                }
                Constant::Zero => {}
            }
            debug!("Placed global '{}' at {address:#x} ({size} bytes)", global.name);
            global_addresses.push(address);
        }

        let mut bindings = Vec::with_capacity(module.functions.len());
        for function in &module.functions {
            if function.is_declaration() {
                let bound = host.get(&function.name).ok_or_else(|| {
                    ExecutionError::unresolved(&function.name, "no host symbol provides it")
                })?;
                debug!("Bound external '{}' to host symbol", function.name);
                bindings.push(Binding::Host(bound));
            } else {
                bindings.push(Binding::Defined(calculate_frame_layout(function)?));
            }
        }

        info!(
            "Submitted module '{}': {} function(s), {} global(s)",
            module.name,
            module.functions.len(),
            module.globals.len()
        );
        Ok(Self {
            module,
            memory,
            global_addresses,
            bindings,
            options,
            output: Box::new(io::stdout()),
        })
    }

    /// Redirect what host functions print
    pub fn set_output(&mut self, output: impl Write + 'static) {
        self.output = Box::new(output);
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Address a global was placed at
    pub fn global_address(&self, name: &str) -> Option<u64> {
        let global = self.module.get_global(name)?;
        self.global_addresses.get(global.id.index()).copied()
    }

    /// Invoke the function called `name` and decode its result
    pub fn run_function(&mut self, name: &str, args: &[GenericValue]) -> Result<GenericValue, ExecutionError> {
        let function = self
            .module
            .get_function(name)
            .ok_or_else(|| ExecutionError::unresolved(name, "no such function in the module"))?;

        let fixed = function.params.len();
        if args.len() < fixed || (!function.is_vararg && args.len() != fixed) {
            return Err(ExecutionError::backend(format!(
                "'{name}' takes {fixed} argument(s), {} given",
                args.len()
            )));
        }
        if let Some((index, (param, arg))) = function
            .params
            .iter()
            .zip(args)
            .enumerate()
            .find(|(_, (param, arg))| !arg.fits(&param.ty))
        {
            return Err(ExecutionError::backend(format!(
                "argument {index} of '{name}' is {arg}, expected {}",
                param.ty
            )));
        }

        debug!("Running '{name}' with {} argument(s)", args.len());
        self.memory.reset_stack();
        let result = self.call(function.id, args, 0);
        self.memory.reset_stack();
        self.output
            .flush()
            .map_err(|e| ExecutionError::backend(format!("flushing output failed: {e}")))?;
        let result = result?;
        debug!("'{name}' returned {result}");
        Ok(result)
    }

    fn function_address(id: FunctionId) -> u64 {
        FUNCTION_BASE + u64::from(id.0) * 16
    }

    /// Coerce a host result to the declared return type
    fn host_result(value: GenericValue, return_type: &IrType) -> Result<GenericValue, ExecutionError> {
        match (value, return_type) {
            (_, IrType::Void) => Ok(GenericValue::Void),
            (GenericValue::Int { bits, .. }, IrType::Int(_)) | (GenericValue::Pointer(bits), IrType::Int(_)) => {
                Ok(GenericValue::from_bits(return_type, bits))
            }
            (value, ty) if value.fits(ty) => Ok(value),
            (value, ty) => Err(ExecutionError::backend(format!(
                "host function returned {value} where {ty} was declared"
            ))),
        }
    }
}

/// Submit `module` with the libc host symbols and run one function
pub fn execute(module: &VerifiedModule<'_>, name: &str, args: &[GenericValue]) -> Result<GenericValue, ExecutionError> {
    let mut engine = JitEngine::new(module, HostSymbols::with_libc())?;
    engine.run_function(name, args)
}
