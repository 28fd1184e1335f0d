//! Kiln IR harness - Intermediate Representation
//! 
//! This crate defines the typed, block-structured IR, the builder used to
//! assemble it and the verifier that decides whether a module can be
//! handed to the execution engine or the bitcode writer.
//! 
//! ## Architecture
//! 
//! The crate is structured as follows:
//! - `types` - Type registry (IrType)
//! - `values` - Typed values and constants
//! - `ops` - Binary operations and cast kinds
//! - `instructions` - IR instructions and opcodes
//! - `blocks` - Basic block management
//! - `function` - Function declarations and definitions
//! - `attributes` - Advisory attribute side table
//! - `module` - Module, globals and the symbol table
//! - `builder` - IR construction with an owned insertion cursor
//! - `verify` - Structural verification

// Public exports - clean API surface
pub use self::types::IrType;
pub use self::values::{Value, ValueKind};
pub use self::ops::{CastKind, IrBinaryOp};
pub use self::instructions::{Instruction, Opcode, PlainNamer, ValueNamer};
pub use self::blocks::BasicBlock;
pub use self::function::{Function, Linkage, Parameter};
pub use self::attributes::{Attribute, AttributeEntry, AttributeIndex, AttributeTable};
pub use self::module::{BlockRef, Constant, GlobalVariable, Module};
pub use self::builder::{Cursor, InsertPosition, IrBuilder};
pub use self::verify::{verify, verify_module, VerifiedModule};

pub use kiln_common::{FunctionId, GlobalId, LabelId, TargetDescription, TempId};

pub mod types;
pub mod values;
pub mod ops;
pub mod instructions;
pub mod blocks;
pub mod function;
pub mod attributes;
pub mod module;
pub mod builder;
pub mod verify;
mod printer;
