//! Kiln IR harness - Common Types and Errors
//! 
//! This crate contains shared identifiers, the target description, error
//! definitions and diagnostic reporting used by every Kiln crate.

pub mod error;
pub mod types;
pub mod location;

pub use error::{
    ConstructionError, Diagnostic, DiagnosticReporter, ExecutionError, KilnError,
    SerializationError, Severity, VerificationError,
};
pub use types::*;
pub use location::IrLocation;
