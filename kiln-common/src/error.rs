//! Error handling for the Kiln harness
//!
//! This module defines the error families raised by each phase
//! (construction, verification, execution, serialization) and the
//! diagnostic reporting utilities used by the verifier.

use crate::location::IrLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised synchronously while building a module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("Symbol '{name}' is already declared as {existing}, cannot redeclare as {requested}")]
    DuplicateSymbol {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("Call to '{callee}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        callee: String,
        expected: String,
        found: usize,
    },

    #[error("Invalid {kind} cast from {from} to {to}")]
    InvalidCast {
        kind: String,
        from: String,
        to: String,
    },

    #[error("Terminator mismatch in block '{block}': {message}")]
    TerminatorMismatch { block: String, message: String },

    #[error("Invalid insert point: {message}")]
    InvalidInsertPoint { message: String },

    #[error("Unknown {kind} '{name}'")]
    UnknownEntity { kind: String, name: String },
}

impl ConstructionError {
    pub fn type_mismatch(context: &str, expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        ConstructionError::TypeMismatch {
            context: context.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn terminator(block: &str, message: impl Into<String>) -> Self {
        ConstructionError::TerminatorMismatch {
            block: block.to_string(),
            message: message.into(),
        }
    }

    pub fn insert_point(message: impl Into<String>) -> Self {
        ConstructionError::InvalidInsertPoint {
            message: message.into(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message pointing into the IR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: IrLocation,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: String, location: IrLocation) -> Self {
        Self {
            severity: Severity::Error,
            message,
            location,
            notes: Vec::new(),
        }
    }

    pub fn warning(message: String, location: IrLocation) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            location,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.location, self.message)?;

        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }

        Ok(())
    }
}

/// Every defect found by one verifier pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Module verification failed with {}:\n{}", count_label(.diagnostics.len()), join_diagnostics(.diagnostics))]
pub struct VerificationError {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostics reported against the named block
    pub fn for_block<'a>(&'a self, function: &'a str, block: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| {
            d.location.function.as_deref() == Some(function) && d.location.block.as_deref() == Some(block)
        })
    }
}

fn count_label(count: usize) -> String {
    format!("{} error{}", count, if count == 1 { "" } else { "s" })
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised per invocation by the execution engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Unresolved symbol '{name}': {reason}")]
    UnresolvedSymbol { name: String, reason: String },

    #[error("Backend failure: {message}")]
    BackendFailure { message: String },
}

impl ExecutionError {
    pub fn unresolved(name: &str, reason: impl Into<String>) -> Self {
        ExecutionError::UnresolvedSymbol {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        ExecutionError::BackendFailure {
            message: message.into(),
        }
    }
}

/// Errors raised while writing a module to a byte sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("IO failure while writing bitcode: {message}")]
    IoFailure { message: String },
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::IoFailure {
            message: err.to_string(),
        }
    }
}

/// Umbrella error for callers driving the whole pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KilnError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Collects diagnostics during a verifier pass
#[derive(Debug, Default)]
pub struct DiagnosticReporter {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an error diagnostic
    pub fn error(&mut self, message: String, location: IrLocation) {
        self.diagnostics.push(Diagnostic::error(message, location));
        self.error_count += 1;
    }

    /// Report a warning diagnostic
    pub fn warning(&mut self, message: String, location: IrLocation) {
        self.diagnostics.push(Diagnostic::warning(message, location));
        self.warning_count += 1;
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Create a summary string
    pub fn summary(&self) -> String {
        match (self.error_count, self.warning_count) {
            (0, 0) => "No errors or warnings".to_string(),
            (0, w) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (e, 0) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (e, w) => format!(
                "{} error{} and {} warning{}",
                e,
                if e == 1 { "" } else { "s" },
                w,
                if w == 1 { "" } else { "s" }
            ),
        }
    }

    /// Turn the collected diagnostics into a verdict; warnings alone pass
    pub fn finish(self) -> Result<(), VerificationError> {
        if self.has_errors() {
            Err(VerificationError::new(self.diagnostics))
        } else {
            Ok(())
        }
    }
}
