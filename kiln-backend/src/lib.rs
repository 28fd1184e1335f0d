//! Kiln IR harness - Backend
//!
//! This crate consumes verified modules: the `engine` runs them in
//! process and `bitcode` writes them to a durable binary format.
//!
//! [`initialize`] must be called once before any module is executed.

pub mod bitcode;
pub mod engine;

pub use bitcode::{decode, encode, serialize, DecodeError};
pub use engine::{execute, EngineOptions, GenericValue, HostContext, HostFunction, HostSymbols, JitEngine};

use kiln_common::TargetDescription;
use log::info;
use once_cell::sync::OnceCell;

/// What the backend knows about the machine it runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub host: TargetDescription,
}

static BACKEND: OnceCell<BackendInfo> = OnceCell::new();

/// Bring up the backend. Later calls are no-ops returning the same info.
pub fn initialize() -> &'static BackendInfo {
    BACKEND.get_or_init(|| {
        let host = TargetDescription::host();
        info!("Initialized execution backend for {}", host.triple);
        BackendInfo { host }
    })
}

pub fn is_initialized() -> bool {
    BACKEND.get().is_some()
}

/// Backend info, panicking if [`initialize`] was never called
pub(crate) fn backend_info() -> &'static BackendInfo {
    match BACKEND.get() {
        Some(info) => info,
        None => panic!("kiln_backend::initialize() must be called before executing a module"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let first = initialize() as *const BackendInfo;
        let second = initialize() as *const BackendInfo;
        assert_eq!(first, second);
        assert!(is_initialized());
        assert!(!backend_info().host.triple.is_empty());
    }
}
