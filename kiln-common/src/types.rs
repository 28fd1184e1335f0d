//! Common types used throughout the harness
//! 
//! Identifiers for IR entities and the target description carried by
//! every module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Temporary (instruction result) identifier, unique within a module
pub type TempId = u32;

/// Basic block identifier, unique within a function
pub type LabelId = u32;

/// Handle to a function declared in a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Handle to a global declared in a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "global#{}", self.0)
    }
}

/// Target triple and data layout, stored verbatim by a module and handed
/// unchanged to the execution and serialization paths
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TargetDescription {
    pub triple: String,
    pub data_layout: String,
}

impl TargetDescription {
    pub fn new(triple: impl Into<String>, data_layout: impl Into<String>) -> Self {
        Self {
            triple: triple.into(),
            data_layout: data_layout.into(),
        }
    }

    /// Describe the machine this process runs on
    pub fn host() -> Self {
        let arch = std::env::consts::ARCH;
        let triple = match std::env::consts::OS {
            "linux" => format!("{arch}-unknown-linux-gnu"),
            "macos" => format!("{arch}-apple-darwin"),
            "windows" => format!("{arch}-pc-windows-msvc"),
            os => format!("{arch}-unknown-{os}"),
        };
        let data_layout = match arch {
            "x86_64" => "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-f80:128-n8:16:32:64-S128",
            "aarch64" => "e-m:e-i8:8:32-i16:16:32-i64:64-i128:128-n32:64-S128",
            _ => "e-p:64:64-i64:64-n8:16:32:64-S128",
        };
        Self::new(triple, data_layout)
    }

    pub fn is_empty(&self) -> bool {
        self.triple.is_empty() && self.data_layout.is_empty()
    }
}

impl fmt::Display for TargetDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "target datalayout = \"{}\"", self.data_layout)?;
        write!(f, "target triple = \"{}\"", self.triple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_target_is_populated() {
        let target = TargetDescription::host();
        assert!(target.triple.starts_with(std::env::consts::ARCH));
        assert!(target.data_layout.starts_with('e'));
        assert!(!target.is_empty());
    }

    #[test]
    fn test_default_target_is_empty() {
        assert!(TargetDescription::default().is_empty());
    }

    #[test]
    fn test_target_display() {
        let target = TargetDescription::new("x86_64-unknown-linux-gnu", "e-p:64:64");
        assert_eq!(
            target.to_string(),
            "target datalayout = \"e-p:64:64\"\ntarget triple = \"x86_64-unknown-linux-gnu\""
        );
    }
}
