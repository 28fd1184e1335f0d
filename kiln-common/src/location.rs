//! Location tracking for IR diagnostics
//! 
//! Diagnostics point into the IR rather than into source text: a function,
//! optionally one of its blocks, optionally an instruction within it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position inside a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrLocation {
    pub function: Option<String>,
    pub block: Option<String>,
    pub instruction: Option<usize>,
}

impl IrLocation {
    /// Location covering the whole module
    pub fn module() -> Self {
        Self {
            function: None,
            block: None,
            instruction: None,
        }
    }

    pub fn function(name: &str) -> Self {
        Self {
            function: Some(name.to_string()),
            block: None,
            instruction: None,
        }
    }

    pub fn block(function: &str, block: &str) -> Self {
        Self {
            function: Some(function.to_string()),
            block: Some(block.to_string()),
            instruction: None,
        }
    }

    pub fn instruction(function: &str, block: &str, index: usize) -> Self {
        Self {
            function: Some(function.to_string()),
            block: Some(block.to_string()),
            instruction: Some(index),
        }
    }
}

impl fmt::Display for IrLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, &self.block, self.instruction) {
            (None, _, _) => write!(f, "<module>"),
            (Some(func), None, _) => write!(f, "@{func}"),
            (Some(func), Some(block), None) => write!(f, "@{func}:{block}"),
            (Some(func), Some(block), Some(index)) => write!(f, "@{func}:{block}#{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(IrLocation::module().to_string(), "<module>");
        assert_eq!(IrLocation::function("main").to_string(), "@main");
        assert_eq!(IrLocation::block("main", "entry").to_string(), "@main:entry");
        assert_eq!(IrLocation::instruction("main", "entry", 3).to_string(), "@main:entry#3");
    }
}
