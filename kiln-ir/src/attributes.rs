//! Function Attributes
//!
//! Attributes are advisory hints for the backend. They live in a side
//! table keyed by function and position so the verifier and the value
//! graph never see them.

use kiln_common::FunctionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where on a function an attribute applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeIndex {
    Function,
    Return,
    Param(u32),
}

/// A named, optionally parameterized tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    /// The callee does not retain the pointer argument
    NoCapture,
    NoUnwind,
    ReadOnly,
    NonNull,
    NoReturn,
    Dereferenceable(u64),
    Align(u64),
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::NoCapture => write!(f, "nocapture"),
            Attribute::NoUnwind => write!(f, "nounwind"),
            Attribute::ReadOnly => write!(f, "readonly"),
            Attribute::NonNull => write!(f, "nonnull"),
            Attribute::NoReturn => write!(f, "noreturn"),
            Attribute::Dereferenceable(bytes) => write!(f, "dereferenceable({bytes})"),
            Attribute::Align(bytes) => write!(f, "align {bytes}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeEntry {
    pub function: FunctionId,
    pub index: AttributeIndex,
    pub attribute: Attribute,
}

/// Side table of attributes, ordered for deterministic output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTable {
    entries: BTreeSet<AttributeEntry>,
}

impl AttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the attribute was already present
    pub fn add(&mut self, function: FunctionId, index: AttributeIndex, attribute: Attribute) -> bool {
        self.entries.insert(AttributeEntry { function, index, attribute })
    }

    pub fn remove(&mut self, function: FunctionId, index: AttributeIndex, attribute: Attribute) -> bool {
        self.entries.remove(&AttributeEntry { function, index, attribute })
    }

    pub fn get(&self, function: FunctionId, index: AttributeIndex) -> impl Iterator<Item = Attribute> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.function == function && e.index == index)
            .map(|e| e.attribute)
    }

    pub fn has(&self, function: FunctionId, index: AttributeIndex, attribute: Attribute) -> bool {
        self.entries.contains(&AttributeEntry { function, index, attribute })
    }

    pub fn entries(&self) -> impl Iterator<Item = &AttributeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut table = AttributeTable::new();
        assert!(table.add(FunctionId(0), AttributeIndex::Param(0), Attribute::NoCapture));
        assert!(!table.add(FunctionId(0), AttributeIndex::Param(0), Attribute::NoCapture));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_by_position() {
        let mut table = AttributeTable::new();
        table.add(FunctionId(0), AttributeIndex::Param(0), Attribute::NoCapture);
        table.add(FunctionId(0), AttributeIndex::Function, Attribute::NoUnwind);
        table.add(FunctionId(1), AttributeIndex::Param(0), Attribute::NonNull);

        let params: Vec<_> = table.get(FunctionId(0), AttributeIndex::Param(0)).collect();
        assert_eq!(params, vec![Attribute::NoCapture]);
        assert!(table.has(FunctionId(0), AttributeIndex::Function, Attribute::NoUnwind));
        assert!(!table.has(FunctionId(1), AttributeIndex::Function, Attribute::NoUnwind));
        assert!(table.remove(FunctionId(1), AttributeIndex::Param(0), Attribute::NonNull));
        assert_eq!(table.len(), 2);
    }
}
