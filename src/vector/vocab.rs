//! Vocabulary Records
//!
//! Per-entity metadata and the key type used to address rows.

use hashbrown::HashMap;
use std::fmt;

/// Model-specific value attached to a vocabulary entry
#[derive(Debug, Clone, PartialEq)]
pub enum Extra {
    Int(i64),
    Float(f64),
    Text(String),
}

/// A single vocabulary item
#[derive(Debug, Clone, PartialEq)]
pub struct Vocab {
    /// Row in the vector matrix
    index: usize,
    /// Frequency weight. Metadata only.
    pub count: u64,
    /// Rarely used extras, allocated on first write
    extras: Option<Box<HashMap<String, Extra>>>,
}

impl Vocab {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            count: 1,
            extras: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Row index of this entity
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn extra(&self, name: &str) -> Option<&Extra> {
        self.extras.as_ref().and_then(|m| m.get(name))
    }

    pub fn set_extra(&mut self, name: impl Into<String>, value: Extra) {
        self.extras
            .get_or_insert_with(Default::default)
            .insert(name.into(), value);
    }
}

/// Lookup key for a row: an entity name, or a raw row position
///
/// Resolved to a dense row index once, at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Name(String),
    Index(usize),
}

impl From<&str> for EntityKey {
    fn from(name: &str) -> Self {
        EntityKey::Name(name.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(name: String) -> Self {
        EntityKey::Name(name)
    }
}

impl From<usize> for EntityKey {
    fn from(index: usize) -> Self {
        EntityKey::Index(index)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Name(name) => write!(f, "{}", name),
            EntityKey::Index(index) => write!(f, "#{}", index),
        }
    }
}
