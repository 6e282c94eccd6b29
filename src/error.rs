//! Error Types
//!
//! A single error enum shared by the store, the query engine and the
//! subword layer.

use thiserror::Error;

/// Errors raised by keyed vector operations
#[derive(Debug, Error)]
pub enum VectorError {
    /// Unknown entity, or an OOV lookup with no buckets to compose from
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input: empty term set, wrong dimensionality, empty lists
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request is well-formed but this store cannot serve it
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A persisted bucket table could not be expanded. Loading must abort.
    #[error("corrupt bucket table: {0}")]
    CorruptBuckets(String),

    /// Malformed line in a text vector table
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VectorError {
    /// Lookup of an identifier that has no row
    pub fn not_in_vocab(entity: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("'{}' not in vocabulary", entity))
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::InvalidArgument(format!(
            "Dimension mismatch: expected {}, got {}",
            expected, actual
        ))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, VectorError>;
