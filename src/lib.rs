//! KEYVEC - Keyed Vector Store with Similarity Queries
//!
//! Named dense vectors with cosine similarity search, analogy queries and
//! subword composition of vectors for entities outside the vocabulary.

pub mod error;
pub mod subword;
pub mod text;
pub mod vector;

#[cfg(test)]
mod proptest_tests;

pub use error::{Result, VectorError};
pub use subword::{CompactBuckets, LegacyState, SubwordComposer, SubwordConfig, SubwordVectors};
pub use text::{read_text, read_text_file};
pub use vector::{
    EntityKey, KeyedVectors, Matrix, QueryOptions, SharedVectors, SimilarityEngine, Term, VectorSource,
    WeightedTerm,
};
