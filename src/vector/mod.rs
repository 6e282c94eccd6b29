//! Vector Module
//!
//! Keyed vector storage, the normalized-row cache and the similarity engine.

mod cache;
mod engine;
mod matrix;
mod shared;
mod similarity;
mod store;
mod vocab;

pub use cache::NormalizedCache;
pub use engine::{
    ApproximateIndex, QueryOptions, SimilarityEngine, Term, VectorSource, WeightedTerm,
    DEFAULT_TOPN,
};
pub use matrix::Matrix;
pub use shared::SharedVectors;
pub use similarity::{
    cosine_similarities, cosine_similarity, dot_product, magnitude, normalize_vector, normalized,
};
pub use store::KeyedVectors;
pub use vocab::{EntityKey, Extra, Vocab};

pub(crate) use similarity::add_scaled;
