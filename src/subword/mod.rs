//! Subword composition for out-of-vocabulary entities
//!
//! Character n-grams are hashed into a fixed number of buckets; each bucket
//! holds a learned vector. Vectors for unseen entities are the mean of their
//! bucket vectors.

mod composer;
mod config;
mod legacy;
mod ngrams;
mod vectors;

pub use composer::SubwordComposer;
pub use config::SubwordConfig;
pub use legacy::{CompactBuckets, DEFAULT_EXPAND_SEED};
pub use ngrams::{byte_ngrams, char_ngrams, hash_bytes, hash_legacy, ngram_hashes};
pub use vectors::{LegacyState, SubwordVectors};
