//! Subword Vector Store
//!
//! Keyed vectors whose entries are composed from a base vector and the
//! bucket vectors of their character n-grams. Entities outside the
//! vocabulary get a vector from their n-gram buckets alone.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::borrow::Cow;
use tracing::info;

use super::composer::SubwordComposer;
use super::config::SubwordConfig;
use super::legacy::{CompactBuckets, DEFAULT_EXPAND_SEED};
use crate::error::{Result, VectorError};
use crate::vector::{add_scaled, normalized, KeyedVectors, Matrix, SimilarityEngine, VectorSource};

/// Persisted state of a store saved with compact buckets
#[derive(Debug, Clone)]
pub struct LegacyState {
    pub entities: Vec<String>,
    /// Composed vectors, one per entity
    pub vectors: Matrix,
    /// Base vectors, one per entity
    pub vectors_vocab: Matrix,
    pub buckets: CompactBuckets,
}

/// Vector store with subword composition
#[derive(Debug, Clone)]
pub struct SubwordVectors {
    /// Composed vectors of in-vocabulary entities
    keyed: KeyedVectors,
    /// Learned per-entity base vectors
    vectors_vocab: Matrix,
    composer: SubwordComposer,
}

impl SubwordVectors {
    /// Empty store
    pub fn new(vector_size: usize, config: SubwordConfig) -> Self {
        Self {
            keyed: KeyedVectors::new(vector_size),
            vectors_vocab: Matrix::empty(vector_size),
            composer: SubwordComposer::new(config, vector_size),
        }
    }

    /// Store over a vocabulary whose weights are set later, by
    /// `init_ngrams_weights` or `init_post_load`
    pub fn with_vocab(entities: Vec<String>, vector_size: usize, config: SubwordConfig) -> Result<Self> {
        let rows = entities.len();
        Ok(Self {
            keyed: KeyedVectors::from_parts(entities, Matrix::zeros(rows, vector_size))?,
            vectors_vocab: Matrix::zeros(rows, vector_size),
            composer: SubwordComposer::new(config, vector_size),
        })
    }

    /// Import a foreign table holding entity rows followed by bucket rows
    pub fn init_from_external(entities: Vec<String>, table: Matrix, config: SubwordConfig) -> Result<Self> {
        let mut store = Self::with_vocab(entities, table.cols(), config)?;
        store.init_post_load(table)?;
        Ok(store)
    }

    /// Restore a store persisted with a compact bucket table
    ///
    /// The bucket table is expanded first; stored vectors are kept as saved.
    pub fn load_legacy(state: LegacyState, config: SubwordConfig) -> Result<Self> {
        let dim = state.vectors.cols();
        if state.vectors_vocab.rows() != state.entities.len() || state.vectors_vocab.cols() != dim {
            return Err(VectorError::InvalidArgument(format!(
                "base vectors are {}x{}, expected {}x{}",
                state.vectors_vocab.rows(),
                state.vectors_vocab.cols(),
                state.entities.len(),
                dim
            )));
        }

        let buckets = state.buckets.expand(config.bucket, DEFAULT_EXPAND_SEED)?;
        let mut composer = SubwordComposer::new(config, dim);
        composer.replace_table(buckets)?;

        let mut store = Self {
            keyed: KeyedVectors::from_parts(state.entities, state.vectors)?,
            vectors_vocab: state.vectors_vocab,
            composer,
        };
        store.ensure_membership();
        Ok(store)
    }

    pub fn keyed(&self) -> &KeyedVectors {
        &self.keyed
    }

    pub fn composer(&self) -> &SubwordComposer {
        &self.composer
    }

    pub fn config(&self) -> &SubwordConfig {
        self.composer.config()
    }

    pub fn vector_size(&self) -> usize {
        self.keyed.vector_size()
    }

    /// Base vectors, one per in-vocabulary entity
    pub fn vectors_vocab(&self) -> &Matrix {
        &self.vectors_vocab
    }

    /// Whether the entity has a stored vector
    pub fn in_vocab(&self, entity: &str) -> bool {
        self.keyed.contains(entity)
    }

    /// Vector of any entity
    ///
    /// In-vocabulary entities return their stored row; others are composed
    /// from their n-gram buckets.
    pub fn compose(&self, entity: &str) -> Result<Vec<f32>> {
        match self.keyed.get(entity) {
            Ok(row) => Ok(row.to_vec()),
            Err(_) => self.composer.compose_oov(entity),
        }
    }

    /// Add entities to the vocabulary with zero vectors
    ///
    /// Returns the vocabulary size before the call, as expected by
    /// `update_ngrams_weights`.
    pub fn extend_vocab<E: AsRef<str>>(&mut self, entities: &[E]) -> Result<usize> {
        let old_len = self.keyed.len();
        let zeros = vec![0.0f32; self.vector_size()];
        let vectors = vec![zeros.as_slice(); entities.len()];
        self.keyed.append(entities, &vectors, false)?;
        Ok(old_len)
    }

    fn ensure_membership(&mut self) {
        if self.composer.membership().map(<[_]>::len) != Some(self.keyed.len()) {
            self.composer.build_bucket_membership(self.keyed.entities());
        }
    }

    /// Rebuild every entity's bucket list from the current config
    pub fn build_bucket_membership(&mut self) {
        self.composer.build_bucket_membership(self.keyed.entities());
    }

    /// Draw base and bucket vectors from one seeded generator
    ///
    /// Call after the vocabulary is complete.
    pub fn init_ngrams_weights(&mut self, seed: u64) {
        self.build_bucket_membership();

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let dim = self.vector_size();
        self.vectors_vocab = Matrix::random_uniform(self.keyed.len(), dim, &mut rng);
        self.composer.randomize(&mut rng);

        info!(
            "Initialized {} base vectors and {} bucket vectors",
            self.vectors_vocab.rows(),
            self.composer.bucket_count()
        );
        self.recompute_all_vectors();
    }

    /// Extend the base vectors after the vocabulary grew
    pub fn update_ngrams_weights(&mut self, seed: u64, old_vocab_len: usize) -> Result<()> {
        let len = self.keyed.len();
        if old_vocab_len > len || old_vocab_len != self.vectors_vocab.rows() {
            return Err(VectorError::InvalidArgument(format!(
                "old vocabulary size {} does not match {} base vectors and {} entities",
                old_vocab_len,
                self.vectors_vocab.rows(),
                len
            )));
        }

        self.build_bucket_membership();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.vectors_vocab.pad_random(len - old_vocab_len, &mut rng);
        self.recompute_all_vectors();
        Ok(())
    }

    /// Split a `(vocab + bucket) x D` table into base and bucket rows
    ///
    /// Expects the vocabulary to be in place already.
    pub fn init_post_load(&mut self, table: Matrix) -> Result<()> {
        let vocab_len = self.keyed.len();
        let bucket = self.composer.bucket_count();
        if table.rows() != vocab_len + bucket {
            return Err(VectorError::InvalidArgument(format!(
                "unexpected number of vectors: {} for {} entities and {} buckets",
                table.rows(),
                vocab_len,
                bucket
            )));
        }
        if table.cols() != self.vector_size() {
            return Err(VectorError::dimension_mismatch(self.vector_size(), table.cols()));
        }

        let (vocab, buckets) = table.split_at_row(vocab_len);
        self.vectors_vocab = vocab;
        self.composer.replace_table(buckets)?;
        self.composer.invalidate_membership();
        self.recompute_all_vectors();
        Ok(())
    }

    /// Reset every in-vocabulary vector to the mean of its base vector and
    /// its bucket vectors
    ///
    /// Must be rerun whenever the bucket table changes.
    pub fn recompute_all_vectors(&mut self) {
        self.ensure_membership();

        let Some(membership) = self.composer.membership() else {
            return;
        };
        let buckets = self.composer.buckets();
        let vectors_vocab = &self.vectors_vocab;
        let composed = self.keyed.vectors_mut();

        for (index, hashes) in membership.iter().enumerate() {
            let row = composed.row_mut(index);
            row.copy_from_slice(vectors_vocab.row(index));
            for &h in hashes {
                add_scaled(row, buckets.row(h as usize), 1.0);
            }
            let n = (hashes.len() + 1) as f32;
            row.iter_mut().for_each(|x| *x /= n);
        }
    }

    /// Query engine over this store
    pub fn engine(&self) -> SimilarityEngine<'_, Self> {
        SimilarityEngine::new(self)
    }
}

impl VectorSource for SubwordVectors {
    fn keyed(&self) -> &KeyedVectors {
        &self.keyed
    }

    fn entity_vector(&self, entity: &str) -> Result<Cow<'_, [f32]>> {
        match self.keyed.get(entity) {
            Ok(row) => Ok(Cow::Borrowed(row)),
            Err(_) => self.composer.compose_oov(entity).map(Cow::Owned),
        }
    }

    fn unit_vector(&self, entity: &str) -> Result<Vec<f32>> {
        match self.keyed.index_of(entity) {
            Ok(index) => Ok(self.keyed.normalized().row(index).to_vec()),
            Err(_) => Ok(normalized(&self.composer.compose_oov(entity)?)),
        }
    }
}
