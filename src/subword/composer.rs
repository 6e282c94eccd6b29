//! Subword Composer
//!
//! Owns the bucket table and derives vectors from an entity's n-gram
//! buckets.

use rand::Rng;
use tracing::{debug, warn};

use super::config::SubwordConfig;
use super::ngrams::ngram_hashes;
use crate::error::{Result, VectorError};
use crate::vector::{add_scaled, Matrix};

/// Bucket table plus the per-entity bucket lists derived from it
#[derive(Debug, Clone)]
pub struct SubwordComposer {
    config: SubwordConfig,
    /// One row per hash bucket
    buckets: Matrix,
    /// Entity row -> bucket indices of its n-grams
    membership: Option<Vec<Vec<u32>>>,
}

impl SubwordComposer {
    /// Composer with an all-zero bucket table
    pub fn new(config: SubwordConfig, vector_size: usize) -> Self {
        Self {
            config,
            buckets: Matrix::zeros(config.bucket, vector_size),
            membership: None,
        }
    }

    /// Composer over an existing full bucket table
    pub fn from_table(config: SubwordConfig, buckets: Matrix) -> Result<Self> {
        if buckets.rows() != config.bucket {
            return Err(VectorError::InvalidArgument(format!(
                "bucket table has {} rows, expected {}",
                buckets.rows(),
                config.bucket
            )));
        }
        Ok(Self {
            config,
            buckets,
            membership: None,
        })
    }

    pub fn config(&self) -> &SubwordConfig {
        &self.config
    }

    pub fn bucket_count(&self) -> usize {
        self.config.bucket
    }

    pub fn vector_size(&self) -> usize {
        self.buckets.cols()
    }

    pub fn buckets(&self) -> &Matrix {
        &self.buckets
    }

    /// Bucket indices an entity's n-grams hash to
    pub fn ngram_hashes(&self, entity: &str) -> Vec<u32> {
        ngram_hashes(entity, &self.config)
    }

    /// Mean of the bucket rows of an entity that has no stored vector
    ///
    /// Returns the zero vector, with a warning, when the entity is too
    /// short to yield any n-gram.
    pub fn compose_oov(&self, entity: &str) -> Result<Vec<f32>> {
        if self.config.bucket == 0 {
            return Err(VectorError::NotFound(format!(
                "cannot compose a vector for '{}': no n-grams available",
                entity
            )));
        }

        let mut vector = vec![0.0f32; self.vector_size()];
        let hashes = self.ngram_hashes(entity);
        if hashes.is_empty() {
            warn!(
                "Could not extract any n-grams from {:?}, returning origin vector",
                entity
            );
            return Ok(vector);
        }

        for &h in &hashes {
            add_scaled(&mut vector, self.buckets.row(h as usize), 1.0);
        }
        let n = hashes.len() as f32;
        vector.iter_mut().for_each(|x| *x /= n);
        Ok(vector)
    }

    /// Precompute bucket lists for entities in row order
    pub fn build_bucket_membership<E: AsRef<str>>(&mut self, entities: &[E]) {
        let membership: Vec<Vec<u32>> = entities
            .iter()
            .map(|e| self.ngram_hashes(e.as_ref()))
            .collect();
        debug!("Built bucket membership for {} entities", membership.len());
        self.membership = Some(membership);
    }

    /// Bucket lists by entity row, if built
    pub fn membership(&self) -> Option<&[Vec<u32>]> {
        self.membership.as_deref()
    }

    /// Forget bucket lists; they are rebuilt on next use
    pub fn invalidate_membership(&mut self) {
        self.membership = None;
    }

    /// Refill the table uniformly from `[-1/D, 1/D]`
    pub(crate) fn randomize<G: Rng + ?Sized>(&mut self, rng: &mut G) {
        self.buckets = Matrix::random_uniform(self.config.bucket, self.vector_size(), rng);
    }

    /// Replace the table wholesale
    pub(crate) fn replace_table(&mut self, buckets: Matrix) -> Result<()> {
        if buckets.rows() != self.config.bucket || buckets.cols() != self.vector_size() {
            return Err(VectorError::InvalidArgument(format!(
                "bucket table is {}x{}, expected {}x{}",
                buckets.rows(),
                buckets.cols(),
                self.config.bucket,
                self.vector_size()
            )));
        }
        self.buckets = buckets;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> SubwordComposer {
        let config = SubwordConfig::default()
            .with_ngram_range(3, 3)
            .with_buckets(4);
        let table = Matrix::from_rows(
            &[
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![2.0, 2.0],
                vec![-1.0, 4.0],
            ],
            2,
        )
        .unwrap();
        SubwordComposer::from_table(config, table).unwrap()
    }

    #[test]
    fn test_compose_oov_cats() {
        let composer = composer();
        // buckets [3, 3, 1, 2]
        let v = composer.compose_oov("cats").unwrap();
        let expected = [(-1.0 - 1.0 + 0.0 + 2.0) / 4.0, (4.0 + 4.0 + 1.0 + 2.0) / 4.0];
        assert!((v[0] - expected[0]).abs() < 1e-6);
        assert!((v[1] - expected[1]).abs() < 1e-6);
    }

    #[test]
    fn test_compose_oov_without_ngrams() {
        let composer = composer();
        let v = composer.compose_oov("").unwrap();
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_compose_oov_without_buckets() {
        let config = SubwordConfig::default().with_buckets(0);
        let composer = SubwordComposer::new(config, 2);
        let result = composer.compose_oov("cats");
        assert!(matches!(result, Err(VectorError::NotFound(_))));
    }

    #[test]
    fn test_from_table_row_count() {
        let config = SubwordConfig::default().with_buckets(3);
        let result = SubwordComposer::from_table(config, Matrix::zeros(2, 2));
        assert!(result.is_err());
    }

    #[test]
    fn test_build_bucket_membership() {
        let mut composer = composer();
        assert!(composer.membership().is_none());

        composer.build_bucket_membership(&["cats", ""]);
        let membership = composer.membership().unwrap();
        assert_eq!(membership[0], vec![3, 3, 1, 2]);
        assert!(membership[1].is_empty());

        composer.invalidate_membership();
        assert!(composer.membership().is_none());
    }

    #[test]
    fn test_replace_table_shape() {
        let mut composer = composer();
        assert!(composer.replace_table(Matrix::zeros(4, 3)).is_err());
        assert!(composer.replace_table(Matrix::zeros(4, 2)).is_ok());
        assert_eq!(composer.compose_oov("cats").unwrap(), vec![0.0, 0.0]);
    }
}
