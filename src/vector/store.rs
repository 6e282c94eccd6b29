//! Keyed Vector Store
//!
//! Entity -> row mapping over a contiguous vector matrix.

use hashbrown::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::cache::NormalizedCache;
use super::engine::SimilarityEngine;
use super::matrix::Matrix;
use super::vocab::{EntityKey, Vocab};
use crate::error::{Result, VectorError};

/// Store of dense vectors keyed by entity name
///
/// Row `i` of the matrix belongs to the entity whose `Vocab::index()` is `i`.
/// Indices are dense and assigned in insertion order.
#[derive(Debug, Clone)]
pub struct KeyedVectors {
    /// Entity -> metadata (incl. row index)
    vocab: HashMap<String, Vocab>,
    /// Row index -> entity
    index2entity: Vec<String>,
    /// Raw vectors, shared with the cache after an in-place normalization
    vectors: Arc<Matrix>,
    /// Unit-length rows, built on demand
    norms: NormalizedCache,
    /// Set once the raw vectors were normalized in place
    read_only: bool,
}

impl KeyedVectors {
    /// Create an empty store of the given dimension
    pub fn new(vector_size: usize) -> Self {
        Self {
            vocab: HashMap::new(),
            index2entity: Vec::new(),
            vectors: Arc::new(Matrix::empty(vector_size)),
            norms: NormalizedCache::new(),
            read_only: false,
        }
    }

    /// Build a store from entity names and their rows, in order
    pub fn from_parts(entities: Vec<String>, vectors: Matrix) -> Result<Self> {
        if entities.len() != vectors.rows() {
            return Err(VectorError::InvalidArgument(format!(
                "{} entities for {} vectors",
                entities.len(),
                vectors.rows()
            )));
        }

        let mut vocab = HashMap::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            if vocab.insert(entity.clone(), Vocab::new(index)).is_some() {
                return Err(VectorError::InvalidArgument(format!(
                    "duplicate entity '{}'",
                    entity
                )));
            }
        }

        Ok(Self {
            vocab,
            index2entity: entities,
            vectors: Arc::new(vectors),
            norms: NormalizedCache::new(),
            read_only: false,
        })
    }

    /// Get vector dimension
    pub fn vector_size(&self) -> usize {
        self.vectors.cols()
    }

    /// Get number of stored entities
    pub fn len(&self) -> usize {
        self.index2entity.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.index2entity.is_empty()
    }

    /// Check if entity exists
    pub fn contains(&self, entity: &str) -> bool {
        self.vocab.contains_key(entity)
    }

    pub fn vocab(&self, entity: &str) -> Option<&Vocab> {
        self.vocab.get(entity)
    }

    /// Update the frequency metadata of an entity
    pub fn set_count(&mut self, entity: &str, count: u64) -> Result<()> {
        let vocab = self
            .vocab
            .get_mut(entity)
            .ok_or_else(|| VectorError::not_in_vocab(entity))?;
        vocab.count = count;
        Ok(())
    }

    /// Row index of an entity
    pub fn index_of(&self, entity: &str) -> Result<usize> {
        self.vocab
            .get(entity)
            .map(Vocab::index)
            .ok_or_else(|| VectorError::not_in_vocab(entity))
    }

    /// Resolve a name or raw position to a row index
    pub fn resolve(&self, key: &EntityKey) -> Result<usize> {
        match key {
            EntityKey::Name(name) => self.index_of(name),
            EntityKey::Index(index) if *index < self.len() => Ok(*index),
            EntityKey::Index(index) => Err(VectorError::NotFound(format!(
                "row {} out of range for {} entities",
                index,
                self.len()
            ))),
        }
    }

    /// Entity stored at a row
    pub fn entity(&self, index: usize) -> Option<&str> {
        self.index2entity.get(index).map(String::as_str)
    }

    /// All entities in row order
    pub fn entities(&self) -> &[String] {
        &self.index2entity
    }

    /// Get the vector of an entity
    ///
    /// The view is read-only; mutation goes through `append`.
    pub fn get(&self, entity: &str) -> Result<&[f32]> {
        let index = self.index_of(entity)?;
        Ok(self.vectors.row(index))
    }

    /// Get the vector addressed by a key
    pub fn get_key(&self, key: &EntityKey) -> Result<&[f32]> {
        let index = self.resolve(key)?;
        Ok(self.vectors.row(index))
    }

    /// Raw vector matrix
    pub fn vectors(&self) -> &Matrix {
        &self.vectors
    }

    /// Unit-length rows, computed on first call
    pub fn normalized(&self) -> Arc<Matrix> {
        self.norms.get_or_build(&self.vectors)
    }

    pub fn cache(&self) -> &NormalizedCache {
        &self.norms
    }

    /// Whether the raw vectors were replaced by their normalized form
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Precompute the normalized rows
    ///
    /// With `replace`, the raw vectors are normalized in place and shared
    /// with the cache. The originals are lost and `append` is refused
    /// afterwards.
    pub fn init_sims(&mut self, replace: bool) {
        if !replace {
            self.normalized();
            return;
        }

        info!("Normalizing {} vectors in place", self.len());
        self.norms.invalidate();
        Arc::make_mut(&mut self.vectors).normalize_rows();
        self.norms.set(Arc::clone(&self.vectors));
        self.read_only = true;
    }

    /// Append a single entity
    ///
    /// An existing entity keeps its vector unless `replace` is set.
    pub fn append_one(&mut self, entity: &str, vector: &[f32], replace: bool) -> Result<()> {
        self.append(&[entity], &[vector], replace)
    }

    /// Append a batch of entities
    ///
    /// New entities get the next free index. Existing ones (including a
    /// repeat earlier in the same batch) keep their row unless `replace` is
    /// set, in which case the row is overwritten in place. The whole batch is
    /// validated before anything is written.
    pub fn append<E, V>(&mut self, entities: &[E], vectors: &[V], replace: bool) -> Result<()>
    where
        E: AsRef<str>,
        V: AsRef<[f32]>,
    {
        if self.read_only {
            return Err(VectorError::Unsupported(
                "vectors were normalized in place; the store is read-only".to_string(),
            ));
        }
        if entities.len() != vectors.len() {
            return Err(VectorError::InvalidArgument(format!(
                "{} entities for {} vectors",
                entities.len(),
                vectors.len()
            )));
        }
        let dim = self.vector_size();
        if let Some(bad) = vectors.iter().find(|v| v.as_ref().len() != dim) {
            return Err(VectorError::dimension_mismatch(dim, bad.as_ref().len()));
        }

        let matrix = Arc::make_mut(&mut self.vectors);
        let mut added = 0;
        for (entity, vector) in entities.iter().zip(vectors) {
            let entity = entity.as_ref();
            let vector = vector.as_ref();
            match self.vocab.get(entity) {
                Some(existing) => {
                    if replace {
                        matrix.row_mut(existing.index()).copy_from_slice(vector);
                    }
                }
                None => {
                    let index = self.index2entity.len();
                    self.vocab.insert(entity.to_string(), Vocab::new(index));
                    self.index2entity.push(entity.to_string());
                    matrix.push_row(vector);
                    added += 1;
                }
            }
        }

        debug!("Appended {} new entities (batch of {})", added, entities.len());
        self.norms.invalidate();
        Ok(())
    }

    /// Insert or overwrite an entity
    pub fn set(&mut self, entity: &str, vector: &[f32]) -> Result<()> {
        self.append_one(entity, vector, true)
    }

    /// Entities strictly closer to `entity1` than `entity2` is
    pub fn closer_than(&self, entity1: &str, entity2: &str) -> Result<Vec<String>> {
        SimilarityEngine::new(self).closer_than(entity1, entity2)
    }

    /// 1-based closeness rank of `entity2` relative to `entity1`
    pub fn rank(&self, entity1: &str, entity2: &str) -> Result<usize> {
        SimilarityEngine::new(self).rank(entity1, entity2)
    }

    /// Mutable access to the raw rows. Drops the normalized cache.
    pub(crate) fn vectors_mut(&mut self) -> &mut Matrix {
        self.norms.invalidate();
        Arc::make_mut(&mut self.vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pets() -> KeyedVectors {
        let mut kv = KeyedVectors::new(2);
        kv.append(
            &["cat", "dog", "fish"],
            &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            false,
        )
        .unwrap();
        kv
    }

    #[test]
    fn test_append_and_get() {
        let kv = pets();
        assert_eq!(kv.len(), 3);
        assert!(kv.contains("dog"));
        assert_eq!(kv.get("dog").unwrap(), &[0.0, 1.0]);
        assert_eq!(kv.index_of("fish").unwrap(), 2);
        assert_eq!(kv.entity(0), Some("cat"));
    }

    #[test]
    fn test_append_keeps_existing_without_replace() {
        let mut kv = pets();
        kv.append_one("cat", &[5.0, 5.0], false).unwrap();
        assert_eq!(kv.get("cat").unwrap(), &[1.0, 0.0]);
        assert_eq!(kv.len(), 3);

        kv.append_one("cat", &[5.0, 5.0], true).unwrap();
        assert_eq!(kv.get("cat").unwrap(), &[5.0, 5.0]);
        assert_eq!(kv.index_of("cat").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_within_batch() {
        let mut kv = KeyedVectors::new(1);
        kv.append(&["a", "a"], &[vec![1.0], vec![2.0]], false).unwrap();
        assert_eq!(kv.len(), 1);
        assert_eq!(kv.get("a").unwrap(), &[1.0]);

        kv.append(&["b", "b"], &[vec![1.0], vec![2.0]], true).unwrap();
        assert_eq!(kv.get("b").unwrap(), &[2.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut kv = pets();
        let result = kv.append_one("eel", &[1.0, 0.0, 0.0], false);
        assert!(matches!(result, Err(VectorError::InvalidArgument(_))));
        assert!(!kv.contains("eel"));
    }

    #[test]
    fn test_batch_is_validated_before_writing() {
        let mut kv = pets();
        let result = kv.append(&["eel", "owl"], &[vec![1.0, 0.0], vec![1.0]], false);
        assert!(result.is_err());
        assert_eq!(kv.len(), 3);
    }

    #[test]
    fn test_get_missing() {
        let kv = pets();
        assert!(matches!(kv.get("cow"), Err(VectorError::NotFound(_))));
    }

    #[test]
    fn test_resolve_keys() {
        let kv = pets();
        assert_eq!(kv.resolve(&EntityKey::from("dog")).unwrap(), 1);
        assert_eq!(kv.resolve(&EntityKey::Index(2)).unwrap(), 2);
        assert!(kv.resolve(&EntityKey::Index(3)).is_err());
        assert_eq!(kv.get_key(&EntityKey::Index(0)).unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_append_invalidates_cache() {
        let mut kv = pets();
        kv.normalized();
        assert!(kv.cache().is_built());

        kv.append_one("eel", &[0.0, -1.0], false).unwrap();
        assert!(!kv.cache().is_built());
        assert_eq!(kv.normalized().rows(), 4);
    }

    #[test]
    fn test_init_sims_replace_freezes_store() {
        let mut kv = KeyedVectors::new(2);
        kv.append_one("a", &[3.0, 4.0], false).unwrap();
        kv.init_sims(true);

        assert!(kv.is_read_only());
        assert!(kv.cache().is_built());
        assert!((kv.get("a").unwrap()[0] - 0.6).abs() < 1e-6);

        let result = kv.append_one("b", &[1.0, 0.0], false);
        assert!(matches!(result, Err(VectorError::Unsupported(_))));
    }

    #[test]
    fn test_init_sims_keeps_raw_vectors() {
        let mut kv = KeyedVectors::new(2);
        kv.append_one("a", &[3.0, 4.0], false).unwrap();
        kv.init_sims(false);
        assert!(kv.cache().is_built());
        assert_eq!(kv.get("a").unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_from_parts_rejects_duplicates() {
        let m = Matrix::from_rows(&[vec![1.0], vec![2.0]], 1).unwrap();
        let result = KeyedVectors::from_parts(vec!["a".into(), "a".into()], m);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_count() {
        let mut kv = pets();
        kv.set_count("dog", 17).unwrap();
        assert_eq!(kv.vocab("dog").unwrap().count, 17);
        assert!(kv.set_count("cow", 1).is_err());
    }
}
