//! Similarity Engine
//!
//! Weighted analogy queries, top-N ranking and distance utilities over any
//! store that can hand out unit-length entity vectors.

use hashbrown::HashSet;
use std::borrow::Cow;
use std::cmp::Ordering;
use tracing::{debug, warn};

use super::similarity::{add_scaled, cosine_similarity, dot_product, normalize_vector, normalized};
use super::store::KeyedVectors;
use super::vocab::EntityKey;
use crate::error::{Result, VectorError};

/// Denominator guard of the multiplicative objective
const COSMUL_EPSILON: f64 = 1e-6;

/// Default number of neighbours returned by a query
pub const DEFAULT_TOPN: usize = 10;

/// A store the engine can query
pub trait VectorSource {
    /// The underlying entity table used for ranking
    fn keyed(&self) -> &KeyedVectors;

    /// Raw vector of an entity
    fn entity_vector(&self, entity: &str) -> Result<Cow<'_, [f32]>>;

    /// Unit-length vector of an entity
    fn unit_vector(&self, entity: &str) -> Result<Vec<f32>>;
}

impl VectorSource for KeyedVectors {
    fn keyed(&self) -> &KeyedVectors {
        self
    }

    fn entity_vector(&self, entity: &str) -> Result<Cow<'_, [f32]>> {
        self.get(entity).map(Cow::Borrowed)
    }

    fn unit_vector(&self, entity: &str) -> Result<Vec<f32>> {
        let index = self.index_of(entity)?;
        Ok(self.normalized().row(index).to_vec())
    }
}

/// External approximate nearest-neighbour index
///
/// When supplied to a query it replaces brute-force ranking entirely.
pub trait ApproximateIndex {
    fn most_similar(&self, query: &[f32], topn: usize) -> Vec<(String, f32)>;
}

/// One side of a query: an entity or a raw vector
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Entity(EntityKey),
    /// Used as-is, without normalization
    Vector(Vec<f32>),
}

impl From<&str> for Term {
    fn from(name: &str) -> Self {
        Term::Entity(name.into())
    }
}

impl From<String> for Term {
    fn from(name: String) -> Self {
        Term::Entity(name.into())
    }
}

impl From<usize> for Term {
    fn from(index: usize) -> Self {
        Term::Entity(EntityKey::Index(index))
    }
}

impl From<EntityKey> for Term {
    fn from(key: EntityKey) -> Self {
        Term::Entity(key)
    }
}

impl From<Vec<f32>> for Term {
    fn from(vector: Vec<f32>) -> Self {
        Term::Vector(vector)
    }
}

impl From<&[f32]> for Term {
    fn from(vector: &[f32]) -> Self {
        Term::Vector(vector.to_vec())
    }
}

/// A query term with an optional explicit weight
///
/// Without a weight, positive terms count +1.0 and negative terms -1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTerm {
    pub term: Term,
    pub weight: Option<f32>,
}

impl WeightedTerm {
    pub fn new(term: impl Into<Term>) -> Self {
        Self {
            term: term.into(),
            weight: None,
        }
    }

    pub fn weighted(term: impl Into<Term>, weight: f32) -> Self {
        Self {
            term: term.into(),
            weight: Some(weight),
        }
    }
}

impl From<&str> for WeightedTerm {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for WeightedTerm {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<usize> for WeightedTerm {
    fn from(index: usize) -> Self {
        Self::new(index)
    }
}

impl From<Vec<f32>> for WeightedTerm {
    fn from(vector: Vec<f32>) -> Self {
        Self::new(vector)
    }
}

impl From<Term> for WeightedTerm {
    fn from(term: Term) -> Self {
        Self::new(term)
    }
}

impl From<(&str, f32)> for WeightedTerm {
    fn from((name, weight): (&str, f32)) -> Self {
        Self::weighted(name, weight)
    }
}

impl From<(Vec<f32>, f32)> for WeightedTerm {
    fn from((vector, weight): (Vec<f32>, f32)) -> Self {
        Self::weighted(vector, weight)
    }
}

/// Ranking options shared by the query methods
#[derive(Clone, Copy)]
pub struct QueryOptions<'a> {
    /// Number of results; 0 yields an empty list
    pub topn: usize,
    /// Only rank the first `n` rows (frequency-sorted tables)
    pub restrict_vocab: Option<usize>,
    /// Delegate ranking to an approximate index
    pub indexer: Option<&'a dyn ApproximateIndex>,
}

impl Default for QueryOptions<'_> {
    fn default() -> Self {
        Self {
            topn: DEFAULT_TOPN,
            restrict_vocab: None,
            indexer: None,
        }
    }
}

impl<'a> QueryOptions<'a> {
    pub fn with_topn(mut self, topn: usize) -> Self {
        self.topn = topn;
        self
    }

    pub fn with_restrict_vocab(mut self, limit: usize) -> Self {
        self.restrict_vocab = Some(limit);
        self
    }

    pub fn with_indexer(mut self, indexer: &'a dyn ApproximateIndex) -> Self {
        self.indexer = Some(indexer);
        self
    }
}

/// Query engine bound to a vector source
pub struct SimilarityEngine<'a, S: VectorSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: VectorSource + ?Sized> SimilarityEngine<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    fn store(&self) -> &'a KeyedVectors {
        self.source.keyed()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        let dim = self.store().vector_size();
        if vector.len() != dim {
            return Err(VectorError::dimension_mismatch(dim, vector.len()));
        }
        Ok(())
    }

    fn unit_vector_of(&self, key: &EntityKey) -> Result<Vec<f32>> {
        match key {
            EntityKey::Name(name) => self.source.unit_vector(name),
            EntityKey::Index(_) => {
                let index = self.store().resolve(key)?;
                Ok(self.store().normalized().row(index).to_vec())
            }
        }
    }

    /// Row of an input entity, if it has one. OOV inputs have none.
    fn input_row(&self, key: &EntityKey) -> Option<usize> {
        self.store().resolve(key).ok()
    }

    /// Weighted unit-sum of all terms, plus the rows of input entities
    fn compose_query(
        &self,
        positive: &[WeightedTerm],
        negative: &[WeightedTerm],
    ) -> Result<(Vec<f32>, HashSet<usize>)> {
        let mut query = vec![0.0f32; self.store().vector_size()];
        let mut inputs = HashSet::new();
        let mut used = 0;

        let signed = positive
            .iter()
            .map(|t| (t, 1.0f32))
            .chain(negative.iter().map(|t| (t, -1.0f32)));

        for (term, default_weight) in signed {
            let weight = term.weight.unwrap_or(default_weight);
            match &term.term {
                Term::Vector(vector) => {
                    self.check_dimension(vector)?;
                    add_scaled(&mut query, vector, weight);
                }
                Term::Entity(key) => {
                    let unit = self.unit_vector_of(key)?;
                    add_scaled(&mut query, &unit, weight);
                    if let Some(row) = self.input_row(key) {
                        inputs.insert(row);
                    }
                }
            }
            used += 1;
        }

        if used == 0 {
            return Err(VectorError::InvalidArgument(
                "cannot compute similarity with no input".to_string(),
            ));
        }

        normalize_vector(&mut query);
        Ok((query, inputs))
    }

    fn candidate_rows(&self, restrict_vocab: Option<usize>) -> usize {
        let rows = self.store().len();
        restrict_vocab.map_or(rows, |limit| limit.min(rows))
    }

    /// Stable descending sort; take `topn + |inputs|`, drop inputs, truncate
    fn top_ranked<T: Copy + PartialOrd>(
        &self,
        scores: &[T],
        topn: usize,
        inputs: &HashSet<usize>,
    ) -> Vec<(String, T)> {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

        let entities = self.store().entities();
        order
            .into_iter()
            .take(topn + inputs.len())
            .filter(|i| !inputs.contains(i))
            .take(topn)
            .map(|i| (entities[i].clone(), scores[i]))
            .collect()
    }

    /// Cosine score of every candidate row against the composed query
    ///
    /// This is the full, unranked score vector of `most_similar`.
    pub fn similarity_scores(
        &self,
        positive: &[WeightedTerm],
        negative: &[WeightedTerm],
        restrict_vocab: Option<usize>,
    ) -> Result<Vec<f32>> {
        let (query, _) = self.compose_query(positive, negative)?;
        Ok(self.scores_against(&query, restrict_vocab))
    }

    fn scores_against(&self, query: &[f32], restrict_vocab: Option<usize>) -> Vec<f32> {
        let norms = self.store().normalized();
        (0..self.candidate_rows(restrict_vocab))
            .map(|i| dot_product(norms.row(i), query))
            .collect()
    }

    /// Find the top-N entities closest to the weighted query
    ///
    /// Positive terms pull towards, negative terms push away. Input entities
    /// never appear in the result.
    pub fn most_similar(
        &self,
        positive: &[WeightedTerm],
        negative: &[WeightedTerm],
        options: QueryOptions<'_>,
    ) -> Result<Vec<(String, f32)>> {
        if options.topn < 1 {
            return Ok(Vec::new());
        }

        let (query, inputs) = self.compose_query(positive, negative)?;
        if let Some(indexer) = options.indexer {
            debug!("Delegating top-{} ranking to external index", options.topn);
            return Ok(indexer.most_similar(&query, options.topn));
        }

        let scores = self.scores_against(&query, options.restrict_vocab);
        Ok(self.top_ranked(&scores, options.topn, &inputs))
    }

    /// Neighbours of a single entity
    pub fn similar_by_entity(&self, entity: &str, options: QueryOptions<'_>) -> Result<Vec<(String, f32)>> {
        self.most_similar(&[entity.into()], &[], options)
    }

    /// Neighbours of a raw vector
    pub fn similar_by_vector(&self, vector: &[f32], options: QueryOptions<'_>) -> Result<Vec<(String, f32)>> {
        self.most_similar(&[WeightedTerm::new(vector)], &[], options)
    }

    /// Term vectors for the multiplicative objective
    ///
    /// Entity terms are unit vectors, raw vectors are used as-is. The
    /// objective has no notion of weight, so a term carrying an explicit
    /// weight is rejected.
    fn cosmul_terms(&self, terms: &[WeightedTerm], inputs: &mut HashSet<usize>) -> Result<Vec<Vec<f32>>> {
        terms
            .iter()
            .map(|t| {
                if let Some(weight) = t.weight {
                    return Err(VectorError::InvalidArgument(format!(
                        "the multiplicative objective does not take term weights (got {})",
                        weight
                    )));
                }
                match &t.term {
                    Term::Vector(vector) => {
                        self.check_dimension(vector)?;
                        Ok(vector.clone())
                    }
                    Term::Entity(key) => {
                        if let Some(row) = self.input_row(key) {
                            inputs.insert(row);
                        }
                        // same rounding as the additive query
                        let mut unit = self.unit_vector_of(key)?;
                        normalize_vector(&mut unit);
                        Ok(unit)
                    }
                }
            })
            .collect()
    }

    fn cosmul(
        &self,
        positive: &[WeightedTerm],
        negative: &[WeightedTerm],
        restrict_vocab: Option<usize>,
    ) -> Result<(Vec<f64>, HashSet<usize>)> {
        if positive.is_empty() {
            return Err(VectorError::InvalidArgument(
                "cannot compute similarity with no input".to_string(),
            ));
        }

        let mut inputs = HashSet::new();
        let positive = self.cosmul_terms(positive, &mut inputs)?;
        let negative = self.cosmul_terms(negative, &mut inputs)?;

        // cosine shifted into [0, 1]; f64 keeps adjacent f32 cosines apart
        let shifted = |row: &[f32], term: &[f32]| (1.0 + f64::from(dot_product(row, term))) / 2.0;

        let norms = self.store().normalized();
        let scores = (0..self.candidate_rows(restrict_vocab))
            .map(|i| {
                let row = norms.row(i);
                let numerator: f64 = positive.iter().map(|p| shifted(row, p.as_slice())).product();
                let denominator: f64 = negative.iter().map(|n| shifted(row, n.as_slice())).product();
                numerator / (denominator + COSMUL_EPSILON)
            })
            .collect();
        Ok((scores, inputs))
    }

    /// Full score vector of the multiplicative objective
    pub fn cosmul_scores(
        &self,
        positive: &[WeightedTerm],
        negative: &[WeightedTerm],
        restrict_vocab: Option<usize>,
    ) -> Result<Vec<f32>> {
        let (scores, _) = self.cosmul(positive, negative, restrict_vocab)?;
        Ok(scores.into_iter().map(|s| s as f32).collect())
    }

    /// Top-N with the multiplicative combination objective
    ///
    /// Each term contributes `(1 + cos) / 2`; the score is the product over
    /// positive terms divided by the product over negative terms. With one
    /// positive term and no negatives the ranking matches `most_similar`.
    /// Terms must not carry explicit weights.
    pub fn most_similar_cosmul(
        &self,
        positive: &[WeightedTerm],
        negative: &[WeightedTerm],
        options: QueryOptions<'_>,
    ) -> Result<Vec<(String, f32)>> {
        if options.indexer.is_some() {
            return Err(VectorError::Unsupported(
                "the multiplicative objective cannot be delegated to an index".to_string(),
            ));
        }
        if options.topn < 1 {
            return Ok(Vec::new());
        }

        let (scores, inputs) = self.cosmul(positive, negative, options.restrict_vocab)?;
        Ok(self
            .top_ranked(&scores, options.topn, &inputs)
            .into_iter()
            .map(|(entity, score)| (entity, score as f32))
            .collect())
    }

    /// Cosine similarity between two entities
    ///
    /// Normalizes on demand from the raw vectors; does not touch the cache.
    pub fn similarity(&self, entity1: &str, entity2: &str) -> Result<f32> {
        let a = normalized(&self.source.entity_vector(entity1)?);
        let b = normalized(&self.source.entity_vector(entity2)?);
        Ok(dot_product(&a, &b))
    }

    /// Cosine distance between two entities
    pub fn distance(&self, entity1: &str, entity2: &str) -> Result<f32> {
        Ok(1.0 - self.similarity(entity1, entity2)?)
    }

    /// Cosine distances from an entity or vector to `others`, or to every
    /// stored entity (itself included) when `others` is empty
    pub fn distances(&self, from: &Term, others: &[&str]) -> Result<Vec<f32>> {
        let input: Cow<'_, [f32]> = match from {
            Term::Vector(vector) => {
                self.check_dimension(vector)?;
                Cow::Borrowed(vector.as_slice())
            }
            Term::Entity(EntityKey::Name(name)) => self.source.entity_vector(name)?,
            Term::Entity(key) => Cow::Borrowed(self.store().get_key(key)?),
        };

        let vectors = self.store().vectors();
        if others.is_empty() {
            return Ok(vectors
                .iter_rows()
                .map(|row| 1.0 - cosine_similarity(&input, row))
                .collect());
        }

        others
            .iter()
            .map(|other| {
                let index = self.store().index_of(other)?;
                Ok(1.0 - cosine_similarity(&input, vectors.row(index)))
            })
            .collect()
    }

    /// Entities strictly closer to `entity1` than `entity2` is, excluding
    /// `entity1` itself
    pub fn closer_than(&self, entity1: &str, entity2: &str) -> Result<Vec<String>> {
        let all = self.distances(&Term::from(entity1), &[])?;
        let e1 = self.store().index_of(entity1)?;
        let e2 = self.store().index_of(entity2)?;
        let threshold = all[e2];

        Ok(all
            .iter()
            .enumerate()
            .filter(|&(i, &d)| d < threshold && i != e1)
            .map(|(i, _)| self.store().entities()[i].clone())
            .collect())
    }

    /// 1-based rank of `entity2` among all entities by distance from `entity1`
    pub fn rank(&self, entity1: &str, entity2: &str) -> Result<usize> {
        Ok(self.closer_than(entity1, entity2)?.len() + 1)
    }

    /// The entity furthest from the mean of the group
    ///
    /// Unknown entities are skipped with a warning. Ties go to the lower
    /// (score, entity) pair.
    pub fn doesnt_match<E: AsRef<str>>(&self, entities: &[E]) -> Result<String> {
        let mut used = Vec::with_capacity(entities.len());
        let mut vectors = Vec::with_capacity(entities.len());
        let mut ignored = Vec::new();

        for entity in entities {
            let entity = entity.as_ref();
            match self.source.unit_vector(entity) {
                Ok(v) => {
                    used.push(entity);
                    vectors.push(v);
                }
                Err(VectorError::NotFound(_)) => ignored.push(entity),
                Err(e) => return Err(e),
            }
        }

        if !ignored.is_empty() {
            warn!(
                "Vectors for entities {:?} are not present in the model, ignoring these entities",
                ignored
            );
        }
        if used.is_empty() {
            return Err(VectorError::InvalidArgument(
                "cannot select an entity from an empty list".to_string(),
            ));
        }

        let mut mean = vec![0.0f32; self.store().vector_size()];
        for v in &vectors {
            add_scaled(&mut mean, v, 1.0);
        }
        normalize_vector(&mut mean);

        used.iter()
            .zip(&vectors)
            .map(|(entity, v)| (dot_product(v, &mean), *entity))
            .min_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.cmp(b.1))
            })
            .map(|(_, entity)| entity.to_string())
            .ok_or_else(|| VectorError::InvalidArgument("empty entity list".to_string()))
    }

    /// The candidate most similar to `entity`
    pub fn most_similar_to_given<E: AsRef<str>>(&self, entity: &str, candidates: &[E]) -> Result<String> {
        let mut best: Option<(&str, f32)> = None;
        for candidate in candidates {
            let candidate = candidate.as_ref();
            let sim = self.similarity(entity, candidate)?;
            if best.map_or(true, |(_, s)| sim > s) {
                best = Some((candidate, sim));
            }
        }
        best.map(|(c, _)| c.to_string()).ok_or_else(|| {
            VectorError::InvalidArgument("cannot select from an empty candidate list".to_string())
        })
    }

    /// Cosine similarity between the means of two entity sets
    pub fn n_similarity<E: AsRef<str>>(&self, set1: &[E], set2: &[E]) -> Result<f32> {
        if set1.is_empty() || set2.is_empty() {
            return Err(VectorError::InvalidArgument(
                "at least one of the entity sets is empty".to_string(),
            ));
        }
        let mean1 = self.unit_mean(set1)?;
        let mean2 = self.unit_mean(set2)?;
        Ok(dot_product(&mean1, &mean2))
    }

    fn unit_mean<E: AsRef<str>>(&self, entities: &[E]) -> Result<Vec<f32>> {
        let mut mean = vec![0.0f32; self.store().vector_size()];
        for entity in entities {
            add_scaled(&mut mean, &self.source.entity_vector(entity.as_ref())?, 1.0);
        }
        normalize_vector(&mut mean);
        Ok(mean)
    }

    /// `similarity(a, b)` relative to the summed similarity of `a`'s top-N
    pub fn relative_cosine_similarity(&self, a: &str, b: &str, topn: usize) -> Result<f32> {
        let neighbours = self.similar_by_entity(a, QueryOptions::default().with_topn(topn))?;
        if neighbours.is_empty() {
            return Err(VectorError::InvalidArgument(format!(
                "'{}' has no neighbours to compare against",
                a
            )));
        }
        let total: f32 = neighbours.iter().map(|(_, s)| s).sum();
        if total == 0.0 {
            return Err(VectorError::InvalidArgument(format!(
                "top-{} similarities of '{}' sum to zero",
                topn, a
            )));
        }
        Ok(self.similarity(a, b)? / total)
    }
}
