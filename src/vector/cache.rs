//! Normalized Vector Cache
//!
//! Unit-length copy of a matrix, built on first use and dropped on every
//! structural change of its source.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use super::matrix::Matrix;

/// Cache of L2-normalized rows with explicit invalidation
///
/// The first build is double-checked under the write lock, so concurrent
/// readers racing on an empty cache normalize the source exactly once.
#[derive(Debug, Default)]
pub struct NormalizedCache {
    inner: RwLock<Option<Arc<Matrix>>>,
}

impl Clone for NormalizedCache {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.inner.read().clone()),
        }
    }
}

impl NormalizedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached matrix, if built
    pub fn get(&self) -> Option<Arc<Matrix>> {
        self.inner.read().clone()
    }

    /// Cached matrix, normalizing `source` if the cache is empty
    pub fn get_or_build(&self, source: &Matrix) -> Arc<Matrix> {
        if let Some(cached) = self.get() {
            return cached;
        }

        let mut slot = self.inner.write();
        if let Some(cached) = slot.as_ref() {
            return Arc::clone(cached);
        }

        info!("Precomputing L2-norms of {} vectors", source.rows());
        let built = Arc::new(source.normalized());
        *slot = Some(Arc::clone(&built));
        built
    }

    /// Install an already-normalized matrix
    pub fn set(&self, normalized: Arc<Matrix>) {
        *self.inner.write() = Some(normalized);
    }

    /// Drop the cached matrix
    pub fn invalidate(&self) {
        *self.inner.write() = None;
    }

    pub fn is_built(&self) -> bool {
        self.inner.read().is_some()
    }
}
