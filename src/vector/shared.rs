//! Shared Vector Stores
//!
//! Single-writer, many-reader handle for serving queries across threads.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Thread-safe handle to a vector store
///
/// Queries take the read lock and may run in parallel; mutations
/// (`append`, bucket expansion, recomputation) take the write lock and
/// never interleave with a reader.
#[derive(Debug)]
pub struct SharedVectors<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for SharedVectors<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedVectors<T> {
    pub fn new(store: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Run a read-only query
    pub fn query<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.read())
    }

    /// Run a mutation with exclusive access
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.inner.write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{KeyedVectors, QueryOptions, SimilarityEngine};
    use std::thread;

    fn store() -> SharedVectors<KeyedVectors> {
        let mut kv = KeyedVectors::new(2);
        kv.append(
            &["cat", "dog", "fish"],
            &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            false,
        )
        .unwrap();
        SharedVectors::new(kv)
    }

    #[test]
    fn test_parallel_readers() {
        let shared = store();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    shared.query(|kv| {
                        SimilarityEngine::new(kv)
                            .most_similar(&["cat".into()], &[], QueryOptions::default())
                            .unwrap()
                    })
                })
            })
            .collect();

        for handle in handles {
            let result = handle.join().unwrap();
            assert_eq!(result[0].0, "fish");
        }
    }

    #[test]
    fn test_writer_then_readers() {
        let shared = store();
        shared.read().normalized();
        assert!(shared.read().cache().is_built());

        shared
            .mutate(|kv| kv.append_one("eel", &[0.9, 0.1], false))
            .unwrap();
        assert!(!shared.read().cache().is_built());

        let top = shared.query(|kv| {
            SimilarityEngine::new(kv)
                .most_similar(&["cat".into()], &[], QueryOptions::default().with_topn(1))
                .unwrap()
        });
        assert_eq!(top[0].0, "eel");
    }
}
