//! Legacy Compact Bucket Tables
//!
//! Old persisted tables kept only the bucket rows touched during training,
//! plus a `hash -> compact row` map. Expansion restores the full table so
//! that row `h` is bucket `h` again and the map can be dropped.

use hashbrown::HashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::error::{Result, VectorError};
use crate::vector::Matrix;

/// Seed for the rows appended during expansion
pub const DEFAULT_EXPAND_SEED: u64 = 1;

/// A bucket table as persisted by the legacy format
#[derive(Debug, Clone)]
pub struct CompactBuckets {
    /// Touched rows only, in compact order
    pub rows: Matrix,
    /// Bucket hash -> row in `rows`. `None` if the artifact carried no map.
    pub hash2index: Option<HashMap<u32, usize>>,
}

impl CompactBuckets {
    pub fn new(rows: Matrix, hash2index: HashMap<u32, usize>) -> Self {
        Self {
            rows,
            hash2index: Some(hash2index),
        }
    }

    /// A table that already has every bucket row
    pub fn full(rows: Matrix) -> Self {
        Self {
            rows,
            hash2index: None,
        }
    }

    /// Whether expansion to `bucket_count` rows has work to do
    pub fn is_compact(&self, bucket_count: usize) -> bool {
        self.rows.rows() != bucket_count
    }

    /// Restore the full `bucket_count`-row table
    ///
    /// Missing rows are drawn uniformly from `[-1/D, 1/D]` with a generator
    /// seeded by `seed`, then every mapped row is moved to the position of
    /// its hash. A table that is already full is returned untouched.
    pub fn expand(self, bucket_count: usize, seed: u64) -> Result<Matrix> {
        let compact_rows = self.rows.rows();
        if compact_rows == bucket_count {
            return Ok(self.rows);
        }
        if compact_rows > bucket_count {
            return Err(VectorError::CorruptBuckets(format!(
                "{} stored rows exceed {} buckets",
                compact_rows, bucket_count
            )));
        }

        let hash2index = self.hash2index.ok_or_else(|| {
            VectorError::Unsupported(format!(
                "table has {} of {} bucket rows but no hash map to restore them",
                compact_rows, bucket_count
            ))
        })?;

        warn!(
            "Expanding a compact bucket table ({} of {} rows); save the store again to drop the legacy layout",
            compact_rows, bucket_count
        );

        let source_of = destination_sources(&hash2index, compact_rows, bucket_count)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut table = self.rows;
        table.pad_random(bucket_count - compact_rows, &mut rng);

        let moved = apply_permutation(&mut table, &source_of);
        debug!("Re-homed {} bucket rows", moved);
        Ok(table)
    }
}

/// For every destination bucket, the row that must end up there
///
/// Mapped hashes take their compact row; every other destination takes the
/// next unreferenced row, in ascending order. The result is a permutation.
fn destination_sources(
    hash2index: &HashMap<u32, usize>,
    compact_rows: usize,
    bucket_count: usize,
) -> Result<Vec<usize>> {
    let mut source_of: Vec<Option<usize>> = vec![None; bucket_count];
    let mut referenced = vec![false; bucket_count];

    for (&hash, &row) in hash2index {
        let hash = hash as usize;
        if hash >= bucket_count {
            return Err(VectorError::CorruptBuckets(format!(
                "hash {} outside {} buckets",
                hash, bucket_count
            )));
        }
        if row >= compact_rows {
            return Err(VectorError::CorruptBuckets(format!(
                "hash {} maps to row {} of a {}-row table",
                hash, row, compact_rows
            )));
        }
        if referenced[row] {
            return Err(VectorError::CorruptBuckets(format!(
                "row {} is mapped by more than one hash",
                row
            )));
        }
        referenced[row] = true;
        source_of[hash] = Some(row);
    }

    let mut unreferenced = (0..bucket_count).filter(|&row| !referenced[row]);
    source_of
        .into_iter()
        .map(|source| match source {
            Some(row) => Ok(row),
            None => unreferenced.next().ok_or_else(|| {
                VectorError::CorruptBuckets("ran out of rows while expanding".to_string())
            }),
        })
        .collect()
}

/// Move row `source_of[d]` to `d` for every `d`, in place
///
/// Walks each permutation cycle once, tracking visited rows, so no row is
/// ever swapped back. Returns the number of rows that moved.
fn apply_permutation(table: &mut Matrix, source_of: &[usize]) -> usize {
    let mut visited = vec![false; source_of.len()];
    let mut scratch = vec![0.0f32; table.cols()];
    let mut moved = 0;

    for start in 0..source_of.len() {
        if visited[start] || source_of[start] == start {
            visited[start] = true;
            continue;
        }

        scratch.copy_from_slice(table.row(start));
        let mut dest = start;
        loop {
            visited[dest] = true;
            moved += 1;
            let source = source_of[dest];
            if source == start {
                table.row_mut(dest).copy_from_slice(&scratch);
                break;
            }
            table.copy_row(source, dest);
            dest = source;
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compact(rows: &[[f32; 2]], pairs: &[(u32, usize)]) -> CompactBuckets {
        let rows: Vec<Vec<f32>> = rows.iter().map(|r| r.to_vec()).collect();
        let matrix = Matrix::from_rows(&rows, 2).unwrap();
        CompactBuckets::new(matrix, pairs.iter().copied().collect())
    }

    fn assert_rehomed(before: &CompactBuckets, expanded: &Matrix) {
        let map = before.hash2index.as_ref().unwrap();
        for (&hash, &row) in map {
            assert_eq!(expanded.row(hash as usize), before.rows.row(row), "hash {}", hash);
        }
    }

    #[test]
    fn test_full_table_is_untouched() {
        let buckets = compact(&[[1.0, 2.0], [3.0, 4.0]], &[(0, 1), (1, 0)]);
        let before = buckets.rows.clone();
        let expanded = buckets.expand(2, DEFAULT_EXPAND_SEED).unwrap();
        assert_eq!(expanded, before);
    }

    #[test]
    fn test_rows_land_on_their_hash() {
        let buckets = compact(
            &[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]],
            &[(0, 2), (1, 0), (2, 1)],
        );
        let expanded = buckets.clone().expand(6, DEFAULT_EXPAND_SEED).unwrap();
        assert_eq!(expanded.rows(), 6);
        assert_rehomed(&buckets, &expanded);
    }

    #[test]
    fn test_hashes_beyond_compact_range() {
        let buckets = compact(
            &[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]],
            &[(7, 0), (2, 1), (0, 2)],
        );
        let expanded = buckets.clone().expand(8, DEFAULT_EXPAND_SEED).unwrap();
        assert_rehomed(&buckets, &expanded);

        // fresh rows stay inside the init range
        for h in [1usize, 3, 4, 5, 6] {
            assert!(expanded.row(h).iter().all(|x| x.abs() <= 0.5));
        }
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let buckets = compact(&[[1.0, 1.0]], &[(3, 0)]);
        let a = buckets.clone().expand(5, 9).unwrap();
        let b = buckets.clone().expand(5, 9).unwrap();
        let c = buckets.expand(5, 10).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_map_is_unsupported() {
        let buckets = CompactBuckets::full(Matrix::zeros(2, 2));
        assert!(buckets.is_compact(4));
        let result = buckets.expand(4, DEFAULT_EXPAND_SEED);
        assert!(matches!(result, Err(VectorError::Unsupported(_))));
    }

    #[test]
    fn test_corrupt_maps() {
        let hash_out_of_range = compact(&[[1.0, 1.0]], &[(9, 0)]);
        assert!(matches!(
            hash_out_of_range.expand(4, 1),
            Err(VectorError::CorruptBuckets(_))
        ));

        let row_out_of_range = compact(&[[1.0, 1.0]], &[(0, 3)]);
        assert!(matches!(
            row_out_of_range.expand(4, 1),
            Err(VectorError::CorruptBuckets(_))
        ));

        let shared_row = compact(&[[1.0, 1.0], [2.0, 2.0]], &[(0, 1), (3, 1)]);
        assert!(matches!(
            shared_row.expand(4, 1),
            Err(VectorError::CorruptBuckets(_))
        ));

        let too_many_rows = compact(&[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]], &[]);
        assert!(matches!(
            too_many_rows.expand(2, 1),
            Err(VectorError::CorruptBuckets(_))
        ));
    }

    #[test]
    fn test_permutation_cycles() {
        let mut table = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]], 1).unwrap();
        // new[d] = old[source_of[d]]
        let moved = apply_permutation(&mut table, &[2, 0, 1, 3]);
        assert_eq!(table.as_slice(), &[2.0, 0.0, 1.0, 3.0]);
        assert_eq!(moved, 3);
    }
}
