//! Property-based tests for store and query laws.

#![allow(clippy::expect_used, clippy::float_cmp)]

use proptest::prelude::*;

use crate::subword::CompactBuckets;
use crate::vector::{KeyedVectors, Matrix, QueryOptions, SimilarityEngine};
use hashbrown::HashMap;

const DIM: usize = 3;

/// Strategy for a non-degenerate vector
fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, DIM)
        .prop_filter("not near zero", |v| v.iter().map(|x| x * x).sum::<f32>() > 0.01)
}

/// Strategy for a store of `e0..eN` with random vectors
fn arb_store() -> impl Strategy<Value = KeyedVectors> {
    prop::collection::vec(arb_vector(), 2..12).prop_map(|rows| {
        let entities = (0..rows.len()).map(|i| format!("e{}", i)).collect();
        let matrix = Matrix::from_rows(&rows, DIM).expect("rows have the declared width");
        KeyedVectors::from_parts(entities, matrix).expect("entities are unique")
    })
}

/// Strategy for a bucket count and the hashes a compact table keeps
fn arb_compact_layout() -> impl Strategy<Value = (usize, Vec<u32>)> {
    (1usize..24).prop_flat_map(|bucket| {
        let all: Vec<u32> = (0..bucket as u32).collect();
        (
            Just(bucket),
            prop::sample::subsequence(all, 0..bucket).prop_shuffle(),
        )
    })
}

proptest! {
    #[test]
    fn append_keeps_existing_unless_replaced(mut store in arb_store(), v in arb_vector()) {
        let before = store.get("e0").expect("e0 is stored").to_vec();
        let len = store.len();

        store.append(&["e0", "new"], &[v.as_slice(), v.as_slice()], false).expect("append");
        prop_assert_eq!(store.get("e0").expect("e0"), before.as_slice());
        prop_assert_eq!(store.index_of("new").expect("new"), len);
        prop_assert_eq!(store.len(), len + 1);

        store.append(&["e0"], &[v.as_slice()], true).expect("replace");
        prop_assert_eq!(store.get("e0").expect("e0"), v.as_slice());
        prop_assert_eq!(store.len(), len + 1);
    }

    #[test]
    fn self_similarity_is_one(store in arb_store()) {
        let engine = SimilarityEngine::new(&store);
        for entity in store.entities() {
            let sim = engine.similarity(entity, entity).expect("stored");
            prop_assert!((sim - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn most_similar_is_ranked_and_excludes_inputs(store in arb_store(), topn in 0usize..15) {
        let engine = SimilarityEngine::new(&store);
        let result = engine
            .most_similar(&["e0".into()], &[], QueryOptions::default().with_topn(topn))
            .expect("query");

        prop_assert!(result.len() <= topn);
        prop_assert_eq!(result.len(), topn.min(store.len() - 1));
        prop_assert!(result.iter().all(|(e, _)| e != "e0"));
        prop_assert!(result.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn rank_counts_closer_entities(store in arb_store()) {
        let last = format!("e{}", store.len() - 1);
        let closer = store.closer_than("e0", &last).expect("stored");
        let rank = store.rank("e0", &last).expect("stored");
        prop_assert_eq!(rank, closer.len() + 1);
        prop_assert!(!closer.contains(&"e0".to_string()));
        prop_assert!(!closer.contains(&last));
    }

    #[test]
    fn expand_rehomes_every_mapped_row((bucket, hashes) in arb_compact_layout(), seed in any::<u64>()) {
        let rows: Vec<Vec<f32>> = (0..hashes.len())
            .map(|i| vec![100.0 + i as f32, -(i as f32)])
            .collect();
        let compact = Matrix::from_rows(&rows, 2).expect("width 2");
        let hash2index: HashMap<u32, usize> = hashes.iter().enumerate().map(|(i, &h)| (h, i)).collect();

        let table = CompactBuckets::new(compact, hash2index)
            .expand(bucket, seed)
            .expect("valid layout");

        prop_assert_eq!(table.rows(), bucket);
        for (i, &h) in hashes.iter().enumerate() {
            prop_assert_eq!(table.row(h as usize), rows[i].as_slice());
        }
        // fresh rows are padding, never a stored row
        let fresh = table.iter_rows().filter(|r| r[0].abs() <= 0.5).count();
        prop_assert_eq!(fresh, bucket - hashes.len());
    }
}
