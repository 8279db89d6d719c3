//! Property-based tests for challenge derivation.
//!
//! Tests the following invariants:
//! - Derivation is deterministic
//! - Indices always fall inside the chunk range
//! - A shorter derivation is a prefix of a longer one
//! - Pool keys are stable per pool id

use crate::strategies::*;
use pos_merkle::{derive, is_uninitialized, pool_key};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Same inputs always produce the same indices.
    #[test]
    fn prop_derive_is_deterministic(
        seed in seed_strategy(),
        block_id in any::<u64>(),
        count in 1usize..32,
        height in 0u32..=20,
    ) {
        let chunk_count = 1usize << height;
        let i1 = derive(&seed, block_id, count, chunk_count).unwrap();
        let i2 = derive(&seed, block_id, count, chunk_count).unwrap();
        prop_assert_eq!(i1, i2);
    }

    /// Every index is below the chunk count and the result has `count` entries.
    #[test]
    fn prop_derive_in_range(
        seed in seed_strategy(),
        block_id in any::<u64>(),
        count in 1usize..32,
        height in 0u32..=20,
    ) {
        let chunk_count = 1usize << height;
        let indices = derive(&seed, block_id, count, chunk_count).unwrap();
        prop_assert_eq!(indices.len(), count);
        prop_assert!(indices.iter().all(|i| *i < chunk_count));
    }

    /// Each index depends only on the ones before it.
    #[test]
    fn prop_derive_is_prefix_stable(
        seed in seed_strategy(),
        block_id in any::<u64>(),
        short in 1usize..8,
        extra in 0usize..8,
    ) {
        let chunk_count = 1usize << 16;
        let a = derive(&seed, block_id, short, chunk_count).unwrap();
        let b = derive(&seed, block_id, short + extra, chunk_count).unwrap();
        prop_assert_eq!(&a[..], &b[..short]);
    }

    /// Non-power-of-two chunk counts are rejected.
    #[test]
    fn prop_derive_rejects_uneven_chunk_count(
        seed in seed_strategy(),
        chunk_count in 3usize..10_000,
    ) {
        prop_assume!(!chunk_count.is_power_of_two());
        prop_assert!(derive(&seed, 0, 1, chunk_count).is_err());
    }

    /// Pool keys are stable and differ between pools.
    #[test]
    fn prop_pool_key_distinct(a in pool_strategy(), b in pool_strategy()) {
        prop_assert_eq!(pool_key(&a), pool_key(&a));
        if a != b {
            prop_assert_ne!(pool_key(&a), pool_key(&b));
        }
    }

    /// Generated seeds never count as uninitialized.
    #[test]
    fn prop_generated_seed_is_initialized(seed in seed_strategy()) {
        prop_assert!(!is_uninitialized(&seed));
    }
}
