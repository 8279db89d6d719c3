//! Property-based tests for Merkle commitments and proof requests.
//!
//! Tests the following invariants:
//! - Commitment roots are deterministic
//! - Changing any block byte changes the root
//! - Every leaf path replays to the root, and only at its own index
//! - Proof request queues follow challenge order

use crate::strategies::*;
use pos_merkle::{
    derive, tile_chunks, verify_path, Blake2sWords, HashPrimitive, MerkleCommitment,
    ProofRequestQueue,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Same block and layout always produce the same root.
    #[test]
    fn prop_root_is_deterministic((layout, block) in layout_and_block_strategy()) {
        let c1 = MerkleCommitment::build_with(&Blake2sWords, &block, layout).unwrap();
        let c2 = MerkleCommitment::build_with(&Blake2sWords, &block, layout).unwrap();
        prop_assert_eq!(c1.root(), c2.root());
    }

    /// Flipping a single byte of a non-empty block changes the root.
    #[test]
    fn prop_root_changes_with_block_byte(
        (layout, block) in layout_and_block_strategy(),
        pos in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        prop_assume!(!block.is_empty());

        let mut tampered = block.clone();
        let i = pos.index(tampered.len());
        tampered[i] ^= mask;

        let r1 = MerkleCommitment::build_with(&Blake2sWords, &block, layout).unwrap().root();
        let r2 = MerkleCommitment::build_with(&Blake2sWords, &tampered, layout).unwrap().root();
        prop_assert_ne!(r1, r2, "tampered block must change the root");
    }

    /// Tiled data always fills the layout and repeats the block cyclically.
    #[test]
    fn prop_tiling_repeats_block((layout, block) in layout_and_block_strategy()) {
        let tiled = tile_chunks(&block, &layout).unwrap();
        prop_assert_eq!(tiled.len(), layout.capacity());
        if !block.is_empty() {
            for (i, byte) in tiled.iter().enumerate() {
                prop_assert_eq!(*byte, block[i % block.len()]);
            }
        } else {
            prop_assert!(tiled.iter().all(|b| *b == 0));
        }
    }

    /// Every leaf's path replays to the root; the leaf hash matches the chunk.
    #[test]
    fn prop_every_path_replays((layout, block) in layout_and_block_strategy()) {
        let commitment = MerkleCommitment::build_with(&Blake2sWords, &block, layout).unwrap();
        let root = commitment.root();

        for index in 0..layout.chunk_count() {
            let chunk = commitment.chunk(index).unwrap();
            let path = commitment.path(index).unwrap();
            prop_assert_eq!(path.siblings.len(), layout.height() as usize);
            prop_assert_eq!(commitment.leaf(index).unwrap(), Blake2sWords.hash(chunk).unwrap());
            prop_assert!(verify_path(&Blake2sWords, &root, chunk, index, &path));
        }
    }

    /// A path does not verify at a different index.
    #[test]
    fn prop_path_rejects_wrong_index(
        (layout, block) in layout_and_block_strategy(),
        pick in any::<prop::sample::Index>(),
    ) {
        prop_assume!(layout.chunk_count() > 1);

        let commitment = MerkleCommitment::build_with(&Blake2sWords, &block, layout).unwrap();
        let index = pick.index(layout.chunk_count());
        let other = index ^ 1;
        let path = commitment.path(index).unwrap();

        prop_assert!(!verify_path(
            &Blake2sWords,
            &commitment.root(),
            commitment.chunk(index).unwrap(),
            other,
            &path,
        ));
    }

    /// Queues hold one request per challenge, in challenge order, each
    /// carrying the commitment root and a replayable path.
    #[test]
    fn prop_queue_follows_challenges(
        (layout, block) in layout_and_block_strategy(),
        seed in seed_strategy(),
        block_id in any::<u64>(),
        count in 1usize..8,
    ) {
        let commitment = MerkleCommitment::build_with(&Blake2sWords, &block, layout).unwrap();
        let challenges = derive(&seed, block_id, count, layout.chunk_count()).unwrap();
        let mut queue = ProofRequestQueue::new(&commitment, &challenges).unwrap();

        prop_assert_eq!(queue.len(), count);
        for &expected in &challenges {
            let request = queue.pop().unwrap();
            prop_assert_eq!(request.index, expected);
            prop_assert_eq!(request.root, commitment.root());
            prop_assert_eq!(request.siblings.len(), request.bits.len());
        }
        prop_assert!(queue.is_empty());
        prop_assert!(!queue.skip());
    }
}
