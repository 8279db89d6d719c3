//! Shared proptest strategies for property-based testing.

use pos_merkle::{ChunkLayout, Seed};
use proptest::prelude::*;

/// Generate a chunk layout with 64..=256 byte chunks and 1..=32 chunks.
pub fn layout_strategy() -> impl Strategy<Value = ChunkLayout> {
    (1usize..=4, 0u32..=5).prop_map(|(blocks, height)| {
        ChunkLayout::from_height(blocks * 64, height).expect("generated layout is valid")
    })
}

/// Generate a layout together with a block that fits it.
pub fn layout_and_block_strategy() -> impl Strategy<Value = (ChunkLayout, Vec<u8>)> {
    layout_strategy().prop_flat_map(|layout| {
        let capacity = layout.capacity();
        (
            Just(layout),
            prop::collection::vec(any::<u8>(), 0..=capacity),
        )
    })
}

/// Generate a 32-byte seed that is not all zeros.
pub fn seed_strategy() -> impl Strategy<Value = Seed> {
    prop::array::uniform32(any::<u8>()).prop_filter("seed must be initialized", |s| {
        s.iter().any(|b| *b != 0)
    })
}

/// Generate a pool id.
pub fn pool_strategy() -> impl Strategy<Value = String> {
    "pool-[a-z0-9]{1,12}"
}

/// Single-threaded runtime for driving async code inside a property.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}
