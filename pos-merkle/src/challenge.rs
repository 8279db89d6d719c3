//! Deterministic challenge derivation.
//!
//! The ledger recomputes the same indices when it verifies a batch, so the
//! chain below must stay bit-exact with the on-ledger verifier:
//!
//! ```text
//! t0 = keccak256(seed || uint256(block_id))
//! ti = keccak256(t(i-1) || uint256(block_id))
//! challenge_i = uint256(ti) mod chunk_count
//! ```

use sha3::{Digest, Keccak256};

use crate::{PosError, Result};

/// Per-pool seed held by the ledger.
pub type Seed = [u8; 32];

/// Seed value the ledger reports for a pool that was never initialized.
pub const ZERO_SEED: Seed = [0u8; 32];

/// True when the ledger has not initialized a seed yet.
pub fn is_uninitialized(seed: &Seed) -> bool {
    seed.iter().all(|b| *b == 0)
}

/// Ledger storage key for a pool id.
pub fn pool_key(pool_id: &str) -> [u8; 32] {
    Keccak256::digest(pool_id.as_bytes()).into()
}

/// Encode a block id as a 32-byte big-endian unsigned integer.
fn block_id_word(block_id: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&block_id.to_be_bytes());
    word
}

fn mix(prev: &[u8; 32], id_word: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(prev);
    hasher.update(id_word);
    hasher.finalize().into()
}

/// Reduce a big-endian 256-bit value modulo a power of two.
fn reduce(t: &[u8; 32], chunk_count: usize) -> usize {
    let mut low = [0u8; 8];
    low.copy_from_slice(&t[24..]);
    (u64::from_be_bytes(low) & (chunk_count as u64 - 1)) as usize
}

/// Derive `count` chunk indices in `[0, chunk_count)` for one block.
pub fn derive(seed: &Seed, block_id: u64, count: usize, chunk_count: usize) -> Result<Vec<usize>> {
    if count == 0 {
        return Err(PosError::invalid("challenge count must be at least 1"));
    }
    if !chunk_count.is_power_of_two() {
        return Err(PosError::invalid(format!(
            "chunk count must be a non-zero power of two, got {}",
            chunk_count
        )));
    }

    let id_word = block_id_word(block_id);
    let mut t = mix(seed, &id_word);
    let mut indices = Vec::with_capacity(count);
    indices.push(reduce(&t, chunk_count));
    for _ in 1..count {
        t = mix(&t, &id_word);
        indices.push(reduce(&t, chunk_count));
    }
    Ok(indices)
}
