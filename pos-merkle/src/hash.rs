//! Fixed-block hash primitive for storage commitments.
//!
//! Commitments are verified inside an arithmetic circuit that reads message
//! and digest words as big-endian `u32`s. [`Blake2sWords`] is BLAKE2s-256 with
//! that word order: every 4-byte word of the input is loaded big-endian and
//! every output word is stored big-endian. Inputs are whole 64-byte blocks
//! only; the final block is never padded.

use blake2::{Blake2s256, Digest};

use crate::{PosError, Result};

/// Size of one compression block in bytes.
pub const BLOCK_LEN: usize = 64;

/// Size of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A 256-bit commitment hash.
pub type NodeHash = [u8; DIGEST_LEN];

/// Compression function used for leaves and internal nodes.
pub trait HashPrimitive: Send + Sync {
    /// Hash whole blocks. Trailing bytes past the last full block are ignored,
    /// so callers must pass a multiple of [`BLOCK_LEN`].
    fn hash_blocks(&self, input: &[u8]) -> NodeHash;

    /// Hash `input`, whose length must be a positive multiple of [`BLOCK_LEN`].
    fn hash(&self, input: &[u8]) -> Result<NodeHash> {
        if input.is_empty() || input.len() % BLOCK_LEN != 0 {
            return Err(PosError::invalid(format!(
                "hash input must be a positive multiple of {} bytes, got {}",
                BLOCK_LEN,
                input.len()
            )));
        }
        Ok(self.hash_blocks(input))
    }

    /// Parent hash over `left || right`.
    fn hash_pair(&self, left: &NodeHash, right: &NodeHash) -> NodeHash {
        let mut buf = [0u8; BLOCK_LEN];
        buf[..DIGEST_LEN].copy_from_slice(left);
        buf[DIGEST_LEN..].copy_from_slice(right);
        self.hash_blocks(&buf)
    }
}

/// BLAKE2s-256 over big-endian message words.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake2sWords;

impl HashPrimitive for Blake2sWords {
    fn hash_blocks(&self, input: &[u8]) -> NodeHash {
        let mut hasher = Blake2s256::new();
        let mut block = [0u8; BLOCK_LEN];
        for chunk in input.chunks_exact(BLOCK_LEN) {
            swap_words(chunk, &mut block);
            hasher.update(block);
        }

        let out = hasher.finalize();
        let mut digest = [0u8; DIGEST_LEN];
        swap_words(&out, &mut digest);
        digest
    }
}

/// Copy `src` into `dst` reversing the byte order of each 4-byte word.
fn swap_words(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        d[0] = s[3];
        d[1] = s[2];
        d[2] = s[1];
        d[3] = s[0];
    }
}

/// Split a digest into big-endian `u32` words.
pub fn digest_words(digest: &NodeHash) -> [u32; DIGEST_LEN / 4] {
    let mut words = [0u32; DIGEST_LEN / 4];
    for (w, bytes) in words.iter_mut().zip(digest.chunks_exact(4)) {
        *w = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    words
}
