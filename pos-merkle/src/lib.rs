//! Storage commitments and challenge plumbing for proof-of-storage audits.
//!
//! A storage node commits to each block with a Merkle root, the ledger hands
//! out a per-pool seed, and the node answers challenges derived from that seed
//! with zero-knowledge proofs produced by an external prover.
//!
//! # Architecture
//!
//! ```text
//! COMMIT PHASE:
//!   Block → Tile into Chunks → BLAKE2s Each → Build Merkle Tree → Root
//!
//! AUDIT PHASE:
//!   Seed + Block Id → Keccak Chain → Indices → ProofRequestQueue → Prover
//! ```
//!
//! # Example
//!
//! ```
//! use pos_merkle::{derive, MerkleCommitment, ProofRequestQueue};
//!
//! let block = vec![7u8; 1000];
//! let commitment = MerkleCommitment::build(&block, 64, 16)?;
//!
//! let seed = [1u8; 32];
//! let challenges = derive(&seed, 42, 4, commitment.chunk_count())?;
//!
//! let mut queue = ProofRequestQueue::new(&commitment, &challenges)?;
//! while let Some(request) = queue.pop() {
//!     assert_eq!(request.root, commitment.root());
//! }
//! # Ok::<(), pos_merkle::PosError>(())
//! ```

pub mod challenge;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod request;

pub use challenge::{derive, is_uninitialized, pool_key, Seed, ZERO_SEED};
pub use error::{PosError, Result};
pub use hash::{Blake2sWords, HashPrimitive, NodeHash};
pub use merkle::{tile_chunks, verify_path, ChunkLayout, MerkleCommitment, MerklePath};
pub use request::{ProofRequest, ProofRequestQueue};

/// Default chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Default tree height (8192 chunks)
pub const DEFAULT_TREE_HEIGHT: u32 = 13;

/// Default number of challenges per block and round
pub const DEFAULT_CHALLENGE_COUNT: usize = 8;
