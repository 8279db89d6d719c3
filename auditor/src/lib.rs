//! Auditor library.
//!
//! The auditor proves to a ledger that this node still stores the blocks it
//! reported. Each round it snapshots the finalized blocks of a pool, derives
//! challenges from the pool's ledger seed, builds Merkle commitments, proves
//! each challenge and submits the batch.
//!
//! - `audit`: round scheduling and the proof orchestrator
//! - `ledger`: seed lookups, digest uploads and proof submission
//! - `reporter`: single-writer queue in front of the ledger
//! - `prover`: external proving backend
//! - `storage`: block store and finalized-block snapshots
//! - `reporting`: the host loop that triggers rounds
//! - `commit`: the block write path

pub mod api;
pub mod audit;
pub mod commit;
pub mod config;
pub mod ledger;
pub mod proof;
pub mod prover;
pub mod reporter;
pub mod reporting;
pub mod storage;
