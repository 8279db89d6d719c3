//! Audit round state machine.
//!
//! ```text
//! Idle → Snapshotting → SeedCheck → Building → Proving → Submitting → Idle
//!             │              │           │
//!             └── empty      └── zero    └── nothing built ──→ Idle
//!                 snapshot       seed
//! ```
//!
//! Building runs on the blocking pool, one task per block, bounded by a
//! semaphore. Proving is serial across the whole round under the prover lock.
//! Submission happens under the ledger lock after the prover lock is released.

use dashmap::DashMap;
use pos_merkle::{
    derive, is_uninitialized, Blake2sWords, ChunkLayout, MerkleCommitment, PosError,
    ProofRequestQueue, Seed,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audit::scheduler::AuditGuard;
use crate::audit::AuditLocks;
use crate::ledger::Ledger;
use crate::proof::{AuditBatch, BlockProofs, ProofOutcome};
use crate::prover::ProofBackend;
use crate::reporter::LedgerReporter;
use crate::storage::{snapshot_finalized_blocks, BlockRef, BlockStore};

/// Phase of an audit round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RoundState {
    Idle,
    Snapshotting,
    SeedCheck,
    Building,
    Proving,
    Submitting,
}

/// How a round ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A batch was accepted by the ledger
    Submitted {
        blocks: usize,
        proofs: usize,
        placeholders: usize,
    },
    /// The pool has no finalized blocks
    NothingToReport,
    /// The seed was uninitialized; initialization was requested instead
    SeedInitialized,
    /// The round stopped early
    Aborted(String),
}

impl std::fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundOutcome::Submitted {
                blocks,
                proofs,
                placeholders,
            } => write!(
                f,
                "submitted {} blocks, {} proofs ({} placeholders)",
                blocks, proofs, placeholders
            ),
            RoundOutcome::NothingToReport => write!(f, "nothing to report"),
            RoundOutcome::SeedInitialized => write!(f, "seed initialized"),
            RoundOutcome::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// Proof requests for one block, ready for the prover.
struct BlockQueue {
    block: BlockRef,
    challenges: usize,
    queue: ProofRequestQueue,
}

enum BuildOutcome {
    Ready(BlockQueue),
    Unreadable(BlockRef, std::io::Error),
    Malformed(BlockRef, PosError),
}

fn build_block(
    store: &dyn BlockStore,
    block: BlockRef,
    layout: ChunkLayout,
    challenge_count: usize,
    seed: &Seed,
) -> BuildOutcome {
    let bytes = match store.read_block(&block) {
        Ok(bytes) => bytes,
        Err(e) => return BuildOutcome::Unreadable(block, e),
    };

    let prepared = MerkleCommitment::build_with(&Blake2sWords, &bytes, layout).and_then(|c| {
        let challenges = derive(seed, block.block_id, challenge_count, layout.chunk_count())?;
        ProofRequestQueue::new(&c, &challenges)
    });

    match prepared {
        Ok(queue) => BuildOutcome::Ready(BlockQueue {
            block,
            challenges: queue.len(),
            queue,
        }),
        Err(e) => BuildOutcome::Malformed(block, e),
    }
}

/// Runs audit rounds for any pool against shared external resources.
pub struct ProofOrchestrator {
    store: Arc<dyn BlockStore>,
    ledger: Arc<dyn Ledger>,
    reporter: Arc<LedgerReporter>,
    prover: Arc<dyn ProofBackend>,
    locks: AuditLocks,
    layout: ChunkLayout,
    challenge_count: usize,
    build_permits: Arc<Semaphore>,
    states: DashMap<String, RoundState>,
}

impl ProofOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn BlockStore>,
        ledger: Arc<dyn Ledger>,
        reporter: Arc<LedgerReporter>,
        prover: Arc<dyn ProofBackend>,
        locks: AuditLocks,
        layout: ChunkLayout,
        challenge_count: usize,
        build_workers: usize,
    ) -> Self {
        Self {
            store,
            ledger,
            reporter,
            prover,
            locks,
            layout,
            challenge_count,
            build_permits: Arc::new(Semaphore::new(build_workers.max(1))),
            states: DashMap::new(),
        }
    }

    /// Current phase of the round for `pool`.
    pub fn round_state(&self, pool: &str) -> RoundState {
        self.states
            .get(pool)
            .map(|s| *s)
            .unwrap_or(RoundState::Idle)
    }

    fn enter(&self, pool: &str, next: RoundState) {
        let prev = self.states.insert(pool.to_string(), next);
        debug!(pool = %pool, from = ?prev.unwrap_or(RoundState::Idle), to = ?next, "Audit round state");
    }

    /// Run one round for the pool owned by `guard`. The guard is released when
    /// the round ends, whatever the exit path.
    pub async fn run_round(&self, guard: AuditGuard) -> RoundOutcome {
        let pool = guard.pool().to_string();
        info!(pool = %pool, "Audit round started");

        let outcome = self.drive(&pool).await;
        self.enter(&pool, RoundState::Idle);
        drop(guard);

        match &outcome {
            RoundOutcome::Aborted(reason) => {
                warn!(pool = %pool, reason = %reason, "Audit round aborted")
            }
            other => info!(pool = %pool, outcome = %other, "Audit round finished"),
        }
        outcome
    }

    async fn drive(&self, pool: &str) -> RoundOutcome {
        self.enter(pool, RoundState::Snapshotting);
        let snapshot = snapshot_finalized_blocks(self.store.as_ref(), pool);
        if snapshot.finalized.is_empty() {
            return RoundOutcome::NothingToReport;
        }
        debug!(
            pool = %pool,
            finalized = snapshot.finalized.len(),
            reported = snapshot.reported.len(),
            "Snapshot taken"
        );

        self.enter(pool, RoundState::SeedCheck);
        let seed = match self.ledger.get_seed(pool).await {
            Ok(seed) => seed,
            Err(e) => return RoundOutcome::Aborted(format!("seed fetch failed: {}", e)),
        };
        if is_uninitialized(&seed) {
            info!(pool = %pool, "Seed uninitialized, requesting initialization");
            let entropy: Seed = rand::random();
            let _ledger = self.locks.ledger.lock().await;
            return match self.ledger.init_seed(pool, entropy).await {
                Ok(()) => RoundOutcome::SeedInitialized,
                Err(e) => RoundOutcome::Aborted(format!("seed initialization failed: {}", e)),
            };
        }

        self.enter(pool, RoundState::Building);
        let queues = self.build_queues(snapshot.finalized, seed).await;
        if queues.is_empty() {
            return RoundOutcome::Aborted("no block commitments could be built".to_string());
        }

        self.enter(pool, RoundState::Proving);
        let results = self.prove_all(queues).await;

        self.enter(pool, RoundState::Submitting);
        let batch = AuditBatch::assemble(pool, &results);
        if batch.is_empty() {
            return RoundOutcome::NothingToReport;
        }
        let placeholders = results
            .iter()
            .flat_map(|b| b.outcomes.iter())
            .filter(|o| o.is_placeholder())
            .count();

        match self.reporter.submit_batch(&batch).await {
            Ok(true) => RoundOutcome::Submitted {
                blocks: batch.block_ids.len(),
                proofs: batch.proof_count(),
                placeholders,
            },
            Ok(false) => RoundOutcome::Aborted("ledger rejected proof batch".to_string()),
            Err(e) => RoundOutcome::Aborted(format!("proof submission failed: {}", e)),
        }
    }

    /// Build commitments and request queues for every block in parallel.
    /// Results keep snapshot order.
    async fn build_queues(&self, blocks: Vec<BlockRef>, seed: Seed) -> Vec<BlockQueue> {
        let mut handles = Vec::with_capacity(blocks.len());
        for block in blocks {
            let Ok(permit) = self.build_permits.clone().acquire_owned().await else {
                break;
            };
            let store = self.store.clone();
            let layout = self.layout;
            let count = self.challenge_count;
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                build_block(store.as_ref(), block, layout, count, &seed)
            }));
        }

        let mut queues = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(BuildOutcome::Ready(q)) => queues.push(q),
                Ok(BuildOutcome::Unreadable(block, e)) => {
                    debug!(block = %block, error = %e, "Block unreadable, skipped this round");
                }
                Ok(BuildOutcome::Malformed(block, e)) => {
                    warn!(block = %block, error = %e, "Malformed block, skipped this round");
                }
                Err(e) => {
                    warn!(error = %e, "Commitment build task failed");
                }
            }
        }
        queues
    }

    /// Prove every queued request, one at a time, under the prover lock.
    /// A failure fills the failing slot and the rest of that block with
    /// placeholders.
    async fn prove_all(&self, queues: Vec<BlockQueue>) -> Vec<BlockProofs> {
        let _prover = self.locks.prover.lock().await;

        let mut results = Vec::with_capacity(queues.len());
        for mut bq in queues {
            let mut outcomes = Vec::with_capacity(bq.challenges);
            while let Some(request) = bq.queue.pop() {
                match self.prover.prove(&bq.block, &request).await {
                    Ok(tuple) => outcomes.push(ProofOutcome::Computed(tuple)),
                    Err(e) => {
                        warn!(
                            block = %bq.block,
                            index = request.index,
                            remaining = bq.queue.len(),
                            error = %e,
                            "Prover failed, padding block with placeholders"
                        );
                        outcomes.push(ProofOutcome::Placeholder);
                        while bq.queue.skip() {
                            outcomes.push(ProofOutcome::Placeholder);
                        }
                    }
                }
            }
            debug_assert_eq!(outcomes.len(), bq.challenges);
            results.push(BlockProofs {
                block_id: bq.block.block_id,
                outcomes,
            });
        }
        results
    }
}
