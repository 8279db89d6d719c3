//! Property-based tests for audit rounds.
//!
//! Tests the following invariants:
//! - A submitted batch has exactly one slot per challenge of every audited
//!   block, whatever the prover failure pattern
//! - A prover failure turns the rest of that block into placeholders
//! - At most one round per pool is in flight
//! - Draining the reporter flushes every upload queued before it

use async_trait::async_trait;
use auditor::audit::{AuditLocks, AuditScheduler, ProofOrchestrator, RoundOutcome};
use auditor::ledger::MemoryLedger;
use auditor::proof::{FieldElement, ProofTuple};
use auditor::prover::{ProofBackend, ProverError};
use auditor::reporter::{LedgerReporter, Upload};
use auditor::storage::{BlockRef, MemoryBlockStore};
use pos_merkle::{ChunkLayout, ProofRequest};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::strategies::*;

const POOL: &str = "pool-prop";

/// Prover whose n-th call fails when `fail[n]` is set.
struct PatternProver {
    fail: Vec<bool>,
    calls: AtomicUsize,
}

#[async_trait]
impl ProofBackend for PatternProver {
    async fn prove(&self, _b: &BlockRef, _r: &ProofRequest) -> Result<ProofTuple, ProverError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.get(n).copied().unwrap_or(false) {
            return Err(ProverError::Malformed("pattern failure".to_string()));
        }
        let fe = FieldElement([0x11; 32]);
        Ok(ProofTuple {
            a: [fe, fe],
            b: [[fe, fe], [fe, fe]],
            c: [fe, fe],
        })
    }
}

/// Placeholder count the orchestrator should report for `fail`.
fn expected_placeholders(blocks: usize, count: usize, fail: &[bool]) -> usize {
    let mut call = 0;
    let mut placeholders = 0;
    for _ in 0..blocks {
        for slot in 0..count {
            let failed = fail.get(call).copied().unwrap_or(false);
            call += 1;
            if failed {
                placeholders += count - slot;
                break;
            }
        }
    }
    placeholders
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Batch size is fixed by the snapshot and challenge count; failures only
    /// change which slots are placeholders.
    #[test]
    fn prop_batch_size_survives_prover_failures(
        seed in seed_strategy(),
        blocks in 1usize..5,
        count in 1usize..5,
        fail in prop::collection::vec(any::<bool>(), 0..20),
    ) {
        let rt = runtime();
        let (outcome, batches, calls) = rt.block_on(async {
            let store = Arc::new(MemoryBlockStore::new());
            for id in 0..blocks as u64 {
                store.insert(BlockRef::new(POOL, id), vec![id as u8 + 1; 100]);
            }
            let ledger = Arc::new(MemoryLedger::new());
            ledger.set_seed(POOL, seed);
            let prover = Arc::new(PatternProver { fail: fail.clone(), calls: AtomicUsize::new(0) });
            let locks = AuditLocks::new();
            let reporter = Arc::new(LedgerReporter::new(ledger.clone(), locks.ledger.clone()));
            let orchestrator = ProofOrchestrator::new(
                store,
                ledger.clone(),
                reporter,
                prover.clone(),
                locks,
                ChunkLayout::new(64, 4).unwrap(),
                count,
                2,
            );
            let scheduler = AuditScheduler::new(Vec::new(), Duration::from_secs(60));
            let guard = scheduler.try_start_audit(POOL).unwrap();
            let outcome = orchestrator.run_round(guard).await;
            (outcome, ledger.batches(), prover.calls.load(Ordering::SeqCst))
        });

        let placeholders = expected_placeholders(blocks, count, &fail);
        prop_assert_eq!(
            outcome,
            RoundOutcome::Submitted { blocks, proofs: blocks * count, placeholders }
        );
        prop_assert_eq!(batches.len(), 1);

        let batch = &batches[0];
        prop_assert_eq!(batch.block_ids.clone(), (0..blocks as u64).collect::<Vec<_>>());
        prop_assert_eq!(batch.a.len(), 2 * blocks * count);
        prop_assert_eq!(batch.c.len(), 2 * blocks * count);
        let zero_slots = batch.a.chunks(2).filter(|p| p.iter().all(|f| f.is_zero())).count();
        prop_assert_eq!(zero_slots, placeholders);
        prop_assert_eq!(calls + placeholders, blocks * count + fail_count(blocks, count, &fail));
    }

    /// Only one guard per pool can be held; releasing it frees the slot.
    #[test]
    fn prop_single_flight_per_pool(
        ops in prop::collection::vec((0usize..3, any::<bool>()), 1..40),
    ) {
        let scheduler = AuditScheduler::new(Vec::new(), Duration::from_secs(60));
        let pools = ["a", "b", "c"];
        let mut held: [Option<auditor::audit::AuditGuard>; 3] = [None, None, None];

        for (pool, acquire) in ops {
            if acquire {
                let result = scheduler.try_start_audit(pools[pool]);
                prop_assert_eq!(result.is_ok(), held[pool].is_none());
                if let Ok(guard) = result {
                    held[pool] = Some(guard);
                }
            } else {
                held[pool] = None;
            }
            for (i, name) in pools.iter().enumerate() {
                prop_assert_eq!(scheduler.is_running(name), held[i].is_some());
            }
        }
    }

    /// Every upload queued before a drain reaches the ledger, in order.
    #[test]
    fn prop_drain_flushes_uploads(ids in prop::collection::vec(any::<u64>(), 0..30)) {
        let rt = runtime();
        let digests = rt.block_on(async {
            let ledger = Arc::new(MemoryLedger::new());
            let reporter = LedgerReporter::new(ledger.clone(), Arc::new(tokio::sync::Mutex::new(())));
            for id in &ids {
                reporter.enqueue(Upload::Digest {
                    pool: POOL.to_string(),
                    block_id: *id,
                    root: [(*id % 251) as u8; 32],
                });
            }
            reporter.drain().await;
            ledger.digests()
        });

        prop_assert_eq!(digests.len(), ids.len());
        for ((_, block_id, root), id) in digests.iter().zip(&ids) {
            prop_assert_eq!(*block_id, *id);
            prop_assert_eq!(*root, [(*id % 251) as u8; 32]);
        }
    }
}

/// Number of failing prover calls the orchestrator actually makes.
fn fail_count(blocks: usize, count: usize, fail: &[bool]) -> usize {
    let mut call = 0;
    let mut failures = 0;
    for _ in 0..blocks {
        for _ in 0..count {
            let failed = fail.get(call).copied().unwrap_or(false);
            call += 1;
            if failed {
                failures += 1;
                break;
            }
        }
    }
    failures
}
