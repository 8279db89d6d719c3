//! Host reporting loop.
//!
//! Every cycle the node reports its blocks for each pool and, where this node
//! is the pool's primary reporter and an audit is due, starts an audit round
//! on its own task. The loop never waits for a round.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::audit::{AuditScheduler, ProofOrchestrator, RoundOutcome};
use crate::storage::{snapshot_finalized_blocks, BlockSnapshot, BlockStore};

/// Receiver of the per-cycle block report.
#[async_trait]
pub trait BlockReportSink: Send + Sync {
    async fn report(&self, snapshot: &BlockSnapshot) -> Result<()>;
}

/// Sink that only logs the report.
pub struct LogReportSink;

#[async_trait]
impl BlockReportSink for LogReportSink {
    async fn report(&self, snapshot: &BlockSnapshot) -> Result<()> {
        debug!(
            pool = %snapshot.pool,
            reported = snapshot.reported.len(),
            finalized = snapshot.finalized.len(),
            "Block report"
        );
        Ok(())
    }
}

/// Start an audit round for `pool` on a new task if one is due and none is
/// running. Returns the round's handle when started.
pub fn maybe_start_audit(
    scheduler: &Arc<AuditScheduler>,
    orchestrator: &Arc<ProofOrchestrator>,
    pool: &str,
) -> Option<JoinHandle<RoundOutcome>> {
    if !scheduler.is_audit_due(pool) {
        return None;
    }
    let guard = match scheduler.try_start_audit(pool) {
        Ok(guard) => guard,
        Err(e) => {
            debug!(error = %e, "Audit trigger ignored");
            return None;
        }
    };

    let scheduler = scheduler.clone();
    let orchestrator = orchestrator.clone();
    let pool = pool.to_string();
    Some(tokio::spawn(async move {
        let outcome = orchestrator.run_round(guard).await;
        scheduler.record_outcome(&pool, outcome.to_string());
        outcome
    }))
}

/// Run the reporting loop forever.
pub async fn run_reporting_loop(
    store: Arc<dyn BlockStore>,
    scheduler: Arc<AuditScheduler>,
    orchestrator: Arc<ProofOrchestrator>,
    sink: Arc<dyn BlockReportSink>,
    pools: Vec<String>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        period_ms = period.as_millis() as u64,
        pools = pools.len(),
        "Reporting loop started"
    );

    loop {
        ticker.tick().await;

        let refresh_store = store.clone();
        match tokio::task::spawn_blocking(move || refresh_store.refresh()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Block store refresh failed"),
            Err(e) => warn!(error = %e, "Block store refresh task failed"),
        }

        for pool in &pools {
            let snapshot = snapshot_finalized_blocks(store.as_ref(), pool);
            if let Err(e) = sink.report(&snapshot).await {
                warn!(pool = %pool, error = %e, "Block report failed");
            }

            if maybe_start_audit(&scheduler, &orchestrator, pool).is_some() {
                debug!(pool = %pool, "Audit round spawned");
            }
        }
    }
}
