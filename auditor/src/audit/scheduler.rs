//! Audit scheduler - decides when a pool may start an audit round and holds
//! the per-pool single-flight guard.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Returned when a round for the pool is already in flight.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("audit already running for pool {pool}")]
pub struct AlreadyRunning {
    pub pool: String,
}

/// Proof that the holder owns the in-flight slot of a pool. Dropping it
/// releases the slot.
#[derive(Debug)]
pub struct AuditGuard {
    pool: String,
    flag: Arc<AtomicBool>,
}

impl AuditGuard {
    pub fn pool(&self) -> &str {
        &self.pool
    }
}

impl Drop for AuditGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        debug!(pool = %self.pool, "Audit guard released");
    }
}

/// Gates audit rounds relative to the host reporting cycle.
pub struct AuditScheduler {
    /// Pools this node reports for as primary; empty means all
    primary_pools: HashSet<String>,
    audit_interval: Duration,
    running: DashMap<String, Arc<AtomicBool>>,
    last_started: DashMap<String, Instant>,
    last_outcome: DashMap<String, String>,
}

impl AuditScheduler {
    pub fn new(primary_pools: impl IntoIterator<Item = String>, audit_interval: Duration) -> Self {
        Self {
            primary_pools: primary_pools.into_iter().collect(),
            audit_interval,
            running: DashMap::new(),
            last_started: DashMap::new(),
            last_outcome: DashMap::new(),
        }
    }

    /// Whether this node is the designated reporter for `pool`.
    pub fn is_primary(&self, pool: &str) -> bool {
        self.primary_pools.is_empty() || self.primary_pools.contains(pool)
    }

    /// True when this node reports `pool` and its audit interval has elapsed
    /// since the last round started.
    pub fn is_audit_due(&self, pool: &str) -> bool {
        if !self.is_primary(pool) {
            return false;
        }
        match self.last_started.get(pool) {
            Some(started) => started.elapsed() >= self.audit_interval,
            None => true,
        }
    }

    /// Claim the in-flight slot for `pool`. Fails without side effects when a
    /// round is already running.
    pub fn try_start_audit(&self, pool: &str) -> Result<AuditGuard, AlreadyRunning> {
        let flag = self
            .running
            .entry(pool.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();

        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AlreadyRunning {
                pool: pool.to_string(),
            });
        }

        self.last_started.insert(pool.to_string(), Instant::now());
        Ok(AuditGuard {
            pool: pool.to_string(),
            flag,
        })
    }

    pub fn is_running(&self, pool: &str) -> bool {
        self.running
            .get(pool)
            .map(|f| f.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Pools with a round currently in flight.
    pub fn running_pools(&self) -> Vec<String> {
        let mut pools: Vec<String> = self
            .running
            .iter()
            .filter(|e| e.value().load(Ordering::Acquire))
            .map(|e| e.key().clone())
            .collect();
        pools.sort();
        pools
    }

    pub fn record_outcome(&self, pool: &str, outcome: String) {
        self.last_outcome.insert(pool.to_string(), outcome);
    }

    pub fn last_outcome(&self, pool: &str) -> Option<String> {
        self.last_outcome.get(pool).map(|o| o.clone())
    }
}
