//! Audit rounds: scheduling, commitment building, proving and submission.

pub mod orchestrator;
pub mod scheduler;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use orchestrator::{ProofOrchestrator, RoundOutcome, RoundState};
pub use scheduler::{AlreadyRunning, AuditGuard, AuditScheduler};

/// The two process-wide locks over external resources. They are never held
/// at the same time.
#[derive(Clone, Default)]
pub struct AuditLocks {
    /// Serializes use of the prover toolchain and its scratch files
    pub prover: Arc<Mutex<()>>,
    /// Serializes ledger transactions from this node's signing identity
    pub ledger: Arc<Mutex<()>>,
}

impl AuditLocks {
    pub fn new() -> Self {
        Self::default()
    }
}
