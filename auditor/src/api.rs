//! HTTP API for the auditor service.
//!
//! Endpoints:
//! - GET /health - Health check with per-pool audit status

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::audit::{AuditScheduler, ProofOrchestrator, RoundState};
use crate::reporter::LedgerReporter;

/// Shared application state for handlers.
pub struct AppState {
    pub scheduler: Arc<AuditScheduler>,
    pub orchestrator: Arc<ProofOrchestrator>,
    pub reporter: Arc<LedgerReporter>,
    pub pools: Vec<String>,
}

/// Audit status of one pool.
#[derive(Debug, Serialize)]
pub struct PoolHealth {
    pub pool: String,
    pub primary: bool,
    pub running: bool,
    pub state: RoundState,
    pub last_outcome: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
    pub pools: Vec<PoolHealth>,
    pub ledger_submitted: u64,
    pub ledger_failed: u64,
}

/// GET /health - Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pools = state
        .pools
        .iter()
        .map(|pool| PoolHealth {
            pool: pool.clone(),
            primary: state.scheduler.is_primary(pool),
            running: state.scheduler.is_running(pool),
            state: state.orchestrator.round_state(pool),
            last_outcome: state.scheduler.last_outcome(pool),
        })
        .collect();

    let stats = state.reporter.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        pools,
        ledger_submitted: stats.submitted.load(Ordering::Relaxed),
        ledger_failed: stats.failed.load(Ordering::Relaxed),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLocks;
    use crate::ledger::MemoryLedger;
    use crate::prover::ZokratesProver;
    use crate::storage::MemoryBlockStore;
    use pos_merkle::ChunkLayout;
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_reports_pools() {
        let ledger = Arc::new(MemoryLedger::new());
        let locks = AuditLocks::new();
        let reporter = Arc::new(LedgerReporter::new(ledger.clone(), locks.ledger.clone()));
        let orchestrator = Arc::new(ProofOrchestrator::new(
            Arc::new(MemoryBlockStore::new()),
            ledger,
            reporter.clone(),
            Arc::new(ZokratesProver::new("zokrates", "/tmp", Duration::from_secs(1))),
            locks,
            ChunkLayout::new(64, 4).unwrap(),
            1,
            1,
        ));
        let scheduler = Arc::new(AuditScheduler::new(
            vec!["a".to_string()],
            Duration::from_secs(60),
        ));
        let _guard = scheduler.try_start_audit("a").unwrap();
        scheduler.record_outcome("b", "seed initialized".to_string());

        let state = Arc::new(AppState {
            scheduler,
            orchestrator,
            reporter,
            pools: vec!["a".to_string(), "b".to_string()],
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["pools"][0]["pool"], "a");
        assert_eq!(body["pools"][0]["primary"], true);
        assert_eq!(body["pools"][0]["running"], true);
        assert_eq!(body["pools"][0]["state"], "Idle");
        assert_eq!(body["pools"][1]["primary"], false);
        assert_eq!(body["pools"][1]["last_outcome"], "seed initialized");
    }
}
