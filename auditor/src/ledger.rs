//! Ledger client: per-pool seeds, digest uploads and proof batch submission.
//!
//! Transaction encoding and signing live behind the ledger gateway; this
//! module forwards the audit fields as JSON and keys pools by
//! `keccak256(pool_id)`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pos_merkle::{pool_key, NodeHash, Seed, ZERO_SEED};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::proof::{AuditBatch, FieldElement};

/// Ledger operations used by audits and the write path.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current seed of `pool`; all zeros when uninitialized.
    async fn get_seed(&self, pool: &str) -> Result<Seed>;

    /// Ask the ledger to initialize the seed of `pool`.
    async fn init_seed(&self, pool: &str, entropy: Seed) -> Result<()>;

    /// Submit a proof batch. `Ok(false)` means the ledger rejected it.
    async fn submit_proofs(&self, batch: &AuditBatch) -> Result<bool>;

    /// Record the commitment root of a block.
    async fn upload_digest(&self, pool: &str, block_id: u64, root: &NodeHash) -> Result<bool>;
}

fn pool_key_hex(pool: &str) -> String {
    format!("0x{}", hex::encode(pool_key(pool)))
}

#[derive(Debug, Deserialize)]
struct SeedResponse {
    seed: FieldElement,
}

#[derive(Debug, Serialize)]
struct InitSeedRequest {
    entropy: FieldElement,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitProofsRequest {
    pub pool_key: String,
    pub block_ids: Vec<u64>,
    pub a: Vec<FieldElement>,
    pub b1: Vec<FieldElement>,
    pub b2: Vec<FieldElement>,
    pub c: Vec<FieldElement>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadDigestRequest {
    pub pool_key: String,
    pub block_id: u64,
    pub root: FieldElement,
}

/// HTTP client for the ledger gateway.
#[derive(Clone)]
pub struct HttpLedger {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpLedger {
    /// Create a new ledger client.
    ///
    /// # Arguments
    /// * `base_url` - Ledger gateway endpoint URL
    /// * `api_key` - Optional API key sent as `X-API-Key`
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build ledger HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T, what: &str) -> Result<bool> {
        let response = self
            .with_key(self.client.post(url))
            .json(body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(status = %status, body = %body, "{} rejected by ledger", what);
                Ok(false)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to ledger");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn get_seed(&self, pool: &str) -> Result<Seed> {
        let url = format!("{}/seed/{}", self.base_url, pool_key_hex(pool));
        let resp = self
            .with_key(self.client.get(&url))
            .send()
            .await
            .context("Failed to fetch seed")?
            .error_for_status()
            .context("Ledger refused seed request")?;

        let body: SeedResponse = resp.json().await.context("Malformed seed response")?;
        Ok(body.seed.0)
    }

    async fn init_seed(&self, pool: &str, entropy: Seed) -> Result<()> {
        let url = format!("{}/seed/{}/init", self.base_url, pool_key_hex(pool));
        let body = InitSeedRequest {
            entropy: FieldElement(entropy),
        };
        if !self.post_json(&url, &body, "Seed initialization").await? {
            anyhow::bail!("ledger rejected seed initialization for {}", pool);
        }
        info!(pool = %pool, "Seed initialization submitted");
        Ok(())
    }

    async fn submit_proofs(&self, batch: &AuditBatch) -> Result<bool> {
        let url = format!("{}/proofs", self.base_url);
        debug!(
            pool = %batch.pool,
            blocks = batch.block_ids.len(),
            proofs = batch.proof_count(),
            "Submitting proof batch"
        );

        let body = SubmitProofsRequest {
            pool_key: pool_key_hex(&batch.pool),
            block_ids: batch.block_ids.clone(),
            a: batch.a.clone(),
            b1: batch.b1.clone(),
            b2: batch.b2.clone(),
            c: batch.c.clone(),
        };
        self.post_json(&url, &body, "Proof batch").await
    }

    async fn upload_digest(&self, pool: &str, block_id: u64, root: &NodeHash) -> Result<bool> {
        let url = format!("{}/digests", self.base_url);
        let body = UploadDigestRequest {
            pool_key: pool_key_hex(pool),
            block_id,
            root: FieldElement(*root),
        };
        self.post_json(&url, &body, "Digest upload").await
    }
}

/// In-memory ledger that records every call, for tests and dry runs.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryLedgerState>,
}

#[derive(Default)]
struct MemoryLedgerState {
    seeds: HashMap<String, Seed>,
    batches: Vec<AuditBatch>,
    digests: Vec<(String, u64, NodeHash)>,
    init_calls: usize,
    fail_uploads: bool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_seed(&self, pool: &str, seed: Seed) {
        self.state.lock().seeds.insert(pool.to_string(), seed);
    }

    /// Make every digest upload fail with an error.
    pub fn fail_uploads(&self, fail: bool) {
        self.state.lock().fail_uploads = fail;
    }

    pub fn batches(&self) -> Vec<AuditBatch> {
        self.state.lock().batches.clone()
    }

    pub fn digests(&self) -> Vec<(String, u64, NodeHash)> {
        self.state.lock().digests.clone()
    }

    pub fn init_calls(&self) -> usize {
        self.state.lock().init_calls
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_seed(&self, pool: &str) -> Result<Seed> {
        Ok(self.state.lock().seeds.get(pool).copied().unwrap_or(ZERO_SEED))
    }

    async fn init_seed(&self, pool: &str, entropy: Seed) -> Result<()> {
        let mut state = self.state.lock();
        state.init_calls += 1;
        state.seeds.insert(pool.to_string(), entropy);
        Ok(())
    }

    async fn submit_proofs(&self, batch: &AuditBatch) -> Result<bool> {
        self.state.lock().batches.push(batch.clone());
        Ok(true)
    }

    async fn upload_digest(&self, pool: &str, block_id: u64, root: &NodeHash) -> Result<bool> {
        let mut state = self.state.lock();
        if state.fail_uploads {
            anyhow::bail!("digest upload failed for {}/{}", pool, block_id);
        }
        state.digests.push((pool.to_string(), block_id, *root));
        Ok(true)
    }
}
