//! Single-writer ledger reporter.
//!
//! Uploads are queued on an unbounded channel and submitted one at a time by
//! a background worker holding the ledger lock, so transactions from this
//! node's signing identity never race each other. `drain()` lets a caller wait
//! until everything it queued has been handed to the ledger.

use anyhow::Result;
use parking_lot::Mutex as SyncMutex;
use pos_merkle::NodeHash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::ledger::Ledger;
use crate::proof::AuditBatch;

/// Item submitted by the background worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upload {
    /// Commitment root of a newly written block
    Digest {
        pool: String,
        block_id: u64,
        root: NodeHash,
    },
}

enum Message {
    Upload(Upload),
    Drain(oneshot::Sender<()>),
}

/// Counters exposed through the health API.
#[derive(Debug, Default)]
pub struct ReporterStats {
    pub submitted: AtomicU64,
    pub failed: AtomicU64,
}

/// Ordered, non-blocking submission queue in front of a [`Ledger`].
pub struct LedgerReporter {
    ledger: Arc<dyn Ledger>,
    ledger_lock: Arc<Mutex<()>>,
    sender: SyncMutex<Option<mpsc::UnboundedSender<Message>>>,
    stats: Arc<ReporterStats>,
}

impl LedgerReporter {
    /// The worker is started on the first `enqueue` or `drain`, which must
    /// happen inside a Tokio runtime.
    pub fn new(ledger: Arc<dyn Ledger>, ledger_lock: Arc<Mutex<()>>) -> Self {
        Self {
            ledger,
            ledger_lock,
            sender: SyncMutex::new(None),
            stats: Arc::new(ReporterStats::default()),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn stats(&self) -> &ReporterStats {
        &self.stats
    }

    /// Queue an upload and return immediately.
    pub fn enqueue(&self, upload: Upload) {
        self.send(Message::Upload(upload));
    }

    /// Wait until every upload queued before this call has been submitted,
    /// successfully or not.
    pub async fn drain(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Drain(tx));
        if rx.await.is_err() {
            warn!("Ledger reporter worker stopped before drain completed");
        }
    }

    /// Submit a proof batch directly, bypassing the queue. Takes the ledger
    /// lock for the duration of the call; callers must not already hold it.
    pub async fn submit_batch(&self, batch: &AuditBatch) -> Result<bool> {
        let _ledger = self.ledger_lock.lock().await;
        let accepted = match self.ledger.submit_proofs(batch).await {
            Ok(accepted) => accepted,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(pool = %batch.pool, error = %e, "Proof batch submission failed");
                return Err(e);
            }
        };
        if accepted {
            self.stats.submitted.fetch_add(1, Ordering::Relaxed);
            info!(
                pool = %batch.pool,
                blocks = batch.block_ids.len(),
                proofs = batch.proof_count(),
                "Proof batch accepted"
            );
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(accepted)
    }

    fn send(&self, mut msg: Message) {
        let mut slot = self.sender.lock();
        loop {
            let tx = match slot.as_ref() {
                Some(tx) => tx.clone(),
                None => {
                    let tx = self.spawn_worker();
                    *slot = Some(tx.clone());
                    tx
                }
            };
            match tx.send(msg) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // Worker is gone; start a fresh one and retry
                    warn!("Ledger reporter worker exited, restarting");
                    *slot = None;
                    msg = returned;
                }
            }
        }
    }

    fn spawn_worker(&self) -> mpsc::UnboundedSender<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!("Starting ledger reporter worker");
        tokio::spawn(run_worker(
            self.ledger.clone(),
            self.ledger_lock.clone(),
            self.stats.clone(),
            rx,
        ));
        tx
    }
}

async fn run_worker(
    ledger: Arc<dyn Ledger>,
    ledger_lock: Arc<Mutex<()>>,
    stats: Arc<ReporterStats>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Upload(Upload::Digest {
                pool,
                block_id,
                root,
            }) => {
                let _guard = ledger_lock.lock().await;
                match ledger.upload_digest(&pool, block_id, &root).await {
                    Ok(true) => {
                        stats.submitted.fetch_add(1, Ordering::Relaxed);
                        debug!(pool = %pool, block_id, "Digest uploaded");
                    }
                    Ok(false) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(pool = %pool, block_id, "Digest upload rejected");
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(pool = %pool, block_id, error = %e, "Digest upload failed");
                    }
                }
            }
            Message::Drain(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Ledger reporter worker exiting");
}
