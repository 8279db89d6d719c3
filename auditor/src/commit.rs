//! Block write path: commit a block's Merkle root to the ledger before the
//! block becomes visible to audits.

use anyhow::{Context, Result};
use pos_merkle::{Blake2sWords, ChunkLayout, MerkleCommitment, NodeHash};
use std::sync::Arc;
use tracing::info;

use crate::reporter::{LedgerReporter, Upload};
use crate::storage::{BlockRef, FsBlockStore};

/// Write `bytes` as an in-progress block, queue its digest upload, wait for
/// the reporter to hand it to the ledger, then finalize the block.
///
/// Returns the commitment root.
pub async fn commit_block(
    store: Arc<FsBlockStore>,
    reporter: &LedgerReporter,
    layout: ChunkLayout,
    block: BlockRef,
    bytes: Vec<u8>,
) -> Result<NodeHash> {
    let root = {
        let bytes = bytes.clone();
        tokio::task::spawn_blocking(move || {
            MerkleCommitment::build_with(&Blake2sWords, &bytes, layout).map(|c| c.root())
        })
        .await
        .context("Commitment task failed")??
    };

    let write_store = store.clone();
    let write_block = block.clone();
    tokio::task::spawn_blocking(move || write_store.write_in_progress(&write_block, &bytes))
        .await
        .context("Block write task failed")?
        .with_context(|| format!("Failed to write block {}", block))?;

    reporter.enqueue(Upload::Digest {
        pool: block.pool.clone(),
        block_id: block.block_id,
        root,
    });
    reporter.drain().await;

    let finalize_block = block.clone();
    tokio::task::spawn_blocking(move || store.finalize(&finalize_block))
        .await
        .context("Block finalize task failed")?
        .with_context(|| format!("Failed to finalize block {}", block))?;

    info!(block = %block, root = %hex::encode(root), "Block committed");
    Ok(root)
}
