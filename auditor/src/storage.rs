//! Block store seen by the auditor.
//!
//! The storage engine owns block bytes; the auditor only needs a lockable
//! index of which blocks exist per pool and a way to read a block's bytes.
//! The index lock is held just long enough to copy block lists out.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Block file name prefix on disk.
const BLOCK_PREFIX: &str = "blk_";

/// Subdirectory for blocks whose write has completed.
const FINALIZED_DIR: &str = "finalized";

/// Subdirectory for blocks still being written.
const RBW_DIR: &str = "rbw";

/// A block within a pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRef {
    pub pool: String,
    pub block_id: u64,
}

impl BlockRef {
    pub fn new(pool: impl Into<String>, block_id: u64) -> Self {
        Self {
            pool: pool.into(),
            block_id,
        }
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}{}", self.pool, BLOCK_PREFIX, self.block_id)
    }
}

#[derive(Clone, Debug, Default)]
struct PoolIndex {
    reported: BTreeSet<u64>,
    finalized: BTreeSet<u64>,
}

/// Per-pool block ids guarded by the store's read/write lock.
#[derive(Clone, Debug, Default)]
pub struct BlockIndex {
    pools: HashMap<String, PoolIndex>,
}

impl BlockIndex {
    /// Blocks the node currently reports for `pool` (finalized and in flight).
    pub fn reported_blocks(&self, pool: &str) -> Vec<BlockRef> {
        self.pools
            .get(pool)
            .map(|p| {
                p.reported
                    .iter()
                    .map(|id| BlockRef::new(pool, *id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Blocks whose write has completed locally.
    pub fn finalized_blocks(&self, pool: &str) -> Vec<BlockRef> {
        self.pools
            .get(pool)
            .map(|p| {
                p.finalized
                    .iter()
                    .map(|id| BlockRef::new(pool, *id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record a block that is still being written.
    pub fn insert_in_progress(&mut self, block: &BlockRef) {
        let entry = self.pools.entry(block.pool.clone()).or_default();
        entry.reported.insert(block.block_id);
    }

    /// Record a finalized block.
    pub fn insert_finalized(&mut self, block: &BlockRef) {
        let entry = self.pools.entry(block.pool.clone()).or_default();
        entry.reported.insert(block.block_id);
        entry.finalized.insert(block.block_id);
    }

    pub fn remove(&mut self, block: &BlockRef) -> bool {
        match self.pools.get_mut(&block.pool) {
            Some(p) => {
                let was_reported = p.reported.remove(&block.block_id);
                p.finalized.remove(&block.block_id) || was_reported
            }
            None => false,
        }
    }
}

/// Storage engine surface consumed by audits and the reporting loop.
pub trait BlockStore: Send + Sync {
    /// Lock protecting the block index.
    fn index(&self) -> &RwLock<BlockIndex>;

    /// Read a block's bytes. Blocking; call from a blocking context.
    fn read_block(&self, block: &BlockRef) -> io::Result<Vec<u8>>;

    /// Pick up blocks changed outside this process. Blocking.
    fn refresh(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Block lists copied out of the store for one pool.
#[derive(Clone, Debug, Default)]
pub struct BlockSnapshot {
    pub pool: String,
    pub reported: Vec<BlockRef>,
    pub finalized: Vec<BlockRef>,
}

/// Copy the reported and finalized lists of `pool` under the read lock.
pub fn snapshot_finalized_blocks(store: &dyn BlockStore, pool: &str) -> BlockSnapshot {
    let index = store.index().read();
    let reported = index.reported_blocks(pool);
    let finalized = index.finalized_blocks(pool);
    drop(index);

    BlockSnapshot {
        pool: pool.to_string(),
        reported,
        finalized,
    }
}

/// Filesystem block store: `<root>/<pool>/{finalized,rbw}/blk_<id>`.
pub struct FsBlockStore {
    root: PathBuf,
    index: RwLock<BlockIndex>,
    /// Held across a whole rescan and around each on-disk mutation
    fs_lock: Mutex<()>,
}

impl FsBlockStore {
    /// Open a store rooted at `root`, creating it if missing.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let store = Self {
            root,
            index: RwLock::new(BlockIndex::default()),
            fs_lock: Mutex::new(()),
        };
        store.rescan()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, block: &BlockRef, dir: &str) -> PathBuf {
        self.root
            .join(&block.pool)
            .join(dir)
            .join(format!("{}{}", BLOCK_PREFIX, block.block_id))
    }

    /// Rebuild the index from disk. Readers keep the old index during the
    /// walk; writers wait for the swap.
    pub fn rescan(&self) -> io::Result<usize> {
        let _fs = self.fs_lock.lock();
        let mut fresh = BlockIndex::default();
        let mut count = 0;

        for pool_entry in std::fs::read_dir(&self.root)? {
            let pool_entry = pool_entry?;
            if !pool_entry.file_type()?.is_dir() {
                continue;
            }
            let Some(pool) = pool_entry.file_name().to_str().map(String::from) else {
                continue;
            };

            for id in scan_block_ids(&pool_entry.path().join(FINALIZED_DIR))? {
                fresh.insert_finalized(&BlockRef::new(&pool, id));
                count += 1;
            }
            for id in scan_block_ids(&pool_entry.path().join(RBW_DIR))? {
                fresh.insert_in_progress(&BlockRef::new(&pool, id));
                count += 1;
            }
        }

        *self.index.write() = fresh;
        debug!(root = ?self.root, blocks = count, "Block index rescanned");
        Ok(count)
    }

    /// Write a block that is still open for appends.
    pub fn write_in_progress(&self, block: &BlockRef, bytes: &[u8]) -> io::Result<()> {
        let _fs = self.fs_lock.lock();
        let path = self.block_path(block, RBW_DIR);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        self.index.write().insert_in_progress(block);
        Ok(())
    }

    /// Move a block from in-progress to finalized.
    pub fn finalize(&self, block: &BlockRef) -> io::Result<()> {
        let _fs = self.fs_lock.lock();
        let from = self.block_path(block, RBW_DIR);
        let to = self.block_path(block, FINALIZED_DIR);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&from, &to)?;
        self.index.write().insert_finalized(block);
        info!(block = %block, "Block finalized");
        Ok(())
    }
}

impl BlockStore for FsBlockStore {
    fn index(&self) -> &RwLock<BlockIndex> {
        &self.index
    }

    fn read_block(&self, block: &BlockRef) -> io::Result<Vec<u8>> {
        std::fs::read(self.block_path(block, FINALIZED_DIR))
    }

    fn refresh(&self) -> io::Result<()> {
        self.rescan().map(|_| ())
    }
}

fn scan_block_ids(dir: &Path) -> io::Result<Vec<u64>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        match name
            .strip_prefix(BLOCK_PREFIX)
            .and_then(|id| id.parse::<u64>().ok())
        {
            Some(id) => ids.push(id),
            None => warn!(path = ?entry.path(), "Ignoring unrecognized file in block dir"),
        }
    }
    Ok(ids)
}

/// In-memory block store for tests and tooling.
#[derive(Default)]
pub struct MemoryBlockStore {
    index: RwLock<BlockIndex>,
    blocks: RwLock<HashMap<BlockRef, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a finalized block with its bytes.
    pub fn insert(&self, block: BlockRef, bytes: Vec<u8>) {
        self.index.write().insert_finalized(&block);
        self.blocks.write().insert(block, bytes);
    }

    /// Register a finalized block without bytes, so reads fail.
    pub fn insert_missing(&self, block: BlockRef) {
        self.index.write().insert_finalized(&block);
    }
}

impl BlockStore for MemoryBlockStore {
    fn index(&self) -> &RwLock<BlockIndex> {
        &self.index
    }

    fn read_block(&self, block: &BlockRef) -> io::Result<Vec<u8>> {
        self.blocks
            .read()
            .get(block)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, block.to_string()))
    }
}
