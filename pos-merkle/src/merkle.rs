//! Merkle commitment over a block's fixed-size chunks.
//!
//! A block is tiled into `chunk_count` chunks of `chunk_size` bytes, each
//! chunk is hashed into a leaf and leaves are paired level by level until a
//! single root remains:
//!
//! ```text
//!                 root
//!             /          \
//!         n(0,1)        n(2,3)
//!         /    \        /    \
//!       L0     L1     L2     L3      L_i = H(chunk_i)
//! ```
//!
//! Nodes live in an arena and refer to their parent and children by index, so
//! a leaf-to-root walk is a chain of O(1) lookups.

use serde::{Deserialize, Serialize};

use crate::hash::{Blake2sWords, HashPrimitive, NodeHash, BLOCK_LEN};
use crate::{PosError, Result};

/// Largest supported tree height.
pub const MAX_TREE_HEIGHT: u32 = 20;

/// Chunk geometry shared by every commitment of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLayout {
    chunk_size: usize,
    chunk_count: usize,
}

impl ChunkLayout {
    /// Validate a layout. `chunk_size` must be a positive multiple of the hash
    /// block length and `chunk_count` a non-zero power of two.
    pub fn new(chunk_size: usize, chunk_count: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size % BLOCK_LEN != 0 {
            return Err(PosError::invalid(format!(
                "chunk size must be a positive multiple of {}, got {}",
                BLOCK_LEN, chunk_size
            )));
        }
        if !chunk_count.is_power_of_two() {
            return Err(PosError::invalid(format!(
                "chunk count must be a non-zero power of two, got {}",
                chunk_count
            )));
        }
        if chunk_count > 1 << MAX_TREE_HEIGHT {
            return Err(PosError::invalid(format!(
                "chunk count {} exceeds 2^{}",
                chunk_count, MAX_TREE_HEIGHT
            )));
        }
        chunk_size
            .checked_mul(chunk_count)
            .ok_or_else(|| PosError::invalid("chunk capacity overflows usize"))?;
        Ok(Self {
            chunk_size,
            chunk_count,
        })
    }

    /// Layout with `2^height` chunks.
    pub fn from_height(chunk_size: usize, height: u32) -> Result<Self> {
        if height > MAX_TREE_HEIGHT {
            return Err(PosError::invalid(format!(
                "tree height {} exceeds {}",
                height, MAX_TREE_HEIGHT
            )));
        }
        Self::new(chunk_size, 1usize << height)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Number of sibling hashes on every leaf-to-root path.
    pub fn height(&self) -> u32 {
        self.chunk_count.trailing_zeros()
    }

    /// Largest block the layout can commit to.
    pub fn capacity(&self) -> usize {
        self.chunk_size * self.chunk_count
    }
}

/// Tile `block` cyclically into one contiguous buffer of `layout.capacity()`
/// bytes. An empty block is treated as a single zero chunk.
pub fn tile_chunks(block: &[u8], layout: &ChunkLayout) -> Result<Vec<u8>> {
    let capacity = layout.capacity();
    if block.len() > capacity {
        return Err(PosError::MalformedBlock {
            len: block.len(),
            capacity,
        });
    }

    let zero_chunk;
    let source = if block.is_empty() {
        zero_chunk = vec![0u8; layout.chunk_size()];
        &zero_chunk[..]
    } else {
        block
    };

    let mut data = Vec::with_capacity(capacity);
    while data.len() < capacity {
        let take = source.len().min(capacity - data.len());
        data.extend_from_slice(&source[..take]);
    }
    Ok(data)
}

#[derive(Clone, Debug)]
struct MerkleNode {
    hash: NodeHash,
    parent: Option<usize>,
    children: Option<(usize, usize)>,
}

/// Sibling hashes and left/right bits from a leaf up to the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    /// Sibling hash at each level, leaf level first
    pub siblings: Vec<NodeHash>,
    /// `true` when the node on the path is its parent's right child
    pub bits: Vec<bool>,
}

/// Merkle tree over the tiled chunks of one block.
#[derive(Clone, Debug)]
pub struct MerkleCommitment {
    layout: ChunkLayout,
    /// Tiled chunk bytes, `chunk_count * chunk_size` long
    data: Vec<u8>,
    /// Leaves at `[0, chunk_count)`, root last
    nodes: Vec<MerkleNode>,
}

impl MerkleCommitment {
    /// Build a commitment with the default hash primitive.
    pub fn build(block: &[u8], chunk_size: usize, chunk_count: usize) -> Result<Self> {
        let layout = ChunkLayout::new(chunk_size, chunk_count)?;
        Self::build_with(&Blake2sWords, block, layout)
    }

    /// Build a commitment over `block` using `hasher`.
    pub fn build_with<H: HashPrimitive + ?Sized>(
        hasher: &H,
        block: &[u8],
        layout: ChunkLayout,
    ) -> Result<Self> {
        let data = tile_chunks(block, &layout)?;
        let leaf_count = layout.chunk_count();

        let mut nodes = Vec::with_capacity(2 * leaf_count - 1);
        for chunk in data.chunks_exact(layout.chunk_size()) {
            nodes.push(MerkleNode {
                hash: hasher.hash_blocks(chunk),
                parent: None,
                children: None,
            });
        }

        let mut level_start = 0;
        let mut level_len = leaf_count;
        while level_len > 1 {
            let next_start = nodes.len();
            for pair in 0..level_len / 2 {
                let left = level_start + 2 * pair;
                let right = left + 1;
                let parent = nodes.len();
                let hash = hasher.hash_pair(&nodes[left].hash, &nodes[right].hash);
                nodes.push(MerkleNode {
                    hash,
                    parent: None,
                    children: Some((left, right)),
                });
                nodes[left].parent = Some(parent);
                nodes[right].parent = Some(parent);
            }
            level_start = next_start;
            level_len /= 2;
        }

        Ok(Self {
            layout,
            data,
            nodes,
        })
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn chunk_count(&self) -> usize {
        self.layout.chunk_count()
    }

    /// Root hash of the commitment.
    pub fn root(&self) -> NodeHash {
        // at least one leaf always exists and the root is pushed last
        self.nodes[self.nodes.len() - 1].hash
    }

    /// Chunk bytes behind leaf `index`.
    pub fn chunk(&self, index: usize) -> Result<&[u8]> {
        self.check_index(index)?;
        let size = self.layout.chunk_size();
        Ok(&self.data[index * size..(index + 1) * size])
    }

    /// Leaf hash at `index`.
    pub fn leaf(&self, index: usize) -> Result<NodeHash> {
        self.check_index(index)?;
        Ok(self.nodes[index].hash)
    }

    /// Walk from leaf `index` to the root collecting sibling hashes.
    pub fn path(&self, index: usize) -> Result<MerklePath> {
        self.check_index(index)?;

        let height = self.layout.height() as usize;
        let mut siblings = Vec::with_capacity(height);
        let mut bits = Vec::with_capacity(height);

        let mut current = index;
        while let Some(parent) = self.nodes[current].parent {
            let Some((left, right)) = self.nodes[parent].children else {
                break;
            };
            if current == left {
                siblings.push(self.nodes[right].hash);
                bits.push(false);
            } else {
                siblings.push(self.nodes[left].hash);
                bits.push(true);
            }
            current = parent;
        }

        Ok(MerklePath { siblings, bits })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.layout.chunk_count();
        if index >= count {
            return Err(PosError::IndexOutOfRange {
                index,
                max: count - 1,
            });
        }
        Ok(())
    }
}

/// Replay `path` from `chunk` and compare against `root`.
///
/// The path bits must also spell out `index` least-significant bit first.
pub fn verify_path<H: HashPrimitive + ?Sized>(
    hasher: &H,
    root: &NodeHash,
    chunk: &[u8],
    index: usize,
    path: &MerklePath,
) -> bool {
    if path.siblings.len() != path.bits.len() {
        return false;
    }
    if path.bits.len() < usize::BITS as usize && index >> path.bits.len() != 0 {
        return false;
    }
    let Ok(mut current) = hasher.hash(chunk) else {
        return false;
    };

    for (level, (sibling, is_right)) in path.siblings.iter().zip(&path.bits).enumerate() {
        if ((index >> level) & 1 == 1) != *is_right {
            return false;
        }
        current = if *is_right {
            hasher.hash_pair(sibling, &current)
        } else {
            hasher.hash_pair(&current, sibling)
        };
    }

    current == *root
}
