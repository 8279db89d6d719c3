//! Proof requests materialized from a commitment and its challenges.

use std::collections::VecDeque;

use crate::hash::NodeHash;
use crate::merkle::MerkleCommitment;
use crate::Result;

/// Everything the external prover needs to answer one challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofRequest {
    /// Challenged chunk index
    pub index: usize,
    /// Commitment root
    pub root: NodeHash,
    /// Chunk bytes at `index`
    pub chunk: Vec<u8>,
    /// Sibling hashes, leaf level first
    pub siblings: Vec<NodeHash>,
    /// `true` where the path node is a right child
    pub bits: Vec<bool>,
}

impl ProofRequest {
    /// Root split into two 128-bit halves, high half first.
    ///
    /// A 256-bit digest does not fit a single circuit field element.
    pub fn root_halves(&self) -> (u128, u128) {
        let mut hi = [0u8; 16];
        let mut lo = [0u8; 16];
        hi.copy_from_slice(&self.root[..16]);
        lo.copy_from_slice(&self.root[16..]);
        (u128::from_be_bytes(hi), u128::from_be_bytes(lo))
    }

    /// Positional witness arguments in circuit order: index, root halves,
    /// chunk words, sibling words, path bits. Words are big-endian `u32`s
    /// printed in decimal.
    pub fn witness_args(&self) -> Vec<String> {
        let (hi, lo) = self.root_halves();
        let mut args = Vec::with_capacity(
            3 + self.chunk.len() / 4 + self.siblings.len() * 8 + self.bits.len(),
        );
        args.push(self.index.to_string());
        args.push(hi.to_string());
        args.push(lo.to_string());
        push_words(&mut args, &self.chunk);
        for sibling in &self.siblings {
            push_words(&mut args, sibling);
        }
        args.extend(self.bits.iter().map(|b| if *b { "1" } else { "0" }.to_string()));
        args
    }
}

fn push_words(args: &mut Vec<String>, bytes: &[u8]) {
    for w in bytes.chunks_exact(4) {
        args.push(u32::from_be_bytes([w[0], w[1], w[2], w[3]]).to_string());
    }
}

/// Ordered queue of pending proof requests for one block.
#[derive(Clone, Debug, Default)]
pub struct ProofRequestQueue {
    requests: VecDeque<ProofRequest>,
}

impl ProofRequestQueue {
    /// One request per challenge, in challenge order.
    pub fn new(commitment: &MerkleCommitment, challenges: &[usize]) -> Result<Self> {
        let root = commitment.root();
        let mut requests = VecDeque::with_capacity(challenges.len());
        for &index in challenges {
            let path = commitment.path(index)?;
            requests.push_back(ProofRequest {
                index,
                root,
                chunk: commitment.chunk(index)?.to_vec(),
                siblings: path.siblings,
                bits: path.bits,
            });
        }
        Ok(Self { requests })
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Remove and return the front request.
    pub fn pop(&mut self) -> Option<ProofRequest> {
        self.requests.pop_front()
    }

    /// Drop the front request without producing output. Returns whether a
    /// request was dropped. The caller owes one placeholder result per skip.
    pub fn skip(&mut self) -> bool {
        self.requests.pop_front().is_some()
    }

    /// Peek at the front request.
    pub fn front(&self) -> Option<&ProofRequest> {
        self.requests.front()
    }
}
