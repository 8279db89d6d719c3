//! Proof tuples returned by the prover and the batch layout the ledger expects.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 256-bit field element, big-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldElement(pub [u8; 32]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0u8; 32]);

    /// Parse `0x`-prefixed hex of at most 32 bytes, left-padding with zeros.
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
        if digits.is_empty() || digits.len() > 64 {
            return None;
        }
        let padded = format!("{:0>64}", digits);
        let bytes = hex::decode(padded).ok()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Self(out))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldElement::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid field element: {}", s)))
    }
}

/// Proof for one challenge: two field elements for each of `a` and `c`, a
/// 2x2 matrix for `b`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofTuple {
    pub a: [FieldElement; 2],
    pub b: [[FieldElement; 2]; 2],
    pub c: [FieldElement; 2],
}

impl ProofTuple {
    /// Fixed tuple submitted in place of a proof that could not be computed.
    pub const PLACEHOLDER: ProofTuple = ProofTuple {
        a: [FieldElement::ZERO; 2],
        b: [[FieldElement::ZERO; 2]; 2],
        c: [FieldElement::ZERO; 2],
    };
}

/// Result slot for one challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofOutcome {
    Computed(ProofTuple),
    Placeholder,
}

impl ProofOutcome {
    /// Tuple as submitted to the ledger.
    pub fn tuple(&self) -> ProofTuple {
        match self {
            ProofOutcome::Computed(t) => *t,
            ProofOutcome::Placeholder => ProofTuple::PLACEHOLDER,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ProofOutcome::Placeholder)
    }
}

/// Proof results for one block, in challenge order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockProofs {
    pub block_id: u64,
    pub outcomes: Vec<ProofOutcome>,
}

/// One ledger submission covering every audited block of a pool.
///
/// Arrays are flat per coordinate group and ordered by block, then by
/// challenge; each challenge contributes two entries to every group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditBatch {
    pub pool: String,
    pub block_ids: Vec<u64>,
    pub a: Vec<FieldElement>,
    pub b1: Vec<FieldElement>,
    pub b2: Vec<FieldElement>,
    pub c: Vec<FieldElement>,
}

impl AuditBatch {
    /// Flatten per-block results into coordinate groups.
    pub fn assemble(pool: &str, blocks: &[BlockProofs]) -> Self {
        let total: usize = blocks.iter().map(|b| b.outcomes.len()).sum();
        let mut batch = AuditBatch {
            pool: pool.to_string(),
            block_ids: Vec::with_capacity(blocks.len()),
            a: Vec::with_capacity(total * 2),
            b1: Vec::with_capacity(total * 2),
            b2: Vec::with_capacity(total * 2),
            c: Vec::with_capacity(total * 2),
        };

        for block in blocks {
            batch.block_ids.push(block.block_id);
            for outcome in &block.outcomes {
                let t = outcome.tuple();
                batch.a.extend_from_slice(&t.a);
                batch.b1.extend_from_slice(&t.b[0]);
                batch.b2.extend_from_slice(&t.b[1]);
                batch.c.extend_from_slice(&t.c);
            }
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.block_ids.is_empty()
    }

    /// Number of proof slots in the batch.
    pub fn proof_count(&self) -> usize {
        self.a.len() / 2
    }
}
