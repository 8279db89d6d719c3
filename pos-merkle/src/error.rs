//! Error types for the pos-merkle crate.

use thiserror::Error;

/// Result type alias using PosError
pub type Result<T> = std::result::Result<T, PosError>;

/// Errors raised while building commitments or deriving challenges
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PosError {
    /// Caller passed a parameter outside its valid domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Block does not fit into the configured chunk capacity
    #[error("Malformed block: {len} bytes exceeds capacity of {capacity} bytes")]
    MalformedBlock { len: usize, capacity: usize },

    /// Leaf index past the end of the tree
    #[error("Chunk index {index} out of bounds (max: {max})")]
    IndexOutOfRange { index: usize, max: usize },
}

impl PosError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PosError::InvalidArgument(msg.into())
    }
}
