//! Error types for gfr-ring.

use thiserror::Error;

/// Result type for ring table mutations.
pub type Result<T> = std::result::Result<T, RingError>;

/// Errors raised when a mutation would break a table invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// The level does not exist in the table.
    #[error("invalid level {level} (table has {levels} levels)")]
    InvalidLevel { level: usize, levels: usize },

    /// The peer is not a member of that level's peer list.
    #[error("peer {id} is not a member of level {level}")]
    UnknownPeer { level: usize, id: String },

    /// Neighbor links need at least two members in the ring.
    #[error("level {level} has {len} peer(s), too few for neighbor links")]
    RingTooSmall { level: usize, len: usize },
}
