//! Error types for the GFR node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while starting or running a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad environment configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Message envelope could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport failed to start
    #[error("Transport error: {0}")]
    Transport(#[from] gfr_transfer::Error),

    /// Ring table rejected a mutation
    #[error("Ring error: {0}")]
    Ring(#[from] gfr_ring::RingError),
}
