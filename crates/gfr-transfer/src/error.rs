//! Error types for gfr-transfer.

use thiserror::Error;

/// Result type for gfr-transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transports.
///
/// Only [`Error::Io`] from `listen` ever reaches a caller; the rest are
/// logged inside the channel and the affected operation dropped.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or thread error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Name resolution yielded no usable address.
    #[error("could not resolve {0}")]
    Resolve(String),

    /// A peer declared a frame longer than we accept.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: u32, max: u32 },

    /// Payload does not fit in the length header.
    #[error("payload of {0} bytes cannot be framed")]
    PayloadTooLarge(usize),
}
