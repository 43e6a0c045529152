//! GFR Transfer - datagram and framed stream transports
//!
//! This crate provides:
//! - [`DatagramChannel`]: unreliable UDP transport, one datagram = one message
//! - [`FramedStreamChannel`]: reliable TCP transport, one length-prefixed
//!   frame per direction per connection
//! - [`HandoffQueue`]: the blocking queue between I/O tasks and the worker
//!   thread that calls the application's [`Receiver`]
//!
//! # Pipeline
//!
//! ```text
//! socket ──> I/O task ──> HandoffQueue ──> worker thread ──> Receiver
//! ```
//!
//! I/O tasks never wait on application code; they only enqueue. Each channel
//! owns exactly one worker thread, so a slow [`Receiver`] delays that
//! channel's deliveries and nothing else.
//!
//! Transport errors never cross the channel boundary: every failed accept,
//! connect, resolve, read or write is logged and that one operation is
//! abandoned. Only binding the socket at startup can fail loudly.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gfr_transfer::{DatagramChannel, DatagramConfig};
//!
//! let receiver = Arc::new(|host: &str, port: u16, payload: bytes::Bytes| {
//!     println!("{}:{} sent {} bytes", host, port, payload.len());
//! });
//! let udp = DatagramChannel::listen(DatagramConfig::default(), receiver).await?;
//! udp.send("127.0.0.1", 9000, &b"hello"[..]);
//! ```

pub mod datagram;
pub mod error;
pub mod frame;
pub mod queue;
pub mod stream;
pub mod types;
mod worker;

pub use datagram::{DatagramChannel, DatagramConfig, DatagramSender};
pub use error::{Error, Result};
pub use frame::{encode_frame, read_frame, FrameReader, FrameState, DEFAULT_MAX_FRAME_LEN, HEADER_LEN};
pub use queue::HandoffQueue;
pub use stream::{FramedStreamChannel, StreamConfig, StreamSender};
pub use types::{BufferItem, PeerAddr, Receiver};
