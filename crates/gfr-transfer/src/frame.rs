//! Length-prefixed framing for the stream channel.
//!
//! Wire format, one frame per direction per connection:
//!
//! ```text
//! ┌──────────────────┬───────────────────────┐
//! │ length: u32 (BE) │ payload: length bytes │
//! └──────────────────┴───────────────────────┘
//! ```
//!
//! [`FrameReader`] reassembles a frame from reads of any size. A peer that
//! disconnects after the header still gets its partial payload delivered.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest frame accepted unless configured otherwise (16MB).
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Prepend the length header to `payload`.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Read state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Length prefix not fully received yet.
    AwaitingHeader,
    /// Header parsed, payload still arriving.
    Accumulating,
    /// Payload ready, either in full or cut short by a disconnect.
    Complete,
}

/// Incremental decoder for a single frame.
#[derive(Debug)]
pub struct FrameReader {
    header: [u8; HEADER_LEN],
    header_filled: usize,
    declared: Option<u32>,
    payload: BytesMut,
    max_len: u32,
    state: FrameState,
}

impl FrameReader {
    pub fn new(max_len: u32) -> Self {
        Self {
            header: [0; HEADER_LEN],
            header_filled: 0,
            declared: None,
            payload: BytesMut::new(),
            max_len,
            state: FrameState::AwaitingHeader,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Length announced by the header, once parsed.
    pub fn declared_len(&self) -> Option<u32> {
        self.declared
    }

    /// Payload bytes accumulated so far.
    pub fn received(&self) -> usize {
        self.payload.len()
    }

    /// Consume the bytes of one read.
    ///
    /// Bytes past the declared length are discarded: a connection carries
    /// exactly one frame each way.
    pub fn feed(&mut self, mut chunk: &[u8]) -> Result<FrameState> {
        if self.state == FrameState::Complete {
            return Ok(self.state);
        }

        let declared = match self.declared {
            Some(len) => len,
            None => {
                let take = (HEADER_LEN - self.header_filled).min(chunk.len());
                self.header[self.header_filled..self.header_filled + take]
                    .copy_from_slice(&chunk[..take]);
                self.header_filled += take;
                chunk = &chunk[take..];

                if self.header_filled < HEADER_LEN {
                    return Ok(self.state);
                }

                let len = u32::from_be_bytes(self.header);
                if len > self.max_len {
                    return Err(Error::FrameTooLarge { len, max: self.max_len });
                }
                self.declared = Some(len);
                self.payload.reserve((len as usize).min(READ_CHUNK * 8));
                self.state = FrameState::Accumulating;
                len
            }
        };

        let remaining = declared as usize - self.payload.len();
        let take = remaining.min(chunk.len());
        self.payload.extend_from_slice(&chunk[..take]);
        if chunk.len() > take {
            tracing::trace!(excess = chunk.len() - take, "discarding bytes past frame end");
        }

        if self.payload.len() >= declared as usize {
            self.state = FrameState::Complete;
        }
        Ok(self.state)
    }

    /// The peer closed or reset the connection.
    ///
    /// With a parsed header this completes the frame with whatever arrived.
    /// Without one there is no message and the reader stays in
    /// `AwaitingHeader`.
    pub fn on_disconnect(&mut self) -> FrameState {
        if self.declared.is_some() {
            self.state = FrameState::Complete;
        }
        self.state
    }

    /// The assembled payload, if the frame is complete.
    pub fn into_payload(self) -> Option<Bytes> {
        (self.state == FrameState::Complete).then(|| self.payload.freeze())
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

/// Drive a [`FrameReader`] over `reader` until the frame completes or the
/// peer goes away.
///
/// Returns `Ok(None)` if the connection closed before a full header arrived.
pub async fn read_frame<R>(reader: &mut R, max_len: u32) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut frame = FrameReader::new(max_len);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                frame.on_disconnect();
                break;
            }
            Ok(n) => {
                if frame.feed(&buf[..n])? == FrameState::Complete {
                    break;
                }
            }
            Err(e) if is_disconnect(&e) => {
                frame.on_disconnect();
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if frame.state() == FrameState::Complete && frame.received() < frame.declared_len().unwrap_or(0) as usize {
        tracing::debug!(
            received = frame.received(),
            declared = frame.declared_len(),
            "peer disconnected mid-frame, delivering partial payload"
        );
    }
    Ok(frame.into_payload())
}
