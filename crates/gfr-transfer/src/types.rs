//! Core types shared by both channels.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Network address of a remote peer as reported to the [`Receiver`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to socket addresses, in resolver order.
    pub(crate) async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Resolve(self.to_string()));
        }
        Ok(addrs)
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

/// `host:port`, the key used by the stream channel's connection table.
impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One inbound message on its way from an I/O task to the worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferItem {
    pub peer: PeerAddr,
    pub payload: Bytes,
}

impl BufferItem {
    pub fn new(peer: PeerAddr, payload: Bytes) -> Self {
        Self { peer, payload }
    }
}

/// Callback invoked once per fully assembled inbound message.
///
/// Runs on the channel's worker thread. Blocking here delays every later
/// message on the same channel.
pub trait Receiver: Send + Sync + 'static {
    fn receive(&self, host: &str, port: u16, payload: Bytes);
}

impl<F> Receiver for F
where
    F: Fn(&str, u16, Bytes) + Send + Sync + 'static,
{
    fn receive(&self, host: &str, port: u16, payload: Bytes) {
        self(host, port, payload)
    }
}
