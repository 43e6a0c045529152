//! Overlay node records.

use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Opaque node identifier.
pub type NodeId = String;

/// A peer as seen by the local ring table.
///
/// The id is fixed at construction. Address and liveness timestamps are
/// plain fields: values handed out by [`crate::RingLevelTable`] are clones,
/// so editing them never reaches the table.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    /// Host name or IP address the peer listens on.
    pub host: String,
    /// Port the peer listens on.
    pub port: u16,
    /// Last ping exchanged with this peer.
    pub last_ping: Option<Instant>,
    /// Last pong exchanged with this peer.
    pub last_pong: Option<Instant>,
}

impl Node {
    /// Create a node with no liveness history.
    pub fn new(id: impl Into<NodeId>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            last_ping: None,
            last_pong: None,
        }
    }

    /// The node's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `host:port` form of the address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn set_last_ping_now(&mut self) {
        self.last_ping = Some(advance(self.last_ping));
    }

    pub(crate) fn set_last_pong_now(&mut self) {
        self.last_pong = Some(advance(self.last_pong));
    }
}

/// Current instant, nudged past `prev` so a stored timestamp always moves
/// forward even when two updates land on the same clock tick.
fn advance(prev: Option<Instant>) -> Instant {
    let now = Instant::now();
    match prev {
        Some(p) if now <= p => p + Duration::from_nanos(1),
        _ => now,
    }
}

// Identity is the id.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}
