//! Hierarchical ring membership table.
//!
//! One coarse lock guards every level. Operations are O(ring size) and far
//! rarer than network I/O, and a single lock rules out lock-ordering hazards
//! between levels. Revisit with per-level locks if contention shows up.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, RingError};
use crate::node::{Node, NodeId};
use crate::ring::Ring;

struct TableState {
    rings: Vec<Ring>,
    self_level: usize,
}

impl TableState {
    fn ring(&self, level: usize) -> Option<&Ring> {
        self.rings.get(level)
    }

    fn ring_mut(&mut self, level: usize) -> Result<&mut Ring> {
        let levels = self.rings.len();
        self.rings
            .get_mut(level)
            .ok_or(RingError::InvalidLevel { level, levels })
    }
}

fn link_error(ring: &Ring, level: usize, id: &str) -> RingError {
    if ring.contains(id) {
        RingError::RingTooSmall { level, len: ring.len() }
    } else {
        RingError::UnknownPeer { level, id: id.to_string() }
    }
}

/// Per-level rings of the local node.
///
/// Every method holds the table lock for its whole duration and returns
/// clones taken while the lock is held.
pub struct RingLevelTable {
    self_id: NodeId,
    state: Mutex<TableState>,
}

impl RingLevelTable {
    /// Create a table with `levels` empty rings. The local node starts at
    /// level 0.
    pub fn new(self_id: impl Into<NodeId>, levels: usize) -> Self {
        Self {
            self_id: self_id.into(),
            state: Mutex::new(TableState {
                rings: (0..levels).map(|_| Ring::new()).collect(),
                self_level: 0,
            }),
        }
    }

    /// The local node's id.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Highest level the local node participates in.
    pub fn self_level(&self) -> usize {
        self.state.lock().self_level
    }

    /// Set the local node's level. Returns false if the level does not exist.
    pub fn set_self_level(&self, level: usize) -> bool {
        let mut state = self.state.lock();
        if level >= state.rings.len() {
            return false;
        }
        state.self_level = level;
        true
    }

    /// Number of levels currently tracked.
    pub fn levels(&self) -> usize {
        self.state.lock().rings.len()
    }

    /// Append an empty ring on top of the hierarchy, returning its level.
    pub fn push_level(&self) -> usize {
        let mut state = self.state.lock();
        state.rings.push(Ring::new());
        state.rings.len() - 1
    }

    /// Detached copy of a whole level.
    pub fn snapshot(&self, level: usize) -> Option<Ring> {
        self.state.lock().ring(level).cloned()
    }

    /// True if `id` is a contact node or peer at `level`.
    pub fn has_node(&self, level: usize, id: &str) -> bool {
        self.state
            .lock()
            .ring(level)
            .is_some_and(|ring| ring.contains(id))
    }

    /// Copy of the node with `id` at `level`.
    pub fn get_node_copy(&self, level: usize, id: &str) -> Option<Node> {
        self.state.lock().ring(level)?.get(id).cloned()
    }

    /// Same as [`Self::get_node_copy`].
    pub fn get_peer(&self, level: usize, id: &str) -> Option<Node> {
        self.get_node_copy(level, id)
    }

    /// Stamp the node's last ping with the current time. No-op if absent.
    pub fn set_last_ping_now(&self, level: usize, id: &str) {
        let mut state = self.state.lock();
        if let Some(ring) = state.rings.get_mut(level) {
            ring.for_each_entry_mut(id, Node::set_last_ping_now);
        }
    }

    /// Stamp the node's last pong with the current time. No-op if absent.
    pub fn set_last_pong_now(&self, level: usize, id: &str) {
        let mut state = self.state.lock();
        if let Some(ring) = state.rings.get_mut(level) {
            ring.for_each_entry_mut(id, Node::set_last_pong_now);
        }
    }

    /// Whether the local node must act as a contact node at `level`.
    ///
    /// True exactly when `level` is below the top tracked level: the node
    /// also lives in a ring above, so it bridges this one upward. False at the
    /// top level, beyond it, and for an empty table.
    pub fn is_contact_node(&self, level: usize) -> bool {
        let state = self.state.lock();
        match state.rings.len().checked_sub(1) {
            Some(top) => level < top,
            None => false,
        }
    }

    /// Copies of the contact nodes at `level`.
    pub fn get_contact_nodes(&self, level: usize) -> HashSet<Node> {
        match self.state.lock().ring(level) {
            Some(ring) => ring.contact_nodes().cloned().collect(),
            None => HashSet::new(),
        }
    }

    /// Copies of every peer at `level`.
    pub fn get_peer_list(&self, level: usize) -> HashSet<Node> {
        match self.state.lock().ring(level) {
            Some(ring) => ring.peers().cloned().collect(),
            None => HashSet::new(),
        }
    }

    /// Successor at `level`, if linked.
    pub fn get_successor(&self, level: usize) -> Option<Node> {
        self.state.lock().ring(level)?.successor().cloned()
    }

    /// Predecessor at `level`, if linked.
    pub fn get_predecessor(&self, level: usize) -> Option<Node> {
        self.state.lock().ring(level)?.predecessor().cloned()
    }

    /// Peer count at `level`, used as an enumeration bound. `-1` if the
    /// level does not exist.
    pub fn get_end_id(&self, level: usize) -> i64 {
        match self.state.lock().ring(level) {
            Some(ring) => ring.len() as i64,
            None => -1,
        }
    }

    /// Add a peer at `level`, or refresh its address if already known.
    /// Returns true if the peer was new.
    pub fn insert_peer(&self, level: usize, node: Node) -> Result<bool> {
        let mut state = self.state.lock();
        let id = node.id().to_string();
        let added = state.ring_mut(level)?.insert_peer(node);
        if added {
            debug!(level, %id, "peer joined ring");
        }
        Ok(added)
    }

    /// Add a contact node at `level`. The node also becomes a peer.
    /// Returns true if it was not already a contact node.
    pub fn insert_contact_node(&self, level: usize, node: Node) -> Result<bool> {
        let mut state = self.state.lock();
        let id = node.id().to_string();
        let added = state.ring_mut(level)?.insert_contact(node);
        if added {
            debug!(level, %id, "contact node registered");
        }
        Ok(added)
    }

    /// Update a known node's address. Returns false if absent.
    pub fn update_address(&self, level: usize, id: &str, host: &str, port: u16) -> bool {
        let mut state = self.state.lock();
        match state.rings.get_mut(level) {
            Some(ring) => ring.for_each_entry_mut(id, |n| {
                n.host = host.to_string();
                n.port = port;
            }),
            None => false,
        }
    }

    /// Point the ring's successor at a member of its peer list. The ring must
    /// hold at least two peers.
    pub fn set_successor(&self, level: usize, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let ring = state.ring_mut(level)?;
        if ring.set_successor(id) {
            Ok(())
        } else {
            Err(link_error(ring, level, id))
        }
    }

    /// Point the ring's predecessor at a member of its peer list. The ring must
    /// hold at least two peers.
    pub fn set_predecessor(&self, level: usize, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let ring = state.ring_mut(level)?;
        if ring.set_predecessor(id) {
            Ok(())
        } else {
            Err(link_error(ring, level, id))
        }
    }

    /// Drop both neighbor links at `level`.
    pub fn clear_neighbors(&self, level: usize) -> Result<()> {
        self.state.lock().ring_mut(level)?.clear_neighbors();
        Ok(())
    }

    /// Remove a leaving node from `level`, returning its last known state.
    pub fn remove_node(&self, level: usize, id: &str) -> Option<Node> {
        let mut state = self.state.lock();
        let removed = state.rings.get_mut(level)?.remove(id);
        if removed.is_some() {
            debug!(level, %id, "peer left ring");
        }
        removed
    }

    /// Remove a leaving node from every level. Returns how many levels held it.
    pub fn remove_node_everywhere(&self, id: &str) -> usize {
        let mut state = self.state.lock();
        let count = state
            .rings
            .iter_mut()
            .filter_map(|ring| ring.remove(id))
            .count();
        if count > 0 {
            debug!(%id, levels = count, "peer left all rings");
        }
        count
    }

    /// Levels at which `id` is currently known.
    pub fn levels_of(&self, id: &str) -> Vec<usize> {
        self.state
            .lock()
            .rings
            .iter()
            .enumerate()
            .filter(|(_, ring)| ring.contains(id))
            .map(|(level, _)| level)
            .collect()
    }
}

impl std::fmt::Debug for RingLevelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RingLevelTable")
            .field("self_id", &self.self_id)
            .field("self_level", &state.self_level)
            .field("levels", &state.rings.len())
            .finish()
    }
}
