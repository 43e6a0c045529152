//! A single level of the ring hierarchy.

use std::collections::HashMap;

use crate::node::{Node, NodeId};

/// Membership of one ring level.
///
/// `contact_nodes` is always a subset of `peer_list`. Successor and
/// predecessor are kept as ids and resolved against `peer_list`, so they can
/// only ever point at current members.
#[derive(Debug, Clone, Default)]
pub struct Ring {
    peer_list: HashMap<NodeId, Node>,
    contact_nodes: HashMap<NodeId, Node>,
    successor: Option<NodeId>,
    predecessor: Option<NodeId>,
}

impl Ring {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a node, contact entries first.
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.contact_nodes.get(id).or_else(|| self.peer_list.get(id))
    }

    /// True if `id` is a peer or contact node of this ring.
    pub fn contains(&self, id: &str) -> bool {
        self.contact_nodes.contains_key(id) || self.peer_list.contains_key(id)
    }

    /// True if `id` bridges this ring to the level above.
    pub fn is_contact(&self, id: &str) -> bool {
        self.contact_nodes.contains_key(id)
    }

    /// Full membership.
    pub fn peers(&self) -> impl Iterator<Item = &Node> {
        self.peer_list.values()
    }

    /// Contact nodes of this ring.
    pub fn contact_nodes(&self) -> impl Iterator<Item = &Node> {
        self.contact_nodes.values()
    }

    /// Ring-order successor, if set. Always `None` below two members.
    pub fn successor(&self) -> Option<&Node> {
        self.neighbor(self.successor.as_deref())
    }

    /// Ring-order predecessor, if set. Always `None` below two members.
    pub fn predecessor(&self) -> Option<&Node> {
        self.neighbor(self.predecessor.as_deref())
    }

    fn neighbor(&self, id: Option<&str>) -> Option<&Node> {
        if self.peer_list.len() < 2 {
            return None;
        }
        id.and_then(|id| self.peer_list.get(id))
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peer_list.len()
    }

    /// True if the ring has no peers.
    pub fn is_empty(&self) -> bool {
        self.peer_list.is_empty()
    }

    /// Insert a peer, or refresh the address of an existing one.
    /// Returns true if the peer was new.
    pub(crate) fn insert_peer(&mut self, node: Node) -> bool {
        let id = node.id().to_string();
        if self.peer_list.contains_key(&id) {
            self.for_each_entry_mut(&id, |n| {
                n.host = node.host.clone();
                n.port = node.port;
            });
            return false;
        }
        self.peer_list.insert(id, node);
        true
    }

    /// Insert a contact node, adding it to the peer list as well.
    /// Returns true if it was not already a contact node.
    pub(crate) fn insert_contact(&mut self, node: Node) -> bool {
        let id = node.id().to_string();
        self.insert_peer(node);
        if self.contact_nodes.contains_key(&id) {
            return false;
        }
        // Copy the peer entry so both views share timestamps.
        if let Some(peer) = self.peer_list.get(&id) {
            self.contact_nodes.insert(id, peer.clone());
        }
        true
    }

    /// Apply `f` to every stored entry for `id`. Returns false if absent.
    pub(crate) fn for_each_entry_mut(&mut self, id: &str, mut f: impl FnMut(&mut Node)) -> bool {
        let mut found = false;
        if let Some(n) = self.contact_nodes.get_mut(id) {
            f(n);
            found = true;
        }
        if let Some(n) = self.peer_list.get_mut(id) {
            f(n);
            found = true;
        }
        found
    }

    pub(crate) fn set_successor(&mut self, id: &str) -> bool {
        if !self.can_link(id) {
            return false;
        }
        self.successor = Some(id.to_string());
        true
    }

    pub(crate) fn set_predecessor(&mut self, id: &str) -> bool {
        if !self.can_link(id) {
            return false;
        }
        self.predecessor = Some(id.to_string());
        true
    }

    /// A neighbor link needs a second member to point at.
    fn can_link(&self, id: &str) -> bool {
        self.peer_list.len() >= 2 && self.peer_list.contains_key(id)
    }

    pub(crate) fn clear_neighbors(&mut self) {
        self.successor = None;
        self.predecessor = None;
    }

    /// Remove a peer from both maps, dropping any neighbor link to it.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Node> {
        let contact = self.contact_nodes.remove(id);
        let peer = self.peer_list.remove(id);
        if self.successor.as_deref() == Some(id) {
            self.successor = None;
        }
        if self.predecessor.as_deref() == Some(id) {
            self.predecessor = None;
        }
        // A ring of one has no neighbors.
        if self.peer_list.len() < 2 {
            self.clear_neighbors();
        }
        peer.or(contact)
    }
}
