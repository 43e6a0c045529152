//! Application message envelope.
//!
//! The transports move opaque bytes; this envelope is what GFR nodes put in
//! them. It is JSON on the wire so it reads the same over either channel.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Well-known message type tags.
pub mod kind {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
}

/// Envelope exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub receiver: String,
    pub message_id: String,
    /// Blake3 over the other four fields.
    pub message_hash: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Message {
    /// Build a message with a fresh random id and its hash.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, kind: impl Into<String>) -> Self {
        let mut id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id);

        let mut msg = Self {
            sender: sender.into(),
            receiver: receiver.into(),
            message_id: hex::encode(id),
            message_hash: String::new(),
            kind: kind.into(),
        };
        msg.message_hash = msg.compute_hash();
        msg
    }

    fn compute_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for field in [&self.sender, &self.receiver, &self.message_id, &self.kind] {
            hasher.update(&(field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// True if `message_hash` matches the other fields.
    pub fn verify_hash(&self) -> bool {
        self.message_hash == self.compute_hash()
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
