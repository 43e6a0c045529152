//! Receiver that keeps ring liveness timestamps current.

use std::sync::Arc;

use bytes::Bytes;
use gfr_ring::RingLevelTable;
use gfr_transfer::Receiver;
use tracing::{debug, warn};

use crate::message::{kind, Message};

/// Decodes inbound envelopes and stamps `ping`/`pong` arrivals on the
/// sender's entries at every level it is known. Other message types are
/// logged and left to the orchestration layer.
pub struct LivenessReceiver {
    table: Arc<RingLevelTable>,
    channel: &'static str,
}

impl LivenessReceiver {
    pub fn new(table: Arc<RingLevelTable>, channel: &'static str) -> Self {
        Self { table, channel }
    }

    /// Apply a decoded message. Returns the number of levels updated.
    pub fn record(&self, msg: &Message) -> usize {
        let levels = self.table.levels_of(&msg.sender);
        if levels.is_empty() {
            debug!(sender = %msg.sender, "{} from unknown peer", msg.kind);
            return 0;
        }

        match msg.kind.as_str() {
            kind::PING => {
                for &level in &levels {
                    self.table.set_last_ping_now(level, &msg.sender);
                }
            }
            kind::PONG => {
                for &level in &levels {
                    self.table.set_last_pong_now(level, &msg.sender);
                }
            }
            other => {
                debug!(sender = %msg.sender, "unhandled message type {:?}", other);
                return 0;
            }
        }
        levels.len()
    }
}

impl Receiver for LivenessReceiver {
    fn receive(&self, host: &str, port: u16, payload: Bytes) {
        let msg = match Message::from_bytes(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("undecodable {} message from {}:{}: {}", self.channel, host, port, e);
                return;
            }
        };

        if !msg.verify_hash() {
            warn!("{} message {} from {}:{} fails hash check", self.channel, msg.message_id, host, port);
            return;
        }

        if !msg.receiver.is_empty() && msg.receiver != self.table.self_id() {
            debug!("{} message {} addressed to {}, ignoring", self.channel, msg.message_id, msg.receiver);
            return;
        }

        let updated = self.record(&msg);
        debug!(
            "{} {} from {} ({}:{}) touched {} levels",
            self.channel, msg.kind, msg.sender, host, port, updated
        );
    }
}
