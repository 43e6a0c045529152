//! GFR node - the ring table with both transports attached.
//!
//! Node addresses stored in the ring table are datagram endpoints, so
//! liveness probes go out over UDP.

use std::sync::Arc;

use gfr_ring::RingLevelTable;
use gfr_transfer::{DatagramChannel, DatagramConfig, FramedStreamChannel, StreamConfig};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::liveness::LivenessReceiver;
use crate::message::{kind, Message};

/// A running GFR node.
pub struct OverlayNode {
    config: NodeConfig,
    table: Arc<RingLevelTable>,
    udp: DatagramChannel,
    tcp: FramedStreamChannel,
}

impl OverlayNode {
    /// Build the ring table and start both channels.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let table = Arc::new(RingLevelTable::new(config.node_id.clone(), config.levels));

        let udp = DatagramChannel::listen(
            DatagramConfig {
                bind: config.udp_addr,
                ..Default::default()
            },
            Arc::new(LivenessReceiver::new(Arc::clone(&table), "udp")),
        )
        .await?;

        let tcp = FramedStreamChannel::listen(
            StreamConfig {
                bind: config.tcp_addr,
                max_frame_len: config.max_frame_len,
                ..Default::default()
            },
            Arc::new(LivenessReceiver::new(Arc::clone(&table), "tcp")),
        )
        .await?;

        tracing::info!("GFR node {} started", config.node_id);
        tracing::info!("  UDP: {}", udp.local_addr());
        tracing::info!("  TCP: {}", tcp.local_addr());
        tracing::info!("  Levels: {}", config.levels);

        Ok(Self {
            config,
            table,
            udp,
            tcp,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.node_id
    }

    /// Shared ring table.
    pub fn table(&self) -> Arc<RingLevelTable> {
        Arc::clone(&self.table)
    }

    pub fn udp(&self) -> &DatagramChannel {
        &self.udp
    }

    pub fn tcp(&self) -> &FramedStreamChannel {
        &self.tcp
    }

    /// Ping a known peer over UDP and stamp our side of the exchange.
    /// Returns false if the peer is not in that level's ring.
    pub fn ping(&self, level: usize, peer_id: &str) -> Result<bool> {
        let Some(peer) = self.table.get_node_copy(level, peer_id) else {
            return Ok(false);
        };
        let msg = Message::new(self.id(), peer_id, kind::PING);
        self.udp.send(&peer.host, peer.port, msg.to_bytes()?);
        self.table.set_last_ping_now(level, peer_id);
        Ok(true)
    }

    /// Stop both channels.
    pub fn shutdown(self) {
        self.udp.shutdown();
        self.tcp.shutdown();
        tracing::info!("GFR node {} stopped", self.config.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfr_ring::Node;
    use std::time::Duration;

    fn loopback(id: &str) -> NodeConfig {
        NodeConfig {
            node_id: id.to_string(),
            udp_addr: "127.0.0.1:0".parse().unwrap(),
            tcp_addr: "127.0.0.1:0".parse().unwrap(),
            levels: 2,
            ..Default::default()
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn ping_over_udp_updates_peer() {
        let a = OverlayNode::start(loopback("a")).await.unwrap();
        let b = OverlayNode::start(loopback("b")).await.unwrap();

        a.table()
            .insert_peer(0, Node::new("b", "127.0.0.1", b.udp().local_addr().port()))
            .unwrap();
        b.table()
            .insert_peer(0, Node::new("a", "127.0.0.1", a.udp().local_addr().port()))
            .unwrap();

        assert!(a.ping(0, "b").unwrap());
        assert!(!a.ping(0, "nobody").unwrap());
        assert!(a.table().get_node_copy(0, "b").unwrap().last_ping.is_some());

        let table = b.table();
        assert!(eventually(|| table.get_node_copy(0, "a").unwrap().last_ping.is_some()).await);

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn pong_over_tcp_updates_peer() {
        let a = OverlayNode::start(loopback("a")).await.unwrap();
        let b = OverlayNode::start(loopback("b")).await.unwrap();
        b.table().insert_contact_node(1, Node::new("a", "127.0.0.1", 1)).unwrap();

        let pong = Message::new("a", "b", kind::PONG).to_bytes().unwrap();
        a.tcp().send("127.0.0.1", b.tcp().local_addr().port(), pong);

        let table = b.table();
        assert!(eventually(|| table.get_node_copy(1, "a").unwrap().last_pong.is_some()).await);
    }
}
