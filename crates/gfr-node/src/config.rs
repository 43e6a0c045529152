//! Node configuration from the environment.

use std::net::SocketAddr;
use std::str::FromStr;

use gfr_transfer::DEFAULT_MAX_FRAME_LEN;
use rand::RngCore;

use crate::error::{Error, Result};

/// Configuration for a GFR node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identifier of the local node
    pub node_id: String,

    /// Datagram channel listen address
    pub udp_addr: SocketAddr,

    /// Stream channel listen address
    pub tcp_addr: SocketAddr,

    /// Number of ring levels to start with
    pub levels: usize,

    /// Largest inbound frame accepted on the stream channel
    pub max_frame_len: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: random_node_id(),
            udp_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            tcp_addr: SocketAddr::from(([0, 0, 0, 0], 9001)),
            levels: 3,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl NodeConfig {
    /// Read `GFR_*` environment variables, falling back to defaults.
    ///
    /// - `GFR_NODE_ID` (random if unset)
    /// - `GFR_UDP_ADDR` (`0.0.0.0:9000`)
    /// - `GFR_TCP_ADDR` (`0.0.0.0:9001`)
    /// - `GFR_LEVELS` (`3`)
    /// - `GFR_MAX_FRAME_LEN` (16MB)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let node_id = lookup("GFR_NODE_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.node_id);

        let levels = parse_var(&lookup, "GFR_LEVELS", defaults.levels)?;
        if levels == 0 {
            return Err(Error::Config("GFR_LEVELS must be at least 1".to_string()));
        }

        Ok(Self {
            node_id,
            udp_addr: parse_var(&lookup, "GFR_UDP_ADDR", defaults.udp_addr)?,
            tcp_addr: parse_var(&lookup, "GFR_TCP_ADDR", defaults.tcp_addr)?,
            levels,
            max_frame_len: parse_var(&lookup, "GFR_MAX_FRAME_LEN", defaults.max_frame_len)?,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn random_node_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("node-{}", hex::encode(bytes))
}
