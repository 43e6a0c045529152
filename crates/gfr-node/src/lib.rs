//! GFR Node
//!
//! Wires the hierarchical ring table to the datagram and stream transports.
//!
//! # Architecture
//!
//! - **Config**: `GFR_*` environment variables
//! - **Message**: the JSON envelope peers exchange
//! - **Liveness**: a [`gfr_transfer::Receiver`] that records ping/pong
//!   arrivals in the ring table
//! - **Node**: starts both channels around one shared table
//!
//! Deciding when to broadcast, and interpreting anything beyond liveness, is
//! left to whatever sits on top.
//!
//! # Example
//!
//! ```no_run
//! use gfr_node::{NodeConfig, OverlayNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = OverlayNode::start(NodeConfig::from_env()?).await?;
//!     tokio::signal::ctrl_c().await?;
//!     node.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod liveness;
pub mod message;
pub mod node;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use liveness::LivenessReceiver;
pub use message::Message;
pub use node::OverlayNode;
