//! GFR node binary
//!
//! Runs the ring table and both transports until Ctrl-C.

use gfr_node::{NodeConfig, OverlayNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gfr_node=info,gfr_transfer=info,gfr_ring=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting GFR node");

    let config = NodeConfig::from_env()?;
    let node = OverlayNode::start(config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    node.shutdown();

    Ok(())
}
