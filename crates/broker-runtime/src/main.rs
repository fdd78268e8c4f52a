//! # Invalidation Broker Runtime
//!
//! The `invald` host process: loads configuration, starts one broker
//! instance, and runs until interrupted.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG` controls filtering)
//! 2. Load configuration (optional TOML path argument, then `INVALD_*`
//!    environment overrides)
//! 3. Validate configuration
//! 4. Start the broker (public endpoint, ingress endpoint, heartbeat,
//!    relay loop)
//! 5. Wait for ctrl-c, then stop gracefully

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use inval_broker::{Broker, BrokerConfig};

/// Load configuration from an optional TOML file plus the environment.
fn load_config() -> Result<BrokerConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {path}"))?;
            BrokerConfig::from_toml_str(&source)
                .with_context(|| format!("failed to parse config file {path}"))?
        }
        None => BrokerConfig::default(),
    };

    config.apply_env_overrides();
    config.validate().context("invalid broker configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(true)
        .init();

    let config = load_config()?;

    info!("===========================================");
    info!("  Invalidation Broker (invald) v0.1.0");
    info!("===========================================");
    info!("Public endpoint:  {}", config.public_addr);
    info!("Ingress endpoint: {}", config.ingress_name);
    info!(
        "Heartbeat period: {} ms",
        config.heartbeat_interval().as_millis()
    );

    let mut broker = Broker::new(config);
    broker.start().await.context("broker failed to start")?;

    info!("Broker is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    broker.stop().await;
    Ok(())
}
