//! Broker configuration with validation.
//!
//! Loads from TOML, then applies `INVALD_*` environment overrides so a
//! deployment can retune a packaged config without editing it.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Default public fanout port from the reference deployment.
pub const DEFAULT_PUBLIC_PORT: u16 = 5556;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_MS: u64 = 100;

/// Default per-subscriber (and ingress) queue depth before frames drop.
pub const DEFAULT_QUEUE_DEPTH: usize = 1000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A zero interval would spin or make timeouts meaningless.
    #[error("invalid interval: {0} must be non-zero")]
    InvalidInterval(&'static str),

    /// A zero queue depth cannot buffer a single frame.
    #[error("subscriber_queue_depth must be non-zero")]
    InvalidQueueDepth,

    /// The ingress endpoint name is empty.
    #[error("ingress_name must be non-empty")]
    InvalidIngressName,

    /// The TOML source did not parse.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Public fanout endpoint address subscribers connect to.
    pub public_addr: SocketAddr,
    /// Process-local ingress endpoint name producers connect to.
    pub ingress_name: String,
    /// Liveness frame period, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// How long a producer waits for the readiness handshake.
    pub handshake_timeout_ms: u64,
    /// How long `stop()` waits for each background task to exit.
    pub shutdown_timeout_ms: u64,
    /// Queue depth per subscriber connection and for the ingress funnel.
    pub subscriber_queue_depth: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            public_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PUBLIC_PORT)),
            ingress_name: "inproc://invalidation".to_owned(),
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_MS,
            handshake_timeout_ms: 5_000,
            shutdown_timeout_ms: 2_000,
            subscriber_queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl BrokerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        Ok(config)
    }

    /// Apply `INVALD_*` environment overrides.
    ///
    /// Unparseable values are logged and skipped rather than aborting
    /// startup.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("INVALD_PUBLIC_ADDR") {
            match addr.parse() {
                Ok(addr) => self.public_addr = addr,
                Err(_) => warn!(value = %addr, "ignoring unparseable INVALD_PUBLIC_ADDR"),
            }
        }
        if let Ok(ms) = std::env::var("INVALD_HEARTBEAT_MS") {
            match ms.parse() {
                Ok(ms) => self.heartbeat_interval_ms = ms,
                Err(_) => warn!(value = %ms, "ignoring unparseable INVALD_HEARTBEAT_MS"),
            }
        }
        if let Ok(name) = std::env::var("INVALD_INGRESS_NAME") {
            if !name.is_empty() {
                self.ingress_name = name;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("heartbeat_interval_ms"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidInterval("handshake_timeout_ms"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::InvalidInterval("shutdown_timeout_ms"));
        }
        if self.subscriber_queue_depth == 0 {
            return Err(ConfigError::InvalidQueueDepth);
        }
        if self.ingress_name.is_empty() {
            return Err(ConfigError::InvalidIngressName);
        }
        Ok(())
    }

    /// Heartbeat period as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Readiness handshake timeout as a [`Duration`].
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Per-task shutdown join timeout as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
