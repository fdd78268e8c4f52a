//! # Invalidation Broker
//!
//! Propagates cache-invalidation events generated by database write
//! activity to a fleet of downstream cache clients, in real time, over a
//! pub/sub messaging fabric.
//!
//! ## Architecture
//!
//! ```text
//!  database workers                       cache clients
//!  ┌──────────────┐                      ┌──────────────┐
//!  │ Event        │  inproc ingress      │ Invalidation │
//!  │ Submitter  ──┼───────┐              │ Subscriber   │
//!  └──────────────┘       ▼              └──────▲───────┘
//!  ┌──────────────┐  ┌─────────┐   TCP :5556   │
//!  │ Heartbeat  ──┼─▶│  Relay  │───────────────┴── ... any number
//!  │ Emitter      │  │  Loop   │◀── subscription control
//!  └──────────────┘  └─────────┘
//! ```
//!
//! Producers publish to a process-local ingress endpoint; the relay loop
//! bridges it to the public TCP fanout endpoint and propagates
//! subscription control the other way. The heartbeat emitter injects
//! periodic liveness frames into the same path so subscribers can tell
//! "no events" from "broker down".
//!
//! The [`Broker`] lifecycle controller owns all of it: the transport
//! context, both endpoints, and both background tasks come up together
//! and are torn down together. Delivery is best-effort end to end; a
//! database write never fails because its invalidation was lost.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod config;
pub mod error;
pub mod submit;
pub mod subscribe;
pub mod transport;

mod heartbeat;
mod proxy;

// Re-export main types
pub use broker::{Broker, BrokerState};
pub use config::{BrokerConfig, ConfigError};
pub use error::{BrokerError, StartupStep};
pub use submit::EventSubmitter;
pub use subscribe::{InvalidationSubscriber, LivenessWatch};
pub use transport::{Context, ProducerConn, TransportError};
