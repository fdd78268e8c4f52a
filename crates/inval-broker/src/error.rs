//! Broker error taxonomy.
//!
//! Every failure here is local: logged, never retried, and never allowed
//! to propagate into the database write path that triggered the event.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;
use inval_wire::WireError;

/// Which `start()` step failed, for rollback reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStep {
    /// Binding the public fanout endpoint.
    PublicBind,
    /// Binding the process-local ingress endpoint.
    IngressBind,
    /// Connecting the heartbeat emitter to the ingress endpoint.
    HeartbeatConnect,
}

impl fmt::Display for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PublicBind => "public endpoint bind",
            Self::IngressBind => "ingress endpoint bind",
            Self::HeartbeatConnect => "heartbeat connect",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the broker and its clients.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// `start()` failed and was fully rolled back; `step` names the
    /// first step that did not complete.
    #[error("startup failed at {step}: {source}")]
    StartupFailed {
        /// The failing startup step.
        step: StartupStep,
        /// The underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// `start()` was called on a broker that is not stopped.
    #[error("broker already running")]
    AlreadyRunning,

    /// A best-effort publish was lost; logged, never retried.
    #[error("invalidation delivery failed")]
    DeliveryFailed(#[source] TransportError),

    /// The producer readiness handshake did not complete in time.
    #[error("readiness handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Malformed identifier or frame.
    #[error(transparent)]
    Wire(#[from] WireError),
}
