//! # Event Submission Client
//!
//! The short-lived publisher used by the database write-detection hook:
//! one connection, one readiness handshake, one 25-byte frame, then
//! disconnect. Invoked once per detected write event, possibly from many
//! database workers at once; relative order between concurrent
//! submissions is unspecified.
//!
//! Delivery is best-effort. A failed connect or send is logged and
//! dropped; the database write that triggered the event must never fail
//! because cache invalidation did.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::BrokerError;
use crate::transport::Context;
use inval_wire::{CacheFlush, ObjectId};

/// Publishes invalidation events to a broker's ingress endpoint.
///
/// Cheap to clone; each `submit` opens its own transient connection, so
/// one submitter may serve any number of concurrent workers.
#[derive(Clone)]
pub struct EventSubmitter {
    ctx: Context,
    ingress_name: String,
    handshake_timeout: Duration,
}

impl EventSubmitter {
    /// Create a submitter for the named ingress endpoint.
    #[must_use]
    pub fn new(ctx: Context, ingress_name: impl Into<String>, handshake_timeout: Duration) -> Self {
        Self {
            ctx,
            ingress_name: ingress_name.into(),
            handshake_timeout,
        }
    }

    /// Publish one invalidation event.
    ///
    /// Parses the 32-hex-char identifier, connects, waits for the
    /// readiness handshake, sends one encoded frame, and disconnects.
    /// Any failure is returned without retry.
    pub async fn submit(&self, object_id: &str, timestamp: f64) -> Result<(), BrokerError> {
        let object_id = ObjectId::parse_hex32(object_id)?;

        let mut conn = self
            .ctx
            .connect_ingress(&self.ingress_name)
            .map_err(BrokerError::DeliveryFailed)?;

        match timeout(self.handshake_timeout, conn.await_subscriber()).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => return Err(BrokerError::DeliveryFailed(source)),
            Err(_) => return Err(BrokerError::HandshakeTimeout(self.handshake_timeout)),
        }

        let frame = CacheFlush {
            object_id,
            timestamp,
        }
        .encode();
        conn.send(Bytes::copy_from_slice(&frame))
            .await
            .map_err(BrokerError::DeliveryFailed)?;

        debug!(%object_id, timestamp, "invalidation published");
        Ok(())
    }

    /// Best-effort variant for the database write path: logs and
    /// swallows every failure.
    pub async fn submit_logged(&self, object_id: &str, timestamp: f64) {
        if let Err(error) = self.submit(object_id, timestamp).await {
            warn!(object_id, %error, "cache invalidation dropped");
        }
    }
}
