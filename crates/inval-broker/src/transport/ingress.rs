//! # Ingress Endpoint
//!
//! The process-local side of the fabric. The bind side lives inside the
//! relay loop; the connect side ([`ProducerConn`]) is held briefly by the
//! heartbeat emitter and by each event submission.
//!
//! ## Readiness Handshake
//!
//! A producer must not publish before the ingress→public bridge is live,
//! or its frames vanish silently while the proxy is still initializing.
//! [`ProducerConn::await_subscriber`] blocks until at least one public
//! subscription has been propagated back through the relay loop; late
//! connectors observe an existing subscription immediately.

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{Context, TransportError};

/// Bind side of a process-local ingress endpoint.
///
/// Drains frames published by producers and owns the subscription-control
/// signal their readiness handshake waits on. Unbinds from the owning
/// [`Context`] when dropped.
pub struct IngressEndpoint {
    name: String,
    frames: mpsc::Receiver<Bytes>,
    subscribers: watch::Sender<usize>,
    ctx: Context,
}

impl IngressEndpoint {
    pub(crate) fn new(
        name: String,
        frames: mpsc::Receiver<Bytes>,
        subscribers: watch::Sender<usize>,
        ctx: Context,
    ) -> Self {
        Self {
            name,
            frames,
            subscribers,
            ctx,
        }
    }

    /// Receive the next producer frame.
    ///
    /// Returns `None` once the endpoint is unbound and every producer
    /// handle is gone.
    pub(crate) async fn recv(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Record one public-side subscription propagated back by the proxy.
    /// Releases producers blocked in the readiness handshake.
    pub(crate) fn note_subscribed(&self) {
        self.subscribers.send_modify(|count| *count += 1);
    }

    /// Record one public-side subscription going away.
    pub(crate) fn note_unsubscribed(&self) {
        self.subscribers
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Endpoint name, for logging.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for IngressEndpoint {
    fn drop(&mut self) {
        self.ctx.unbind_ingress(&self.name);
    }
}

/// A transient producer connection to an ingress endpoint.
///
/// Owned by exactly one producer; dropping it disconnects. Does not keep
/// the endpoint alive.
pub struct ProducerConn {
    name: String,
    frames: mpsc::Sender<Bytes>,
    subscribers: watch::Receiver<usize>,
}

impl ProducerConn {
    pub(crate) fn new(
        name: String,
        frames: mpsc::Sender<Bytes>,
        subscribers: watch::Receiver<usize>,
    ) -> Self {
        Self {
            name,
            frames,
            subscribers,
        }
    }

    /// Block until at least one subscription-control notification has
    /// reached this endpoint.
    ///
    /// Fails with [`TransportError::EndpointClosed`] if the endpoint is
    /// unbound while waiting; that only happens during shutdown.
    pub async fn await_subscriber(&mut self) -> Result<(), TransportError> {
        match self.subscribers.wait_for(|count| *count > 0).await {
            Ok(_) => {
                debug!(endpoint = %self.name, "producer handshake complete");
                Ok(())
            }
            Err(_) => Err(TransportError::EndpointClosed(self.name.clone())),
        }
    }

    /// Publish one whole frame.
    ///
    /// A failed send means the ingress side is gone; callers treat that
    /// as best-effort loss, not something to retry.
    pub async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| TransportError::EndpointClosed(self.name.clone()))
    }

    /// Currently propagated subscription count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        *self.subscribers.borrow()
    }
}
