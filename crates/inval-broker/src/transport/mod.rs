//! # Messaging Transport
//!
//! A small tokio-native pub/sub fabric with two endpoint kinds:
//!
//! - **Ingress endpoints** are process-local and named (`inproc://...`
//!   style). Producers connect to one by name, wait for the
//!   subscription-control handshake, and publish whole frames.
//! - **Fanout endpoints** are public TCP listeners. Subscribers connect,
//!   send one subscribe control frame, and then receive every frame
//!   published after their subscription registers.
//!
//! On the TCP leg each frame travels behind a 4-byte big-endian length
//! prefix; the prefix is transport framing only and never part of the
//! payload. Ingress traffic never touches the network.
//!
//! All endpoints are created from a [`Context`], which owns the
//! process-local ingress registry and answers liveness queries after the
//! owning broker shuts down.

pub mod fanout;
pub mod ingress;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::debug;

pub use fanout::FanoutEndpoint;
pub(crate) use fanout::ControlEvent;
pub use ingress::{IngressEndpoint, ProducerConn};

/// Errors from transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport context was already closed.
    #[error("transport context closed")]
    ContextClosed,

    /// An ingress endpoint with this name is already bound.
    #[error("endpoint already bound: {0}")]
    EndpointInUse(String),

    /// No ingress endpoint with this name exists.
    #[error("no such endpoint: {0}")]
    NoSuchEndpoint(String),

    /// The endpoint went away mid-operation; normal during shutdown.
    #[error("endpoint closed: {0}")]
    EndpointClosed(String),

    /// Socket-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bind-side state an ingress endpoint shares with its producers.
pub(crate) struct IngressShared {
    /// Frame sink; every producer send funnels into the relay loop.
    pub(crate) frames: mpsc::Sender<Bytes>,
    /// Current propagated subscription count on the public side.
    pub(crate) subscribers: watch::Receiver<usize>,
}

struct ContextInner {
    live: AtomicBool,
    ingress: Mutex<HashMap<String, IngressShared>>,
}

/// Shared transport state for one broker instance.
///
/// Owned by the broker lifecycle controller; handles are cheap clones.
/// Once [`Context::close`] runs, every bind and connect fails and
/// [`Context::is_live`] answers `false`.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a fresh, live context with an empty ingress registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                live: AtomicBool::new(true),
                ingress: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether the context is still open for endpoint operations.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Close the context: unbind every ingress endpoint and refuse any
    /// further binds or connects. Idempotent.
    pub(crate) fn close(&self) {
        self.inner.live.store(false, Ordering::Release);
        let mut registry = self.inner.ingress.lock();
        if !registry.is_empty() {
            debug!(endpoints = registry.len(), "closing transport context");
        }
        registry.clear();
    }

    /// Bind a process-local ingress endpoint under `name`.
    ///
    /// The returned endpoint is the bind side: it drains producer frames
    /// and owns the subscription-control signal producers handshake on.
    /// Unbinds itself when dropped.
    pub(crate) fn bind_ingress(
        &self,
        name: &str,
        queue_depth: usize,
    ) -> Result<IngressEndpoint, TransportError> {
        if !self.is_live() {
            return Err(TransportError::ContextClosed);
        }

        let mut registry = self.inner.ingress.lock();
        if registry.contains_key(name) {
            return Err(TransportError::EndpointInUse(name.to_owned()));
        }

        let (frames_tx, frames_rx) = mpsc::channel(queue_depth);
        let (control_tx, control_rx) = watch::channel(0usize);
        registry.insert(
            name.to_owned(),
            IngressShared {
                frames: frames_tx,
                subscribers: control_rx,
            },
        );
        drop(registry);

        debug!(endpoint = name, "ingress endpoint bound");
        Ok(IngressEndpoint::new(
            name.to_owned(),
            frames_rx,
            control_tx,
            self.clone(),
        ))
    }

    /// Connect a transient producer to the named ingress endpoint.
    pub fn connect_ingress(&self, name: &str) -> Result<ProducerConn, TransportError> {
        if !self.is_live() {
            return Err(TransportError::ContextClosed);
        }

        let registry = self.inner.ingress.lock();
        let shared = registry
            .get(name)
            .ok_or_else(|| TransportError::NoSuchEndpoint(name.to_owned()))?;
        Ok(ProducerConn::new(
            name.to_owned(),
            shared.frames.clone(),
            shared.subscribers.clone(),
        ))
    }

    /// Remove one ingress endpoint from the registry, if still present.
    pub(crate) fn unbind_ingress(&self, name: &str) {
        if self.inner.ingress.lock().remove(name).is_some() {
            debug!(endpoint = name, "ingress endpoint unbound");
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
