//! # Proxy Core
//!
//! The relay loop bridging the internal ingress endpoint to the public
//! fanout endpoint. Every producer frame is fanned out to all current
//! subscribers, and subscription-control traffic flows the other way so
//! producers' readiness handshakes see real public-side subscriptions.
//!
//! Producers never talk to the public endpoint directly: how many of them
//! exist, and how often they connect, is invisible to subscribers.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::transport::{ControlEvent, FanoutEndpoint, IngressEndpoint};

/// The relay loop state: exclusive owner of both endpoints for the
/// broker's lifetime.
pub(crate) struct ProxyCore {
    ingress: IngressEndpoint,
    fanout: FanoutEndpoint,
    shutdown: watch::Receiver<bool>,
}

impl ProxyCore {
    pub(crate) fn new(
        ingress: IngressEndpoint,
        fanout: FanoutEndpoint,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ingress,
            fanout,
            shutdown,
        }
    }

    /// Run the relay until shutdown or either endpoint closes, then tear
    /// the fanout endpoint down.
    pub(crate) async fn run(mut self) {
        info!(
            ingress = self.ingress.name(),
            public = %self.fanout.local_addr(),
            "relay loop started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                frame = self.ingress.recv() => match frame {
                    Some(frame) => self.fanout.broadcast(&frame),
                    None => {
                        debug!("ingress endpoint closed, relay exiting");
                        break;
                    }
                },
                control = self.fanout.next_control() => match control {
                    Some(ControlEvent::Subscribed) => self.ingress.note_subscribed(),
                    Some(ControlEvent::Unsubscribed) => self.ingress.note_unsubscribed(),
                    None => {
                        debug!("fanout endpoint closed, relay exiting");
                        break;
                    }
                },
            }
        }

        self.fanout.close().await;
        info!("relay loop stopped");
    }
}
