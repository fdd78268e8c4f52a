//! # Heartbeat Emitter
//!
//! One background task per broker lifetime. After the readiness
//! handshake proves the ingress→public bridge is live, it publishes one
//! liveness frame per period so subscribers can tell "no events" from
//! "broker down".
//!
//! A failed send means the ingress endpoint is gone, which only happens
//! during shutdown; the task logs and terminates rather than retrying.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::transport::ProducerConn;
use inval_wire::LIVENESS_FRAME;

/// The periodic liveness announcer.
pub(crate) struct HeartbeatEmitter {
    conn: ProducerConn,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl HeartbeatEmitter {
    pub(crate) fn new(
        conn: ProducerConn,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            conn,
            period,
            shutdown,
        }
    }

    /// Handshake, then tick until shutdown or a failed send.
    ///
    /// The shutdown signal interrupts both the handshake and a mid-sleep
    /// tick immediately; the task never sleeps through a stop request.
    pub(crate) async fn run(mut self) {
        tokio::select! {
            _ = self.shutdown.changed() => {
                debug!("heartbeat stopped before first subscriber");
                return;
            }
            handshake = self.conn.await_subscriber() => {
                if handshake.is_err() {
                    warn!("ingress endpoint closed before heartbeat handshake");
                    return;
                }
            }
        }

        info!(period_ms = self.period.as_millis() as u64, "heartbeat started");
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => {
                    if self.conn.send(Bytes::from_static(&LIVENESS_FRAME)).await.is_err() {
                        info!("ingress endpoint gone, stopping heartbeat");
                        return;
                    }
                }
            }
        }
        info!("heartbeat stopped");
    }
}
