//! # Broker Lifecycle Controller
//!
//! Brings the transport context, both endpoints, and the background
//! tasks up in a fixed order and tears them down on failure or shutdown.
//! The `Broker` value owns every handle; there are no process-wide
//! transport globals.
//!
//! ## Startup Order
//!
//! 1. Create the transport context
//! 2. Bind the public fanout endpoint
//! 3. Bind the process-local ingress endpoint
//! 4. Connect and spawn the heartbeat emitter
//! 5. Spawn the relay loop
//!
//! Any failing step rolls everything opened so far back; a failed
//! `start()` never leaves a partial broker running.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, StartupStep};
use crate::heartbeat::HeartbeatEmitter;
use crate::proxy::ProxyCore;
use crate::submit::EventSubmitter;
use crate::transport::{Context, FanoutEndpoint};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// No resources held.
    Stopped,
    /// `start()` in progress.
    Starting,
    /// Endpoints bound, heartbeat and relay running.
    Running,
    /// `stop()` in progress.
    Stopping,
}

/// Handles owned while the broker runs.
struct Running {
    ctx: Context,
    shutdown: watch::Sender<bool>,
    heartbeat: JoinHandle<()>,
    relay: JoinHandle<()>,
    public_addr: SocketAddr,
}

/// The invalidation broker.
///
/// One instance per process in the reference deployment. `start()` and
/// `stop()` take `&mut self`; the controller is deliberately not
/// reentrant.
pub struct Broker {
    config: BrokerConfig,
    state: BrokerState,
    running: Option<Running>,
}

impl Broker {
    /// Create a stopped broker with the given configuration.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: BrokerState::Stopped,
            running: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        self.state
    }

    /// The configuration this broker was built with.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Actual public endpoint address, once running. Differs from the
    /// configured address when it was bound to port 0.
    #[must_use]
    pub fn public_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.public_addr)
    }

    /// The live transport context, once running.
    #[must_use]
    pub fn context(&self) -> Option<Context> {
        self.running.as_ref().map(|r| r.ctx.clone())
    }

    /// An event submission client bound to this broker's ingress
    /// endpoint, once running.
    #[must_use]
    pub fn submitter(&self) -> Option<EventSubmitter> {
        self.running.as_ref().map(|r| {
            EventSubmitter::new(
                r.ctx.clone(),
                self.config.ingress_name.clone(),
                self.config.handshake_timeout(),
            )
        })
    }

    /// Bring the broker up.
    ///
    /// On error, everything opened by earlier steps has already been
    /// closed and joined; the broker is back in `Stopped` and may be
    /// started again.
    pub async fn start(&mut self) -> Result<(), BrokerError> {
        if self.state != BrokerState::Stopped {
            return Err(BrokerError::AlreadyRunning);
        }
        self.state = BrokerState::Starting;
        info!(public_addr = %self.config.public_addr, "starting invalidation broker");

        match self.start_inner().await {
            Ok(running) => {
                info!(public_addr = %running.public_addr, "invalidation broker running");
                self.running = Some(running);
                self.state = BrokerState::Running;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "broker startup failed, rolled back");
                self.state = BrokerState::Stopped;
                Err(err)
            }
        }
    }

    async fn start_inner(&mut self) -> Result<Running, BrokerError> {
        let ctx = Context::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Public endpoint first, mirroring the order subscribers depend
        // on: a bound ingress with no public side would strand producers.
        let fanout = match FanoutEndpoint::bind(
            self.config.public_addr,
            self.config.subscriber_queue_depth,
        )
        .await
        {
            Ok(fanout) => fanout,
            Err(source) => {
                ctx.close();
                return Err(BrokerError::StartupFailed {
                    step: StartupStep::PublicBind,
                    source: source.into(),
                });
            }
        };
        let public_addr = fanout.local_addr();

        let ingress = match ctx.bind_ingress(
            &self.config.ingress_name,
            self.config.subscriber_queue_depth,
        ) {
            Ok(ingress) => ingress,
            Err(source) => {
                fanout.close().await;
                ctx.close();
                return Err(BrokerError::StartupFailed {
                    step: StartupStep::IngressBind,
                    source,
                });
            }
        };

        let heartbeat_conn = match ctx.connect_ingress(&self.config.ingress_name) {
            Ok(conn) => conn,
            Err(source) => {
                drop(ingress);
                fanout.close().await;
                ctx.close();
                return Err(BrokerError::StartupFailed {
                    step: StartupStep::HeartbeatConnect,
                    source,
                });
            }
        };

        let heartbeat = tokio::spawn(
            HeartbeatEmitter::new(
                heartbeat_conn,
                self.config.heartbeat_interval(),
                shutdown_rx.clone(),
            )
            .run(),
        );
        let relay = tokio::spawn(ProxyCore::new(ingress, fanout, shutdown_rx).run());

        Ok(Running {
            ctx,
            shutdown: shutdown_tx,
            heartbeat,
            relay,
            public_addr,
        })
    }

    /// Tear the broker down. Idempotent: stopping a stopped broker is a
    /// no-op.
    ///
    /// Signals both background tasks, joins the heartbeat, joins the
    /// relay loop (which closes the fanout endpoint on exit), then
    /// closes the transport context.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        self.state = BrokerState::Stopping;
        info!("stopping invalidation broker");

        let _ = running.shutdown.send(true);
        let join_timeout = self.config.shutdown_timeout();
        join_task("heartbeat", running.heartbeat, join_timeout).await;
        join_task("relay", running.relay, join_timeout).await;

        running.ctx.close();
        self.state = BrokerState::Stopped;
        info!("invalidation broker stopped");
    }
}

/// Join one background task, aborting only if it ignores the shutdown
/// signal past the deadline.
async fn join_task(name: &str, mut handle: JoinHandle<()>, deadline: Duration) {
    match timeout(deadline, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(join_err)) => error!(task = name, error = %join_err, "broker task panicked"),
        Err(_) => {
            warn!(task = name, ?deadline, "task ignored shutdown signal, aborting");
            handle.abort();
            let _ = handle.await;
        }
    }
}
