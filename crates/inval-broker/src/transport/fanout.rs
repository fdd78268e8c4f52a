//! # Fanout Endpoint
//!
//! The public TCP side of the fabric. Any number of subscribers may
//! connect; each sends one subscribe control frame and thereafter
//! receives every frame published after its subscription registered.
//! There is no backlog delivery to late joiners.
//!
//! ## Control Frames
//!
//! A subscriber's only upstream traffic is single-byte control frames:
//! `0x01` subscribes to the full topic space, `0x00` unsubscribes.
//! Control frames are surfaced to the relay loop as [`ControlEvent`]s so
//! it can propagate them back to the ingress endpoint.
//!
//! ## Backpressure
//!
//! Each subscriber gets a bounded outgoing queue. A full queue drops the
//! frame for that subscriber only; delivery is best-effort and the relay
//! loop never blocks on a slow reader.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Subscribe-to-everything control byte.
pub const CONTROL_SUBSCRIBE: u8 = 0x01;

/// Unsubscribe control byte.
pub const CONTROL_UNSUBSCRIBE: u8 = 0x00;

/// Upper bound on an inbound control frame. Subscribers only ever send
/// one-byte controls; anything larger is a protocol violation.
const MAX_CONTROL_FRAME_LEN: usize = 64;

/// Capacity of the control-event channel into the relay loop.
const CONTROL_EVENT_DEPTH: usize = 64;

/// Subscription-control traffic surfaced to the relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlEvent {
    /// A subscriber completed its subscription handshake.
    Subscribed,
    /// A subscriber unsubscribed or disconnected.
    Unsubscribed,
}

type SubscriberTable = Arc<Mutex<HashMap<u64, mpsc::Sender<Bytes>>>>;

/// Bind side of the public fanout endpoint.
///
/// Accepting and per-connection I/O run on background tasks; the relay
/// loop drives this handle for broadcasting and control-event intake.
/// [`FanoutEndpoint::close`] stops the listener and joins the accept
/// task.
pub struct FanoutEndpoint {
    local_addr: SocketAddr,
    subscribers: SubscriberTable,
    control_rx: mpsc::Receiver<ControlEvent>,
    closed: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl FanoutEndpoint {
    /// Bind the public TCP listener and start accepting subscribers.
    pub(crate) async fn bind(addr: SocketAddr, queue_depth: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let subscribers: SubscriberTable = Arc::new(Mutex::new(HashMap::new()));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_EVENT_DEPTH);
        let (closed_tx, closed_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&subscribers),
            control_tx,
            closed_rx,
            queue_depth,
        ));

        info!(%local_addr, "fanout endpoint listening");
        Ok(Self {
            local_addr,
            subscribers,
            control_rx,
            closed: closed_tx,
            accept_task,
        })
    }

    /// The actual bound address (useful when binding port 0).
    #[must_use]
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive the next subscription-control event.
    ///
    /// Returns `None` only once every connection task is gone after close.
    pub(crate) async fn next_control(&mut self) -> Option<ControlEvent> {
        self.control_rx.recv().await
    }

    /// Fan one frame out to every registered subscriber.
    ///
    /// Never blocks: slow subscribers lose the frame, dead ones are
    /// pruned.
    pub(crate) fn broadcast(&self, frame: &Bytes) {
        let mut dead = Vec::new();
        let mut table = self.subscribers.lock();
        for (id, queue) in table.iter() {
            match queue.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = id, "subscriber queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        for id in dead {
            table.remove(&id);
        }
    }

    /// Stop accepting, disconnect every subscriber task, and join the
    /// accept loop.
    pub(crate) async fn close(self) {
        let _ = self.closed.send(true);
        if self.accept_task.await.is_err() {
            warn!("fanout accept task panicked");
        }
        self.subscribers.lock().clear();
        info!(local_addr = %self.local_addr, "fanout endpoint closed");
    }
}

async fn accept_loop(
    listener: TcpListener,
    subscribers: SubscriberTable,
    control_tx: mpsc::Sender<ControlEvent>,
    mut closed: watch::Receiver<bool>,
    queue_depth: usize,
) {
    let mut next_id: u64 = 0;
    loop {
        tokio::select! {
            _ = closed.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_id += 1;
                    tokio::spawn(subscriber_conn(
                        stream,
                        peer,
                        next_id,
                        Arc::clone(&subscribers),
                        control_tx.clone(),
                        closed.clone(),
                        queue_depth,
                    ));
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                }
            },
        }
    }
    debug!("fanout accept loop stopped");
}

/// One subscriber connection: a reader loop for control frames in this
/// task, plus a spawned writer draining the outgoing queue.
async fn subscriber_conn(
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    subscribers: SubscriberTable,
    control_tx: mpsc::Sender<ControlEvent>,
    mut closed: watch::Receiver<bool>,
    queue_depth: usize,
) {
    debug!(%peer, "subscriber connected");
    let (mut reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<Bytes>(queue_depth);

    let writer_task = tokio::spawn(write_loop(writer, out_rx, closed.clone()));

    let mut subscribed = false;
    loop {
        tokio::select! {
            _ = closed.changed() => break,
            control = read_control_frame(&mut reader) => match control {
                Ok(Some(byte)) => match byte {
                    CONTROL_SUBSCRIBE if !subscribed => {
                        subscribers.lock().insert(id, out_tx.clone());
                        subscribed = true;
                        debug!(%peer, "subscription registered");
                        if control_tx.send(ControlEvent::Subscribed).await.is_err() {
                            break;
                        }
                    }
                    CONTROL_UNSUBSCRIBE if subscribed => {
                        subscribers.lock().remove(&id);
                        subscribed = false;
                        debug!(%peer, "subscription removed");
                        if control_tx.send(ControlEvent::Unsubscribed).await.is_err() {
                            break;
                        }
                    }
                    other => {
                        debug!(%peer, control = other, "ignoring control frame");
                    }
                },
                Ok(None) => break,
                Err(error) => {
                    debug!(%peer, %error, "subscriber read failed");
                    break;
                }
            },
        }
    }

    if subscribers.lock().remove(&id).is_some() {
        let _ = control_tx.send(ControlEvent::Unsubscribed).await;
    }
    drop(out_tx);
    let _ = writer_task.await;
    debug!(%peer, "subscriber disconnected");
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut out_rx: mpsc::Receiver<Bytes>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = closed.changed() => break,
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(error) = write_frame(&mut writer, &frame).await {
                    debug!(%error, "subscriber write failed");
                    break;
                }
            }
        }
    }
}

/// Read one length-prefixed control frame; `Ok(None)` on clean EOF.
///
/// Only the leading control byte matters; a trailing topic prefix (empty
/// in practice, subscribers take the full topic space) is read and
/// discarded.
async fn read_control_frame(reader: &mut OwnedReadHalf) -> io::Result<Option<u8>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_CONTROL_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "control frame length out of range",
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload[0]))
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &[u8]) -> io::Result<()> {
    let len = u32::try_from(frame.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await
}
