//! # Subscriber Client
//!
//! The downstream side of the fabric: connects to a broker's public
//! endpoint, subscribes to the full topic space, and decodes the frames
//! that follow. Also provides [`LivenessWatch`], the staleness detector
//! cache clients use to tell "no events" from "broker down".
//!
//! Per the protocol contract, a consumer treats any frame that is not a
//! well-formed cache flush as a liveness signal rather than a parse
//! error; unknown future frame kinds must not kill existing clients.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::transport::fanout::CONTROL_SUBSCRIBE;
use inval_wire::Frame;

/// Largest frame a subscriber will accept from the broker.
const MAX_FRAME_LEN: usize = 64;

/// How many missed heartbeat periods mean the broker is down.
const DEFAULT_LIVENESS_GRACE: u32 = 3;

/// A connected, subscribed cache client.
pub struct InvalidationSubscriber {
    stream: TcpStream,
}

impl InvalidationSubscriber {
    /// Connect to a broker's public endpoint and subscribe to every
    /// invalidation topic.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(&1u32.to_be_bytes()).await?;
        stream.write_all(&[CONTROL_SUBSCRIBE]).await?;
        stream.flush().await?;
        info!(%addr, "subscribed to invalidation feed");
        Ok(Self { stream })
    }

    /// Receive and decode the next frame; `Ok(None)` on clean EOF.
    ///
    /// Malformed frames are logged and reported as [`Frame::Liveness`];
    /// the connection stays usable.
    pub async fn recv(&mut self) -> io::Result<Option<Frame>> {
        let Some(payload) = self.recv_raw().await? else {
            return Ok(None);
        };
        match Frame::decode(&payload) {
            Ok(frame) => Ok(Some(frame)),
            Err(error) => {
                debug!(%error, len = payload.len(), "unrecognized frame, treating as liveness");
                Ok(Some(Frame::Liveness))
            }
        }
    }

    /// Receive the next raw frame payload; `Ok(None)` on clean EOF.
    pub async fn recv_raw(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame length out of range",
            ));
        }

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }
}

/// Broker-down detector driven by observed liveness frames.
///
/// The broker announces itself every heartbeat period; a subscriber that
/// has not seen a liveness frame for several periods should treat the
/// broker as dead or partitioned and fall back to its TTL story.
#[derive(Debug)]
pub struct LivenessWatch {
    period: Duration,
    grace: u32,
    last_seen: Instant,
}

impl LivenessWatch {
    /// Create a watch for the given heartbeat period with the default
    /// grace of three missed periods.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self::with_grace(period, DEFAULT_LIVENESS_GRACE)
    }

    /// Create a watch that tolerates `grace` missed periods.
    #[must_use]
    pub fn with_grace(period: Duration, grace: u32) -> Self {
        Self {
            period,
            grace: grace.max(1),
            last_seen: Instant::now(),
        }
    }

    /// Record one received frame. Only liveness frames refresh the
    /// watch; invalidation traffic does not prove the heartbeat task is
    /// alive.
    pub fn observe(&mut self, frame: &Frame) {
        if matches!(frame, Frame::Liveness) {
            self.last_seen = Instant::now();
        }
    }

    /// Whether the broker has missed enough heartbeats to be presumed
    /// down.
    #[must_use]
    pub fn broker_down(&self) -> bool {
        self.last_seen.elapsed() > self.period * self.grace
    }
}
