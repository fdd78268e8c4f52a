//! Liveness observation at a real TCP subscriber.

use std::time::Duration;

use tokio::time::{timeout, Instant};

use inval_broker::LivenessWatch;
use inval_wire::Frame;

use crate::support::{connect_subscriber, start_test_broker};

#[tokio::test]
async fn test_idle_broker_emits_heartbeats_only() {
    let mut broker = start_test_broker().await;
    let period = broker.config().heartbeat_interval();
    let mut subscriber = connect_subscriber(&broker).await;

    // Observe for well over three heartbeat periods with no events
    // published.
    let deadline = Instant::now() + period * 5;
    let mut liveness = 0u32;
    let mut flushes = 0u32;
    while let Ok(read) = tokio::time::timeout_at(deadline, subscriber.recv()).await {
        match read.expect("read failed").expect("feed closed early") {
            Frame::Liveness => liveness += 1,
            Frame::CacheFlush(_) => flushes += 1,
        }
    }

    assert!(liveness >= 2, "saw only {liveness} liveness frames");
    assert_eq!(flushes, 0);

    broker.stop().await;
}

#[tokio::test]
async fn test_liveness_watch_detects_broker_death() {
    let mut broker = start_test_broker().await;
    let period = broker.config().heartbeat_interval();
    let mut subscriber = connect_subscriber(&broker).await;
    let mut watch = LivenessWatch::new(period);

    // A few heartbeats keep the watch fresh.
    for _ in 0..3 {
        let frame = timeout(Duration::from_secs(5), subscriber.recv())
            .await
            .expect("no frame before deadline")
            .expect("read failed")
            .expect("feed closed early");
        watch.observe(&frame);
    }
    assert!(!watch.broker_down());

    broker.stop().await;

    // The feed ends and heartbeats cease; past the grace window the
    // watch reports the broker down.
    tokio::time::sleep(period * 5).await;
    assert!(watch.broker_down());
}

#[tokio::test]
async fn test_heartbeat_waits_for_first_subscriber() {
    let mut broker = start_test_broker().await;

    // No subscriber yet: the emitter is still parked in its readiness
    // handshake, which the submitter-side timeout also demonstrates.
    let submitter = broker.submitter().expect("running broker");
    let submit_fut = submitter.submit("0123456789abcdef0123456789abcdef", 0.0);
    tokio::pin!(submit_fut);
    // Bound the wait well under the configured handshake timeout.
    assert!(timeout(Duration::from_millis(100), &mut submit_fut)
        .await
        .is_err());

    // First subscriber arrives; heartbeats start flowing.
    let mut subscriber = connect_subscriber(&broker).await;
    let frame = timeout(Duration::from_secs(5), subscriber.recv())
        .await
        .expect("no frame before deadline")
        .expect("read failed")
        .expect("feed closed early");
    assert!(matches!(frame, Frame::Liveness | Frame::CacheFlush(_)));

    broker.stop().await;
}
