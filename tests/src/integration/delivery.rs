//! End-to-end delivery: submitter → ingress → relay → TCP subscriber.

use std::time::Duration;

use tokio::time::timeout;

use inval_wire::{Frame, FLUSH_FRAME_LEN, LIVENESS_TAG};

use crate::support::{connect_subscriber, start_test_broker};

const SAMPLE_ID: &str = "0123456789abcdef0123456789abcdef";
const SAMPLE_TS: f64 = 1_700_000_000.5;

#[tokio::test]
async fn test_single_event_reaches_subscriber() {
    let mut broker = start_test_broker().await;
    let mut subscriber = connect_subscriber(&broker).await;

    broker
        .submitter()
        .expect("running broker")
        .submit(SAMPLE_ID, SAMPLE_TS)
        .await
        .expect("submit failed");

    // Heartbeats share the path; skip them until the flush arrives.
    let frame = loop {
        let payload = timeout(Duration::from_secs(5), subscriber.recv_raw())
            .await
            .expect("no frame before deadline")
            .expect("read failed")
            .expect("feed closed early");
        if payload.len() == 1 && payload[0] == LIVENESS_TAG {
            continue;
        }
        break payload;
    };

    assert_eq!(frame.len(), FLUSH_FRAME_LEN);
    assert_eq!(frame[0], b'C');
    assert_eq!(
        &frame[1..17],
        &[
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef
        ]
    );
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&frame[17..]);
    assert_eq!(f64::from_ne_bytes(ts).to_bits(), SAMPLE_TS.to_bits());

    // Exactly one: nothing but liveness follows.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(150);
    loop {
        let Ok(read) = tokio::time::timeout_at(deadline, subscriber.recv()).await else {
            break;
        };
        match read.expect("read failed").expect("feed closed early") {
            Frame::Liveness => {}
            Frame::CacheFlush(extra) => panic!("unexpected second flush: {}", extra.object_id),
        }
    }

    broker.stop().await;
}

#[tokio::test]
async fn test_every_subscriber_receives_the_event() {
    let mut broker = start_test_broker().await;
    let mut first = connect_subscriber(&broker).await;
    let mut second = connect_subscriber(&broker).await;

    broker
        .submitter()
        .expect("running broker")
        .submit(SAMPLE_ID, SAMPLE_TS)
        .await
        .expect("submit failed");

    for subscriber in [&mut first, &mut second] {
        let flush = next_flush(subscriber).await;
        assert_eq!(flush.object_id.to_hex32(), SAMPLE_ID);
        assert_eq!(flush.timestamp.to_bits(), SAMPLE_TS.to_bits());
    }

    broker.stop().await;
}

#[tokio::test]
async fn test_late_subscriber_misses_earlier_events() {
    let mut broker = start_test_broker().await;
    let mut early = connect_subscriber(&broker).await;
    let submitter = broker.submitter().expect("running broker");

    submitter
        .submit(SAMPLE_ID, 1.0)
        .await
        .expect("submit failed");
    assert_eq!(next_flush(&mut early).await.timestamp.to_bits(), 1.0f64.to_bits());

    // Joins after the first event: no backlog delivery.
    let mut late = connect_subscriber(&broker).await;
    submitter
        .submit(SAMPLE_ID, 2.0)
        .await
        .expect("submit failed");

    assert_eq!(next_flush(&mut late).await.timestamp.to_bits(), 2.0f64.to_bits());
    assert_eq!(next_flush(&mut early).await.timestamp.to_bits(), 2.0f64.to_bits());

    broker.stop().await;
}

/// Read frames until the next cache flush, skipping liveness traffic.
async fn next_flush(subscriber: &mut inval_broker::InvalidationSubscriber) -> inval_wire::CacheFlush {
    loop {
        let frame = timeout(Duration::from_secs(5), subscriber.recv())
            .await
            .expect("no frame before deadline")
            .expect("read failed")
            .expect("feed closed early");
        if let Frame::CacheFlush(flush) = frame {
            return flush;
        }
    }
}
