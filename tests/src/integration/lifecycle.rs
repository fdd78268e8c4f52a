//! Broker lifecycle: startup sequencing, rollback, restart, idempotent
//! stop.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use inval_broker::{Broker, BrokerError, BrokerState, StartupStep};

use crate::support::{public_addr, start_test_broker, test_config};

#[tokio::test]
async fn test_start_stop_releases_everything() {
    let mut broker = start_test_broker().await;
    let addr = public_addr(&broker);
    let ctx = broker.context().expect("running broker has a context");
    assert!(ctx.is_live());

    broker.stop().await;

    assert_eq!(broker.state(), BrokerState::Stopped);
    assert!(!ctx.is_live());
    assert!(broker.public_addr().is_none());
    // The public listener is gone.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_stop_without_start_is_noop() {
    let mut broker = Broker::new(test_config());
    broker.stop().await;
    broker.stop().await;
    assert_eq!(broker.state(), BrokerState::Stopped);
}

#[tokio::test]
async fn test_public_bind_conflict_rolls_back() {
    // Occupy a port, then ask the broker to bind it.
    let occupied = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let taken_addr = occupied.local_addr().expect("local addr");

    let mut config = test_config();
    config.public_addr = taken_addr;
    let mut broker = Broker::new(config);

    let err = broker.start().await.expect_err("start must fail");
    match err {
        BrokerError::StartupFailed { step, .. } => {
            assert_eq!(step, StartupStep::PublicBind);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Fully rolled back: no state, no context, no ingress endpoint.
    assert_eq!(broker.state(), BrokerState::Stopped);
    assert!(broker.context().is_none());
    assert!(broker.submitter().is_none());
}

#[tokio::test]
async fn test_restart_after_failed_start() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.expect("bind");

    let mut config = test_config();
    config.public_addr = occupied.local_addr().expect("local addr");
    let mut broker = Broker::new(config);
    assert!(broker.start().await.is_err());

    // Same process, port released: the broker must come up cleanly.
    drop(occupied);
    timeout(Duration::from_secs(5), broker.start())
        .await
        .expect("start hung")
        .expect("restart failed");
    assert_eq!(broker.state(), BrokerState::Running);

    broker.stop().await;
}

#[tokio::test]
async fn test_stop_while_heartbeat_is_mid_sleep() {
    let mut config = test_config();
    // One-hour period: after the first tick the emitter sleeps until
    // stopped.
    config.heartbeat_interval_ms = 3_600_000;
    let mut broker = Broker::new(config);
    broker.start().await.expect("start");

    let mut subscriber = crate::support::connect_subscriber(&broker).await;
    let first = timeout(Duration::from_secs(5), subscriber.recv())
        .await
        .expect("no first heartbeat")
        .expect("read failed")
        .expect("feed closed early");
    assert!(matches!(first, inval_wire::Frame::Liveness));

    timeout(Duration::from_secs(2), broker.stop())
        .await
        .expect("stop did not interrupt a sleeping heartbeat");
    assert_eq!(broker.state(), BrokerState::Stopped);
}
