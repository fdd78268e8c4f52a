//! Shared fixtures for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use inval_broker::{Broker, BrokerConfig, InvalidationSubscriber};

/// A configuration suitable for tests: loopback on an ephemeral port and
/// a fast heartbeat so liveness assertions finish quickly.
#[must_use]
pub fn test_config() -> BrokerConfig {
    BrokerConfig {
        public_addr: "127.0.0.1:0"
            .parse()
            .expect("loopback address must parse"),
        heartbeat_interval_ms: 20,
        handshake_timeout_ms: 2_000,
        ..BrokerConfig::default()
    }
}

/// Start a broker on a loopback ephemeral port.
pub async fn start_test_broker() -> Broker {
    let mut broker = Broker::new(test_config());
    broker.start().await.expect("test broker failed to start");
    broker
}

/// The broker's actual public address.
#[must_use]
pub fn public_addr(broker: &Broker) -> SocketAddr {
    broker.public_addr().expect("broker is not running")
}

/// Connect a subscriber to the broker and give the subscription time to
/// propagate through the relay into the ingress handshake state.
pub async fn connect_subscriber(broker: &Broker) -> InvalidationSubscriber {
    let subscriber = InvalidationSubscriber::connect(public_addr(broker))
        .await
        .expect("subscriber failed to connect");
    // Propagation is fast but asynchronous; producers gate on it via the
    // readiness handshake, tests that bypass the handshake should not.
    tokio::time::sleep(Duration::from_millis(20)).await;
    subscriber
}
