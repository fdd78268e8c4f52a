//! Many concurrent producers, one subscriber.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use inval_wire::{Frame, ObjectId};

use crate::support::{connect_subscriber, start_test_broker};

const PRODUCERS: usize = 100;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_all_delivered() {
    let mut broker = start_test_broker().await;
    let mut subscriber = connect_subscriber(&broker).await;
    let submitter = broker.submitter().expect("running broker");

    let mut expected = HashSet::with_capacity(PRODUCERS);
    let mut producers = Vec::with_capacity(PRODUCERS);
    for worker in 0..PRODUCERS {
        let id = ObjectId::from(Uuid::new_v4());
        expected.insert(id);

        let submitter = submitter.clone();
        let hex = id.to_hex32();
        producers.push(tokio::spawn(async move {
            submitter
                .submit(&hex, worker as f64)
                .await
                .expect("submit failed");
        }));
    }
    for producer in producers {
        producer.await.expect("producer panicked");
    }

    // Order across producers is unspecified; collect until every
    // distinct identifier has shown up.
    let mut seen = HashSet::with_capacity(PRODUCERS);
    while seen.len() < PRODUCERS {
        let frame = timeout(Duration::from_secs(10), subscriber.recv())
            .await
            .expect("delivery stalled")
            .expect("read failed")
            .expect("feed closed early");
        if let Frame::CacheFlush(flush) = frame {
            seen.insert(flush.object_id);
        }
    }

    assert_eq!(seen, expected);
    broker.stop().await;
}
