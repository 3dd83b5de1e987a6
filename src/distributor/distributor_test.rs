use std::sync::Arc;
use std::time::Duration;

use tracing_test::traced_test;

use super::*;
use crate::test_utils::make_dummy_nodes_configuration;
use crate::DistributorConfig;
use crate::Error;
use crate::MembershipVersion;

fn at(version: u64) -> Arc<NodesConfiguration> {
    Arc::new(make_dummy_nodes_configuration(MembershipVersion::new(version)))
}

fn acking_subscriber(times: usize) -> MockConfigSubscriber {
    let mut subscriber = MockConfigSubscriber::new();
    subscriber
        .expect_set_nodes_configuration()
        .times(times)
        .returning(|_| Ok(()));
    subscriber
}

#[tokio::test]
async fn broadcast_reaches_every_subscriber() {
    let distributor = Distributor::default();
    for _ in 0..3 {
        distributor.register(Arc::new(acking_subscriber(1)));
    }
    assert_eq!(distributor.subscriber_count(), 3);

    let report = distributor.broadcast(at(102)).await.unwrap();

    assert_eq!(
        report,
        DistributionReport {
            version: MembershipVersion::new(102),
            delivered: 3,
            failed: vec![],
        }
    );
    assert_eq!(distributor.distributed_version(), MembershipVersion::new(102));
}

#[tokio::test]
#[traced_test]
async fn failing_subscriber_does_not_block_the_others() {
    let distributor = Distributor::default();
    distributor.register(Arc::new(acking_subscriber(1)));

    let mut broken = MockConfigSubscriber::new();
    broken
        .expect_set_nodes_configuration()
        .times(1)
        .returning(|_| Err(Error::WorkerUnreachable(7)));
    let broken_id = distributor.register(Arc::new(broken));

    let report = distributor.broadcast(at(5)).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, vec![broken_id]);
    assert!(logs_contain("delivery failed"));
}

/// Never acknowledges.
struct Stuck;

#[async_trait]
impl ConfigSubscriber for Stuck {
    async fn set_nodes_configuration(
        &self,
        _config: Arc<NodesConfiguration>,
    ) -> Result<()> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_delivery_times_out() {
    let distributor = Distributor::new(&DistributorConfig {
        ack_timeout_ms: 100,
        ..DistributorConfig::default()
    });
    distributor.register(Arc::new(acking_subscriber(1)));
    let stuck_id = distributor.register(Arc::new(Stuck));

    let report = distributor.broadcast(at(3)).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, vec![stuck_id]);
    // a completed broadcast still counts as distributed
    assert_eq!(distributor.distributed_version(), MembershipVersion::new(3));
}

#[tokio::test]
async fn unregistered_subscribers_are_skipped() {
    let distributor = Distributor::default();
    let mut gone = MockConfigSubscriber::new();
    gone.expect_set_nodes_configuration().never();
    let id = distributor.register(Arc::new(gone));

    assert!(distributor.unregister(id));
    assert!(!distributor.unregister(id));

    let report = distributor.broadcast(at(4)).await.unwrap();
    assert_eq!(report.delivered, 0);
}

#[tokio::test]
async fn distributed_version_never_goes_backwards() {
    let distributor = Distributor::default();
    distributor.broadcast(at(10)).await.unwrap();
    distributor.broadcast(at(8)).await.unwrap();

    assert_eq!(distributor.distributed_version(), MembershipVersion::new(10));
}

#[tokio::test]
async fn wait_until_distributed_resolves_after_broadcast() {
    let distributor = Arc::new(Distributor::default());
    distributor.register(Arc::new(acking_subscriber(1)));

    let waiter = {
        let distributor = distributor.clone();
        tokio::spawn(async move { distributor.wait_until_distributed(MembershipVersion::new(6)).await })
    };
    distributor.broadcast(at(6));

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should resolve")
        .unwrap();
}

#[tokio::test]
async fn late_subscriber_receives_the_last_broadcast() {
    let distributor = Distributor::default();
    distributor.broadcast(at(98)).await.unwrap();
    distributor.broadcast(at(102)).await.unwrap();

    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut late = MockConfigSubscriber::new();
    late.expect_set_nodes_configuration().times(1).returning(move |c| {
        let _ = seen_tx.send(c.version());
        Ok(())
    });
    distributor.register(Arc::new(late));

    let seen = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
        .await
        .expect("late subscriber should be caught up")
        .unwrap();
    assert_eq!(seen, MembershipVersion::new(102));
}

#[tokio::test]
async fn subscriber_registered_before_any_broadcast_gets_nothing() {
    let distributor = Distributor::default();
    let mut early = MockConfigSubscriber::new();
    early.expect_set_nodes_configuration().never();
    distributor.register(Arc::new(early));

    tokio::time::sleep(Duration::from_millis(20)).await;
}
