use nodes_config_manager::MembershipVersion;
use nodes_config_manager::NodesConfigurationUpdate;
use nodes_config_manager::Status;

use crate::commons::config_at;
use crate::commons::encode;
use crate::commons::node;
use crate::commons::storage_member;
use crate::commons::Harness;

#[tokio::test]
async fn declarative_updates_build_on_the_store_version() {
    let (harness, store) = Harness::in_memory(storage_member()).await;
    harness.manager.upgrade_to_proposer();

    // Provision an empty cluster
    let (status, record) = harness
        .update(NodesConfigurationUpdate::initial_provision(vec![(1, node(1))]))
        .await;
    assert_eq!(status, Status::Ok);
    let first = MembershipVersion::EMPTY_VERSION.next();
    assert_eq!(record.unwrap().version(), first);
    assert_eq!(harness.manager.get_config().unwrap().version(), first);
    assert!(harness.wait_for_all_workers(first).await);

    // Another process moves the store forward
    store.set_raw(encode(&config_at(102, 2)));
    assert!(harness.wait_for_all_workers(MembershipVersion::new(102)).await);

    let (status, record) = harness
        .update(NodesConfigurationUpdate::add_nodes(
            MembershipVersion::new(102),
            vec![(3, node(3))],
        ))
        .await;
    assert_eq!(status, Status::Ok);
    let record = record.unwrap();
    assert_eq!(record.version(), MembershipVersion::new(103));
    assert_eq!(record.nodes().len(), 3);
    assert!(harness.wait_for_all_workers(MembershipVersion::new(103)).await);
    harness.stop().await;
}

#[tokio::test]
async fn overwrite_moves_forward_and_refuses_rollback() {
    let (harness, store) = Harness::in_memory(storage_member()).await;
    harness.manager.upgrade_to_proposer();

    let (status, _) = harness.overwrite(config_at(102, 2)).await;
    assert_eq!(status, Status::Ok);
    assert!(harness.wait_for_all_workers(MembershipVersion::new(102)).await);

    store.set_raw(encode(&config_at(103, 2)));
    assert!(harness.wait_for_all_workers(MembershipVersion::new(103)).await);

    let (status, record) = harness.overwrite(config_at(98, 2)).await;
    assert_eq!(status, Status::VersionMismatch);
    assert_eq!(record.unwrap().version(), MembershipVersion::new(103));
    assert_eq!(
        harness.manager.get_config().unwrap().version(),
        MembershipVersion::new(103)
    );

    let (status, record) = harness.overwrite(config_at(10101, 2)).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(record.unwrap().version(), MembershipVersion::new(10101));
    assert!(harness.wait_for_all_workers(MembershipVersion::new(10101)).await);
    harness.stop().await;
}

#[tokio::test]
async fn racing_proposers_agree_on_one_winner() {
    let (first, store) = Harness::in_memory(storage_member()).await;
    let second = Harness::start(storage_member(), store.clone()).await;
    first.manager.upgrade_to_proposer();
    second.manager.upgrade_to_proposer();

    let (a, b) = tokio::join!(
        first.update(NodesConfigurationUpdate::initial_provision(vec![(1, node(1))])),
        second.update(NodesConfigurationUpdate::initial_provision(vec![(2, node(2))])),
    );

    let mut statuses = vec![a.0, b.0];
    statuses.sort_by_key(|s| s.as_str());
    assert_eq!(statuses, vec![Status::Ok, Status::VersionMismatch]);

    // The loser learns the winner's record
    let winner = MembershipVersion::EMPTY_VERSION.next();
    assert_eq!(a.1.unwrap().version(), winner);
    assert_eq!(b.1.unwrap().version(), winner);
    assert!(first.wait_for_all_workers(winner).await);
    assert!(second.wait_for_all_workers(winner).await);

    first.stop().await;
    second.stop().await;
}
