use nodes_config_manager::MembershipVersion;
use nodes_config_manager::OperationMode;

use crate::commons::config_at;
use crate::commons::encode;
use crate::commons::storage_member;
use crate::commons::Harness;

#[tokio::test]
async fn external_write_reaches_every_worker() {
    let (harness, store) = Harness::in_memory(storage_member()).await;
    assert!(harness.wait_for_all_workers(MembershipVersion::EMPTY_VERSION).await);

    store.set_raw(encode(&config_at(102, 3)));

    assert!(harness.wait_for_all_workers(MembershipVersion::new(102)).await);
    assert_eq!(
        harness.manager.get_config().unwrap().version(),
        MembershipVersion::new(102)
    );
    harness.stop().await;
}

#[tokio::test]
async fn tooling_observer_follows_the_store() {
    let (harness, store) = Harness::in_memory(OperationMode::for_tooling()).await;

    for version in [5, 6, 9] {
        store.set_raw(encode(&config_at(version, 2)));
        assert!(harness.wait_for_all_workers(MembershipVersion::new(version)).await);
    }
    harness.stop().await;
}

#[tokio::test]
async fn workers_never_observe_a_rollback() {
    let (harness, store) = Harness::in_memory(storage_member()).await;

    store.set_raw(encode(&config_at(50, 1)));
    assert!(harness.wait_for_all_workers(MembershipVersion::new(50)).await);

    // Someone writes an older record behind the CAS path
    store.set_raw(encode(&config_at(40, 1)));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    for v in harness.worker_versions().await {
        assert_eq!(v, Some(MembershipVersion::new(50)));
    }
    assert_eq!(
        harness.manager.get_config().unwrap().version(),
        MembershipVersion::new(50)
    );
    harness.stop().await;
}

#[tokio::test]
async fn malformed_record_is_skipped_until_fixed() {
    let (harness, store) = Harness::in_memory(storage_member()).await;
    store.set_raw(encode(&config_at(3, 1)));
    assert!(harness.wait_for_all_workers(MembershipVersion::new(3)).await);

    store.set_raw(bytes::Bytes::from_static(b"this is not a nodes configuration"));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(
        harness.manager.get_config().unwrap().version(),
        MembershipVersion::new(3)
    );

    store.set_raw(encode(&config_at(4, 1)));
    assert!(harness.wait_for_all_workers(MembershipVersion::new(4)).await);
    harness.stop().await;
}
