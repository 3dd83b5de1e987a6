use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::test_utils::serialize;
use crate::MembershipVersion;
use crate::NodesConfigurationCodec;
use crate::StoreError;

fn bump_to(version: u64) -> UpdateFn {
    Box::new(move |current: Option<&[u8]>| {
        let config = NodesConfigurationCodec::deserialize(current.unwrap_or_default())?;
        Ok(serialize(&config.with_version(MembershipVersion::new(version))))
    })
}

#[tokio::test]
async fn empty_store_reports_not_found() {
    let store = InMemoryNodesConfigurationStore::default();
    assert!(matches!(store.get_config().await, Err(StoreError::NotFound)));
    assert!(matches!(store.get_latest_config().await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn update_on_empty_store_sees_none() {
    let store = InMemoryNodesConfigurationStore::default();
    let written = store
        .update_config(Box::new(|current: Option<&[u8]>| {
            assert!(current.is_none());
            Ok(serialize(&crate::test_utils::make_dummy_nodes_configuration(
                MembershipVersion::new(1),
            )))
        }))
        .await
        .unwrap();

    assert_eq!(store.get_config().await.unwrap(), written);
}

#[tokio::test]
async fn rejected_update_returns_current_value() {
    let current = serialize(&crate::test_utils::make_dummy_nodes_configuration(MembershipVersion::new(102)));
    let store = InMemoryNodesConfigurationStore::with_value(NodesConfigurationCodec::extract_config_version, current.clone());

    let result = store
        .update_config(Box::new(|_: Option<&[u8]>| Err(StoreError::VersionMismatch { current: None })))
        .await;

    match result {
        Err(StoreError::VersionMismatch { current: Some(v) }) => assert_eq!(v, current),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn non_advancing_write_is_refused() {
    let current = serialize(&crate::test_utils::make_dummy_nodes_configuration(MembershipVersion::new(102)));
    let store = InMemoryNodesConfigurationStore::with_value(NodesConfigurationCodec::extract_config_version, current);

    let result = store.update_config(bump_to(102)).await;
    assert!(matches!(result, Err(StoreError::VersionMismatch { .. })));

    let result = store.update_config(bump_to(98)).await;
    assert!(matches!(result, Err(StoreError::VersionMismatch { .. })));

    assert!(store.update_config(bump_to(103)).await.is_ok());
}

#[tokio::test]
async fn concurrent_writer_wins_the_race() {
    let store = Arc::new(InMemoryNodesConfigurationStore::default());
    let racer = store.clone();

    // The update function runs between read and commit; an external write at
    // that point must make the commit fail.
    let result = store
        .update_config(Box::new(move |_: Option<&[u8]>| {
            racer.set_raw(serialize(&crate::test_utils::make_dummy_nodes_configuration(
                MembershipVersion::new(50),
            )));
            Ok(serialize(&crate::test_utils::make_dummy_nodes_configuration(
                MembershipVersion::new(1),
            )))
        }))
        .await;

    match result {
        Err(StoreError::VersionMismatch { current: Some(v) }) => {
            assert_eq!(
                NodesConfigurationCodec::extract_config_version(&v).unwrap(),
                MembershipVersion::new(50)
            );
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn writes_notify_subscribers() {
    let store = InMemoryNodesConfigurationStore::default();
    let mut rx = store.subscribe().unwrap();
    let before = *rx.borrow_and_update();

    store.update_config(bump_to(1)).await.unwrap();

    rx.changed().await.unwrap();
    assert!(*rx.borrow() > before);
}

#[tokio::test]
async fn unavailable_store_fails_every_call() {
    let store = InMemoryNodesConfigurationStore::with_value(
        NodesConfigurationCodec::extract_config_version,
        Bytes::new(),
    );
    store.set_unavailable(true);

    assert!(matches!(store.get_config().await, Err(StoreError::Unavailable(_))));
    assert!(matches!(store.update_config(bump_to(1)).await, Err(StoreError::Unavailable(_))));

    store.set_unavailable(false);
    assert!(store.get_config().await.is_ok());
}
