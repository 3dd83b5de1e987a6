use std::sync::Arc;

use nodes_config_manager::MembershipVersion;
use nodes_config_manager::NodesConfigurationCodec;
use nodes_config_manager::NodesConfigurationStore;
use nodes_config_manager::NodesConfigurationUpdate;
use nodes_config_manager::OperationMode;
use nodes_config_manager::SledNodesConfigurationStore;
use nodes_config_manager::Status;
use nodes_config_manager::StoreConfig;

use crate::commons::config_at;
use crate::commons::node;
use crate::commons::storage_member;
use crate::commons::Harness;

const KEY: &str = "/cluster/nodes_configuration";

fn shared_store(db: &sled::Db) -> Arc<dyn NodesConfigurationStore> {
    Arc::new(
        SledNodesConfigurationStore::from_db(db.clone(), KEY, NodesConfigurationCodec::extract_config_version)
            .expect("store opens"),
    )
}

#[tokio::test]
async fn proposer_write_reaches_an_observer_sharing_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("ncm")).unwrap();

    let proposer = Harness::start(storage_member(), shared_store(&db)).await;
    let observer = Harness::start(OperationMode::for_tooling(), shared_store(&db)).await;
    proposer.manager.upgrade_to_proposer();

    let (status, _) = proposer
        .update(NodesConfigurationUpdate::initial_provision(vec![(1, node(1)), (2, node(2))]))
        .await;
    assert_eq!(status, Status::Ok);

    let first = MembershipVersion::EMPTY_VERSION.next();
    assert!(proposer.wait_for_all_workers(first).await);
    assert!(observer.wait_for_all_workers(first).await);
    assert_eq!(observer.manager.get_config().unwrap().nodes().len(), 2);

    let (status, record) = proposer.overwrite(config_at(1, 1)).await;
    assert_eq!(status, Status::VersionMismatch);
    assert_eq!(record.unwrap().nodes().len(), 2);

    proposer.stop().await;
    observer.stop().await;
}

#[tokio::test]
async fn manager_starts_from_the_durable_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        db_path: dir.path().join("ncm"),
        ..StoreConfig::default()
    };
    let store = Arc::new(SledNodesConfigurationStore::open(&config).unwrap());

    store
        .update_config(Box::new(|_: Option<&[u8]>| {
            Ok(NodesConfigurationCodec::new(true).serialize(&config_at(77, 3))?)
        }))
        .await
        .unwrap();

    let harness = Harness::start(storage_member(), store).await;
    assert_eq!(
        harness.manager.get_config().unwrap().version(),
        MembershipVersion::new(77)
    );
    assert!(harness.wait_for_all_workers(MembershipVersion::new(77)).await);
    harness.stop().await;
}
