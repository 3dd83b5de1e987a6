//! Shared fixtures for unit tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::MembershipVersion;
use crate::NodeIndex;
use crate::NodeRole;
use crate::NodeServiceDiscovery;
use crate::NodesConfiguration;
use crate::NodesConfigurationCodec;
use crate::RoleSet;

pub(crate) fn make_node(
    idx: NodeIndex,
    roles: RoleSet,
) -> NodeServiceDiscovery {
    NodeServiceDiscovery {
        name: format!("node-{idx}"),
        address: format!("127.0.0.1:{}", 4440 + idx),
        roles,
        location: Some("region.dc.cluster".to_string()),
    }
}

/// Single storage+sequencer node at `version`. At `EMPTY_VERSION` the result
/// is the empty configuration.
pub(crate) fn make_dummy_nodes_configuration(version: MembershipVersion) -> NodesConfiguration {
    make_provisioned_configuration(version, 1)
}

pub(crate) fn make_provisioned_configuration(
    version: MembershipVersion,
    num_nodes: u32,
) -> NodesConfiguration {
    if version.is_empty() {
        return NodesConfiguration::empty();
    }
    let roles = RoleSet::empty().with(NodeRole::Storage).with(NodeRole::Sequencer);
    let nodes: BTreeMap<_, _> = (1..=num_nodes).map(|idx| (idx, make_node(idx, roles))).collect();
    NodesConfiguration::new(version, nodes)
}

pub(crate) fn serialize(config: &NodesConfiguration) -> Bytes {
    NodesConfigurationCodec::default()
        .serialize(config)
        .expect("fixture serializes")
}

/// Polls `check` until it returns true or `within` elapses.
pub(crate) async fn wait_until<F, Fut>(
    within: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
