use std::collections::BTreeMap;
use std::collections::HashSet;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::MembershipVersion;
use crate::NodeChange;
use crate::NodesConfigurationUpdate;
use crate::RoleSet;
use crate::UpdateError;

pub type NodeIndex = u32;

/// Service discovery attributes of a single cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeServiceDiscovery {
    pub name: String,
    pub address: String,
    pub roles: RoleSet,
    pub location: Option<String>,
}

/// Immutable snapshot of cluster membership.
///
/// Instances are shared behind `Arc` once published; a new version is always
/// produced by replacement ([`with_version`](Self::with_version),
/// [`apply_update`](Self::apply_update)), never by mutating a published value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodesConfiguration {
    version: MembershipVersion,
    nodes: BTreeMap<NodeIndex, NodeServiceDiscovery>,
    last_change_timestamp_ms: u64,
    last_maintenance: Option<String>,
}

impl NodesConfiguration {
    /// The logical content of a store that was never written.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        version: MembershipVersion,
        nodes: BTreeMap<NodeIndex, NodeServiceDiscovery>,
    ) -> Self {
        Self {
            version,
            nodes,
            last_change_timestamp_ms: now_ms(),
            last_maintenance: None,
        }
    }

    pub fn version(&self) -> MembershipVersion {
        self.version
    }

    pub fn nodes(&self) -> &BTreeMap<NodeIndex, NodeServiceDiscovery> {
        &self.nodes
    }

    pub fn node(
        &self,
        index: NodeIndex,
    ) -> Option<&NodeServiceDiscovery> {
        self.nodes.get(&index)
    }

    pub fn last_change_timestamp_ms(&self) -> u64 {
        self.last_change_timestamp_ms
    }

    pub fn last_maintenance(&self) -> Option<&str> {
        self.last_maintenance.as_deref()
    }

    /// Copy of this configuration stamped with another version.
    pub fn with_version(
        &self,
        version: MembershipVersion,
    ) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    /// Structural validation of the payload/version pairing.
    pub fn validate(&self) -> bool {
        self.validation_error().is_none()
    }

    pub(crate) fn validation_error(&self) -> Option<String> {
        if self.version.is_empty() && !self.nodes.is_empty() {
            return Some(format!(
                "configuration at EMPTY_VERSION carries {} nodes",
                self.nodes.len()
            ));
        }

        let mut names = HashSet::new();
        for (idx, node) in &self.nodes {
            if node.name.is_empty() {
                return Some(format!("node {idx} has an empty name"));
            }
            if node.address.is_empty() {
                return Some(format!("node {idx} has an empty address"));
            }
            if node.roles.is_empty() {
                return Some(format!("node {idx} has no roles"));
            }
            if !names.insert(node.name.as_str()) {
                return Some(format!("duplicate node name {}", node.name));
            }
        }
        None
    }

    /// Applies a declarative delta and returns the resulting configuration at
    /// `base_version + 1`.
    ///
    /// Fails if this configuration is not the one the delta was computed
    /// against, or if the result does not validate.
    pub fn apply_update(
        &self,
        update: &NodesConfigurationUpdate,
    ) -> Result<NodesConfiguration, UpdateError> {
        if self.version != update.base_version {
            return Err(UpdateError::VersionMismatch {
                expected: update.base_version,
                actual: self.version,
            });
        }

        let mut nodes = self.nodes.clone();
        for change in &update.changes {
            match change {
                NodeChange::AddNode { index, attributes } => {
                    if nodes.contains_key(index) {
                        return Err(UpdateError::NodeExists(*index));
                    }
                    nodes.insert(*index, attributes.clone());
                }
                NodeChange::RemoveNode { index } => {
                    if nodes.remove(index).is_none() {
                        return Err(UpdateError::NodeNotFound(*index));
                    }
                }
                NodeChange::SetRoles { index, roles } => match nodes.get_mut(index) {
                    Some(node) => node.roles = *roles,
                    None => return Err(UpdateError::NodeNotFound(*index)),
                },
            }
        }

        let next = NodesConfiguration {
            version: self.version.next(),
            nodes,
            last_change_timestamp_ms: now_ms(),
            last_maintenance: update
                .maintenance
                .clone()
                .or_else(|| self.last_maintenance.clone()),
        };
        if let Some(reason) = next.validation_error() {
            return Err(UpdateError::Invalid(reason));
        }

        debug!(
            from = %self.version,
            to = %next.version,
            changes = update.changes.len(),
            "applied nodes configuration update"
        );
        Ok(next)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
