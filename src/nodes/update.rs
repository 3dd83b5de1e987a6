use crate::MembershipVersion;
use crate::NodeIndex;
use crate::NodeServiceDiscovery;
use crate::RoleSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChange {
    AddNode {
        index: NodeIndex,
        attributes: NodeServiceDiscovery,
    },
    RemoveNode {
        index: NodeIndex,
    },
    SetRoles {
        index: NodeIndex,
        roles: RoleSet,
    },
}

/// Declarative delta against a specific configuration version.
///
/// `base_version` is the version the delta assumes the store holds. Applying
/// it to any other version fails, which is what surfaces a concurrent writer
/// as `VERSION_MISMATCH` to the caller of `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodesConfigurationUpdate {
    pub base_version: MembershipVersion,
    pub changes: Vec<NodeChange>,
    pub maintenance: Option<String>,
}

impl NodesConfigurationUpdate {
    pub fn new(base_version: MembershipVersion) -> Self {
        Self {
            base_version,
            changes: Vec::new(),
            maintenance: None,
        }
    }

    /// First write against a store that was never provisioned.
    pub fn initial_provision(nodes: impl IntoIterator<Item = (NodeIndex, NodeServiceDiscovery)>) -> Self {
        Self::add_nodes(MembershipVersion::EMPTY_VERSION, nodes)
    }

    pub fn add_nodes(
        base_version: MembershipVersion,
        nodes: impl IntoIterator<Item = (NodeIndex, NodeServiceDiscovery)>,
    ) -> Self {
        let mut update = Self::new(base_version);
        for (index, attributes) in nodes {
            update = update.add_node(index, attributes);
        }
        update
    }

    pub fn add_node(
        mut self,
        index: NodeIndex,
        attributes: NodeServiceDiscovery,
    ) -> Self {
        self.changes.push(NodeChange::AddNode { index, attributes });
        self
    }

    pub fn remove_node(
        mut self,
        index: NodeIndex,
    ) -> Self {
        self.changes.push(NodeChange::RemoveNode { index });
        self
    }

    pub fn set_roles(
        mut self,
        index: NodeIndex,
        roles: RoleSet,
    ) -> Self {
        self.changes.push(NodeChange::SetRoles { index, roles });
        self
    }

    pub fn with_maintenance(
        mut self,
        maintenance: impl Into<String>,
    ) -> Self {
        self.maintenance = Some(maintenance.into());
        self
    }
}
