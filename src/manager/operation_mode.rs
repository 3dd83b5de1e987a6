use crate::NodeRole;
use crate::RoleSet;

/// How the owning process participates in the cluster. Fixed for the
/// lifetime of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Passive observer; a possibly stale initial read is acceptable.
    ForTooling,
    /// Active cluster member running the given roles.
    ForNodeRoles(RoleSet),
}

impl OperationMode {
    pub fn for_tooling() -> Self {
        OperationMode::ForTooling
    }

    pub fn for_node_roles(roles: RoleSet) -> Self {
        OperationMode::ForNodeRoles(roles)
    }

    pub fn is_tooling(&self) -> bool {
        matches!(self, OperationMode::ForTooling)
    }

    pub fn has_role(
        &self,
        role: NodeRole,
    ) -> bool {
        match self {
            OperationMode::ForTooling => false,
            OperationMode::ForNodeRoles(roles) => roles.contains(role),
        }
    }

    /// Storage members must never start on a stale topology.
    pub fn requires_linearizable_startup(&self) -> bool {
        self.has_role(NodeRole::Storage)
    }
}
