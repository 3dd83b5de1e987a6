use std::fmt;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeRole {
    Sequencer = 0,
    Storage = 1,
}

impl NodeRole {
    pub const ALL: [NodeRole; 2] = [NodeRole::Sequencer, NodeRole::Storage];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            NodeRole::Sequencer => f.write_str("sequencer"),
            NodeRole::Storage => f.write_str("storage"),
        }
    }
}

/// Compact set of [`NodeRole`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(
        mut self,
        role: NodeRole,
    ) -> Self {
        self.set(role);
        self
    }

    pub fn set(
        &mut self,
        role: NodeRole,
    ) {
        self.0 |= role.bit();
    }

    pub fn unset(
        &mut self,
        role: NodeRole,
    ) {
        self.0 &= !role.bit();
    }

    pub fn contains(
        &self,
        role: NodeRole,
    ) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeRole> + '_ {
        NodeRole::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<NodeRole> for RoleSet {
    fn from_iter<I: IntoIterator<Item = NodeRole>>(iter: I) -> Self {
        iter.into_iter().fold(RoleSet::empty(), RoleSet::with)
    }
}
