use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Strictly ordered version of a nodes configuration.
///
/// A higher version is always newer. The store never issues two different
/// payloads at the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MembershipVersion(u64);

impl MembershipVersion {
    /// No configuration has ever been provisioned.
    pub const EMPTY_VERSION: MembershipVersion = MembershipVersion(0);

    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    pub const fn val(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY_VERSION
    }
}

impl From<u64> for MembershipVersion {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for MembershipVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
