use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::MembershipVersion;
use crate::NodesConfiguration;

/// Holder of the current snapshot.
///
/// Reads are lock-free loads of the shared pointer. Writes go through
/// [`install`](Self::install), which only ever moves the version forward.
#[derive(Debug, Default)]
pub struct LocalCache {
    held: ArcSwapOption<NodesConfiguration>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held snapshot with `candidate` iff nothing is held yet or
    /// `candidate` is strictly newer. Returns whether it was installed.
    ///
    /// Safe under concurrent callers: the check and the swap happen in one
    /// compare-and-swap loop, so the highest version always wins and
    /// equal-or-older candidates are dropped.
    pub fn install(
        &self,
        candidate: Arc<NodesConfiguration>,
    ) -> bool {
        let candidate_version = candidate.version();
        let previous = self.held.rcu(|held| match held {
            Some(current) if current.version() >= candidate_version => held.clone(),
            _ => Some(candidate.clone()),
        });

        match previous {
            Some(previous) => previous.version() < candidate_version,
            None => true,
        }
    }

    pub fn current(&self) -> Option<Arc<NodesConfiguration>> {
        self.held.load_full()
    }

    pub fn version(&self) -> Option<MembershipVersion> {
        self.held.load().as_ref().map(|c| c.version())
    }
}
