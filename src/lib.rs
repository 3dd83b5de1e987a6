//! Keeps a versioned cluster nodes configuration in sync with a
//! compare-and-swap store and fans each new snapshot out to every worker in
//! the process.
//!
//! The entry point is [`NodesConfigurationManager`]. Snapshots only ever move
//! forward: whatever path a record arrives on (store polling, push
//! notifications, the result of a local write), it is installed only if its
//! [`MembershipVersion`] is strictly newer than the one held.

mod config;
mod constants;
mod distributor;
mod errors;
mod manager;
pub mod metrics;
mod nodes;
mod store;
mod utils;

pub use config::*;
pub use distributor::*;
pub use errors::*;
pub use manager::*;
pub use nodes::*;
pub use store::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
