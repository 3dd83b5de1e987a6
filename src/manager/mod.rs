//! The nodes configuration manager: a process-wide authority that keeps a
//! local snapshot in sync with the store and arbitrates writes to it.
//!
//! ```text
//!   ChangeWatcher ──┐
//!                   ├──> reconcile() ──> LocalCache::install() ──> Distributor::broadcast()
//!   update/overwrite┘         (single version-ordering chokepoint)
//! ```

mod local_cache;
mod nodes_configuration_manager;
mod operation_mode;
mod watcher;

pub use local_cache::*;
pub use nodes_configuration_manager::*;
pub use operation_mode::*;
pub use watcher::*;
