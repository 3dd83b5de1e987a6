//! Contract between the manager and the backing configuration store.
//!
//! The store holds a single serialized [`NodesConfiguration`](crate::NodesConfiguration)
//! and only exposes point reads plus a compare-and-swap read-modify-write.
//! Its own durability and replication are its business; the manager relies
//! only on the ordering guarantees described on each method.

mod in_memory_store;
mod sled_store;

pub use in_memory_store::*;
pub use sled_store::*;

#[cfg(test)]
mod in_memory_store_test;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;

use crate::CodecError;
use crate::MembershipVersion;
use crate::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-modify-write function handed to [`NodesConfigurationStore::update_config`].
///
/// Receives the store's current serialized value (`None` if the location was
/// never written) and returns the value to commit, or an error to abort the
/// write. Returning `StoreError::VersionMismatch` makes the store report its
/// current value back to the caller.
pub type UpdateFn = Box<dyn FnOnce(Option<&[u8]>) -> StoreResult<Bytes> + Send>;

/// Extracts the version from a serialized value without a full decode.
pub type ExtractVersionFn = fn(&[u8]) -> Result<MembershipVersion, CodecError>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodesConfigurationStore: Send + Sync + 'static {
    /// Best-effort read. May be served from a cache inside the store.
    ///
    /// Returns `StoreError::NotFound` if the location was never written.
    async fn get_config(&self) -> StoreResult<Bytes>;

    /// Linearizable read: reflects every write that completed before this
    /// call began.
    async fn get_latest_config(&self) -> StoreResult<Bytes>;

    /// Conditional write. The store reads its current value, applies
    /// `update_fn` and commits only if the value did not change in between.
    ///
    /// On success returns the committed value. A lost race yields
    /// `StoreError::VersionMismatch` carrying the store's current value.
    async fn update_config(
        &self,
        update_fn: UpdateFn,
    ) -> StoreResult<Bytes>;

    /// Change notifications, if the backend can push them. The value is an
    /// opaque generation counter that moves on every committed write.
    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

/// Wraps the value the store currently holds into a `VersionMismatch`, so the
/// losing writer learns the winner's record.
pub(crate) fn version_mismatch(current: Option<&[u8]>) -> StoreError {
    StoreError::VersionMismatch {
        current: current.map(Bytes::copy_from_slice),
    }
}

/// Runs `update_fn` against `current` and turns a rejection of type
/// `VersionMismatch` into one carrying the store's value.
pub(crate) fn apply_update_fn(
    update_fn: UpdateFn,
    current: Option<&[u8]>,
) -> StoreResult<Bytes> {
    match update_fn(current) {
        Ok(new_value) => Ok(new_value),
        Err(StoreError::VersionMismatch { .. }) => Err(version_mismatch(current)),
        Err(e) => Err(e),
    }
}

/// Refuses commits that do not move the version forward. The store never
/// holds two different payloads at the same version.
pub(crate) fn ensure_version_advances(
    extract_version: ExtractVersionFn,
    current: Option<&[u8]>,
    new_value: &[u8],
) -> StoreResult<()> {
    let new_version = extract_version(new_value)?;
    let current_version = match current {
        Some(bytes) => extract_version(bytes)?,
        None => MembershipVersion::EMPTY_VERSION,
    };
    if new_version <= current_version {
        return Err(version_mismatch(current));
    }
    Ok(())
}
