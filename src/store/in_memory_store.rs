use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;

use super::apply_update_fn;
use super::ensure_version_advances;
use super::version_mismatch;
use super::ExtractVersionFn;
use super::NodesConfigurationStore;
use super::StoreResult;
use super::UpdateFn;
use crate::NodesConfigurationCodec;
use crate::StoreError;

#[derive(Debug, Default)]
struct Slot {
    value: Option<Bytes>,
    /// Moves on every write; the CAS token.
    generation: u64,
}

/// In-process store holding the serialized configuration in memory.
///
/// Reads are trivially linearizable. `update_config` reads the value, runs
/// the update function outside the lock and commits only if no other write
/// landed in between, which reproduces the race a remote CAS store exhibits.
pub struct InMemoryNodesConfigurationStore {
    slot: Mutex<Slot>,
    extract_version: ExtractVersionFn,
    unavailable: AtomicBool,
    notify_tx: watch::Sender<u64>,
}

impl std::fmt::Debug for InMemoryNodesConfigurationStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InMemoryNodesConfigurationStore")
            .field("slot", &self.slot)
            .field("unavailable", &self.unavailable)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryNodesConfigurationStore {
    fn default() -> Self {
        Self::new(NodesConfigurationCodec::extract_config_version)
    }
}

impl InMemoryNodesConfigurationStore {
    pub fn new(extract_version: ExtractVersionFn) -> Self {
        let (notify_tx, _) = watch::channel(0);
        Self {
            slot: Mutex::new(Slot::default()),
            extract_version,
            unavailable: AtomicBool::new(false),
            notify_tx,
        }
    }

    /// Store pre-populated with `value`.
    pub fn with_value(
        extract_version: ExtractVersionFn,
        value: Bytes,
    ) -> Self {
        let store = Self::new(extract_version);
        store.set_raw(value);
        store
    }

    /// Unconditional write, bypassing the CAS path. Simulates another
    /// process writing to the store.
    pub fn set_raw(
        &self,
        value: Bytes,
    ) {
        let generation = {
            let mut slot = self.slot.lock();
            slot.value = Some(value);
            slot.generation += 1;
            slot.generation
        };
        debug!(generation, "raw write to in-memory store");
        self.notify_tx.send_replace(generation);
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable` until
    /// reset.
    pub fn set_unavailable(
        &self,
        unavailable: bool,
    ) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn read(&self) -> StoreResult<Bytes> {
        self.check_available()?;
        self.slot.lock().value.clone().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl NodesConfigurationStore for InMemoryNodesConfigurationStore {
    async fn get_config(&self) -> StoreResult<Bytes> {
        self.read()
    }

    async fn get_latest_config(&self) -> StoreResult<Bytes> {
        self.read()
    }

    async fn update_config(
        &self,
        update_fn: UpdateFn,
    ) -> StoreResult<Bytes> {
        self.check_available()?;

        let (base_value, base_generation) = {
            let slot = self.slot.lock();
            (slot.value.clone(), slot.generation)
        };

        let new_value = apply_update_fn(update_fn, base_value.as_deref())?;
        ensure_version_advances(self.extract_version, base_value.as_deref(), &new_value)?;

        let generation = {
            let mut slot = self.slot.lock();
            if slot.generation != base_generation {
                trace!(
                    base_generation,
                    current_generation = slot.generation,
                    "lost compare-and-swap race"
                );
                return Err(version_mismatch(slot.value.as_deref()));
            }
            slot.value = Some(new_value.clone());
            slot.generation += 1;
            slot.generation
        };

        self.notify_tx.send_replace(generation);
        Ok(new_value)
    }

    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        Some(self.notify_tx.subscribe())
    }
}
