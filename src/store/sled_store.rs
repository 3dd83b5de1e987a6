use async_trait::async_trait;
use bytes::Bytes;
use sled::CompareAndSwapError;
use sled::IVec;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::apply_update_fn;
use super::ensure_version_advances;
use super::ExtractVersionFn;
use super::NodesConfigurationStore;
use super::StoreResult;
use super::UpdateFn;
use crate::constants::NODES_CONFIGURATION_TREE;
use crate::NodesConfigurationCodec;
use crate::Result;
use crate::StoreConfig;
use crate::StoreError;

/// Durable store keeping the serialized configuration in a sled tree.
///
/// The conditional write maps onto `Tree::compare_and_swap`, and change
/// notifications come from a `watch_prefix` subscription on the config key.
pub struct SledNodesConfigurationStore {
    db: sled::Db,
    tree: sled::Tree,
    key: String,
    extract_version: ExtractVersionFn,
    notify_tx: watch::Sender<u64>,
    forwarder: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SledNodesConfigurationStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledNodesConfigurationStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SledNodesConfigurationStore {
    /// Opens (or creates) the database at `config.db_path`.
    ///
    /// Must be called from within a Tokio runtime: change notifications are
    /// forwarded by a background task.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = sled::open(&config.db_path).map_err(StoreError::from)?;
        Self::from_db(db, &config.config_key, NodesConfigurationCodec::extract_config_version)
    }

    pub fn from_db(
        db: sled::Db,
        key: &str,
        extract_version: ExtractVersionFn,
    ) -> Result<Self> {
        let tree = db.open_tree(NODES_CONFIGURATION_TREE).map_err(StoreError::from)?;
        let (notify_tx, _) = watch::channel(0);

        let mut subscriber = tree.watch_prefix(key.as_bytes());
        let tx = notify_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(_event) = (&mut subscriber).await {
                trace!("sled change event");
                tx.send_modify(|generation| *generation += 1);
            }
            debug!("sled subscriber closed");
        });

        info!(key, "opened sled nodes configuration store");
        Ok(Self {
            db,
            tree,
            key: key.to_string(),
            extract_version,
            notify_tx,
            forwarder: Some(forwarder),
        })
    }

    fn read(&self) -> StoreResult<Bytes> {
        match self.tree.get(self.key.as_bytes())? {
            Some(ivec) => Ok(Bytes::copy_from_slice(ivec.as_ref())),
            None => Err(StoreError::NotFound),
        }
    }
}

impl Drop for SledNodesConfigurationStore {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

#[async_trait]
impl NodesConfigurationStore for SledNodesConfigurationStore {
    async fn get_config(&self) -> StoreResult<Bytes> {
        self.read()
    }

    /// sled serves reads from a single process-wide page cache, so every
    /// completed write is visible; pending writes are flushed first so the
    /// value read is also the durable one.
    async fn get_latest_config(&self) -> StoreResult<Bytes> {
        self.db.flush_async().await?;
        self.read()
    }

    async fn update_config(
        &self,
        update_fn: UpdateFn,
    ) -> StoreResult<Bytes> {
        let current: Option<IVec> = self.tree.get(self.key.as_bytes())?;
        let current_slice = current.as_ref().map(|v| v.as_ref());

        let new_value = apply_update_fn(update_fn, current_slice)?;
        ensure_version_advances(self.extract_version, current_slice, &new_value)?;

        match self
            .tree
            .compare_and_swap(self.key.as_bytes(), current_slice, Some(new_value.to_vec()))?
        {
            Ok(()) => {
                self.db.flush_async().await?;
                Ok(new_value)
            }
            Err(CompareAndSwapError { current, .. }) => {
                debug!("lost compare-and-swap race on sled store");
                Err(StoreError::VersionMismatch {
                    current: current.map(|v| Bytes::copy_from_slice(v.as_ref())),
                })
            }
        }
    }

    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        Some(self.notify_tx.subscribe())
    }
}
