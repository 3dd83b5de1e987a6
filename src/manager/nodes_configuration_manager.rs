use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use autometrics::autometrics;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ChangeWatcher;
use super::LocalCache;
use super::OperationMode;
use super::Reconcile;
use crate::metrics::version_gauge_value;
use crate::metrics::CURRENT_VERSION;
use crate::metrics::INSTALLED_CONFIGS;
use crate::metrics::STALE_CANDIDATES;
use crate::metrics::WRITE_OUTCOMES;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::Distributor;
use crate::ManagerConfig;
use crate::ManagerError;
use crate::MembershipVersion;
use crate::NodesConfiguration;
use crate::NodesConfigurationCodec;
use crate::NodesConfigurationStore;
use crate::NodesConfigurationUpdate;
use crate::Result;
use crate::Status;
use crate::StoreError;
use crate::UpdateError;
use crate::UpdateFn;
use crate::API_SLO;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    ShutDown,
}

/// External collaborators of a manager.
pub struct Dependencies {
    pub store: Arc<dyn NodesConfigurationStore>,
    pub distributor: Arc<Distributor>,
}

impl Dependencies {
    pub fn new(
        store: Arc<dyn NodesConfigurationStore>,
        distributor: Arc<Distributor>,
    ) -> Self {
        Self { store, distributor }
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteOp {
    Update,
    Overwrite,
}

impl WriteOp {
    fn as_str(&self) -> &'static str {
        match self {
            WriteOp::Update => "update",
            WriteOp::Overwrite => "overwrite",
        }
    }
}

/// Process-wide authority over the nodes configuration.
///
/// Readers call [`get_config`](Self::get_config) from anywhere; it never
/// blocks and never goes backwards. Once upgraded to proposer, the instance
/// may also originate writes through [`update`](Self::update) and
/// [`overwrite`](Self::overwrite). Every record that reaches the manager,
/// whether discovered by the watcher or returned by a write, goes through
/// [`reconcile`](Reconcile::reconcile).
pub struct NodesConfigurationManager {
    mode: OperationMode,
    config: ManagerConfig,
    codec: NodesConfigurationCodec,
    store: Arc<dyn NodesConfigurationStore>,
    distributor: Arc<Distributor>,
    cache: LocalCache,
    state: Mutex<ManagerState>,
    is_proposer: AtomicBool,
    /// Version of the snapshot held in `cache`, for waiters; `None` until
    /// the first install
    version_tx: watch::Sender<Option<MembershipVersion>>,
    shutdown: CancellationToken,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for NodesConfigurationManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NodesConfigurationManager")
            .field("mode", &self.mode)
            .field("state", &*self.state.lock())
            .field("is_proposer", &self.is_proposer())
            .field("version", &self.cache.version())
            .finish()
    }
}

impl NodesConfigurationManager {
    pub fn create(
        mode: OperationMode,
        config: ManagerConfig,
        deps: Dependencies,
    ) -> Arc<Self> {
        let (version_tx, _) = watch::channel(None);
        info!(?mode, "creating nodes configuration manager");
        Arc::new(Self {
            mode,
            codec: NodesConfigurationCodec::new(config.compress_records),
            config,
            store: deps.store,
            distributor: deps.distributor,
            cache: LocalCache::new(),
            state: Mutex::new(ManagerState::Uninitialized),
            is_proposer: AtomicBool::new(false),
            version_tx,
            shutdown: CancellationToken::new(),
            watcher: Mutex::new(None),
        })
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock()
    }

    pub fn is_proposer(&self) -> bool {
        self.is_proposer.load(Ordering::Acquire)
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    /// Fetches the first snapshot, installs and distributes it, then starts
    /// the change watcher. Resolves once the first snapshot is installed.
    ///
    /// Storage members fetch with a linearizable read; everyone else uses the
    /// regular read. An empty store counts as a snapshot at `EMPTY_VERSION`.
    /// The fetch is retried per `ManagerConfig::startup`; if retries run out
    /// the manager returns to `Uninitialized`.
    ///
    /// Calling `init` more than once is a programming error.
    #[autometrics(objective = API_SLO)]
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                ManagerState::Uninitialized => *state = ManagerState::Initializing,
                ManagerState::ShutDown => return Err(ManagerError::ShutDown.into()),
                _ => {
                    error!("init() called on an already initialized manager");
                    return Err(ManagerError::AlreadyInitialized.into());
                }
            }
        }

        let linearizable = self.mode.requires_linearizable_startup();
        info!(linearizable, "fetching initial nodes configuration");

        let store = self.store.clone();
        let fetched = task_with_timeout_and_exponential_backoff(
            || fetch_initial(store.clone(), linearizable),
            self.config.startup,
        )
        .await;

        let initial = match fetched {
            Ok(initial) => initial,
            Err(e) => {
                error!("initial nodes configuration fetch failed: {}", e);
                let mut state = self.state.lock();
                if *state == ManagerState::Initializing {
                    *state = ManagerState::Uninitialized;
                }
                return Err(e);
            }
        };

        {
            let mut state = self.state.lock();
            if *state == ManagerState::ShutDown {
                return Err(ManagerError::ShutDown.into());
            }
            self.reconcile(initial);
            *state = ManagerState::Ready;
        }
        info!(version = ?self.cache.version(), "nodes configuration manager ready");

        self.start_watcher();
        Ok(())
    }

    fn start_watcher(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let watcher = ChangeWatcher::new(self.store.clone(), weak, self.config.watcher.clone());
        let handle = watcher.spawn(self.shutdown.child_token());
        *self.watcher.lock() = Some(handle);
    }

    /// Latest installed snapshot; `None` until `init()` installed one.
    pub fn get_config(&self) -> Option<Arc<NodesConfiguration>> {
        self.cache.current()
    }

    /// Resolves once the local snapshot is at `version` or newer. Before
    /// anything is installed this waits, even for `EMPTY_VERSION`.
    pub async fn wait_for_version(
        &self,
        version: MembershipVersion,
    ) -> Result<Arc<NodesConfiguration>> {
        let mut rx = self.version_tx.subscribe();
        rx.wait_for(|current| matches!(current, Some(installed) if *installed >= version))
            .await
            .map_err(|_| ManagerError::ShutDown)?;
        self.cache.current().ok_or_else(|| ManagerError::NotInitialized.into())
    }

    /// Grants this instance the right to originate writes. One-way.
    pub fn upgrade_to_proposer(&self) {
        if self.is_proposer.swap(true, Ordering::AcqRel) {
            warn!("upgrade_to_proposer() called more than once");
        } else {
            info!("nodes configuration manager upgraded to proposer");
        }
    }

    /// Applies `update` to the store's current configuration under CAS.
    ///
    /// The delta is evaluated against whatever the store holds at write
    /// time; if that is not `update.base_version` the write is refused and
    /// `callback` gets `VERSION_MISMATCH` with the store's record. On success
    /// the new record is installed locally before `callback(OK, record)`
    /// runs. Store errors are reported as-is; nothing is retried.
    ///
    /// Returns immediately; `callback` runs exactly once on a runtime task.
    /// Fails without invoking `callback` if this instance is not a proposer
    /// or `init()` has not completed.
    #[autometrics(objective = API_SLO)]
    pub fn update<F>(
        self: &Arc<Self>,
        update: NodesConfigurationUpdate,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Status, Option<Arc<NodesConfiguration>>) + Send + 'static,
    {
        self.check_writable()?;

        let codec = self.codec;
        let update_fn: UpdateFn = Box::new(move |current: Option<&[u8]>| {
            let current = match current {
                Some(bytes) => NodesConfigurationCodec::deserialize(bytes)?,
                None => NodesConfiguration::empty(),
            };
            let next = current.apply_update(&update)?;
            Ok(codec.serialize(&next)?)
        });

        self.submit(WriteOp::Update, update_fn, callback);
        Ok(())
    }

    /// Replaces the stored configuration with `proposed` iff it is strictly
    /// newer than what the store holds. Any forward jump is accepted; ties
    /// and rollbacks fail with `VERSION_MISMATCH` and the store's record.
    ///
    /// Same completion contract as [`update`](Self::update).
    #[autometrics(objective = API_SLO)]
    pub fn overwrite<F>(
        self: &Arc<Self>,
        proposed: Arc<NodesConfiguration>,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Status, Option<Arc<NodesConfiguration>>) + Send + 'static,
    {
        self.check_writable()?;
        if let Some(reason) = proposed.validation_error() {
            return Err(UpdateError::Invalid(reason).into());
        }

        let serialized = self.codec.serialize(&proposed)?;
        let proposed_version = proposed.version();
        let update_fn: UpdateFn = Box::new(move |current: Option<&[u8]>| {
            let current_version = match current {
                Some(bytes) => NodesConfigurationCodec::extract_config_version(bytes)?,
                None => MembershipVersion::EMPTY_VERSION,
            };
            if proposed_version <= current_version {
                debug!(
                    proposed = %proposed_version,
                    current = %current_version,
                    "refusing to overwrite with a non-increasing version"
                );
                return Err(StoreError::VersionMismatch { current: None });
            }
            Ok(serialized)
        });

        self.submit(WriteOp::Overwrite, update_fn, callback);
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        match self.state() {
            ManagerState::Ready => {}
            ManagerState::ShutDown => return Err(ManagerError::ShutDown.into()),
            ManagerState::Uninitialized | ManagerState::Initializing => {
                error!("write attempted before init() completed");
                return Err(ManagerError::NotInitialized.into());
            }
        }
        if !self.is_proposer() {
            error!("write attempted without upgrade_to_proposer()");
            return Err(ManagerError::NotProposer.into());
        }
        Ok(())
    }

    /// Runs the conditional write on its own task and reports back through
    /// `callback`. The task only holds a weak reference to the manager; a
    /// completion arriving after shutdown still calls back but leaves the
    /// cache alone.
    fn submit<F>(
        self: &Arc<Self>,
        op: WriteOp,
        update_fn: UpdateFn,
        callback: F,
    ) where
        F: FnOnce(Status, Option<Arc<NodesConfiguration>>) + Send + 'static,
    {
        let store = self.store.clone();
        let manager = Arc::downgrade(self);

        tokio::spawn(async move {
            let (status, record) = match store.update_config(update_fn).await {
                Ok(bytes) => match decode(&bytes) {
                    Ok(config) => (Status::Ok, Some(config)),
                    Err(e) => {
                        error!(op = op.as_str(), "store returned an undecodable record: {}", e);
                        (Status::BadMessage, None)
                    }
                },
                Err(StoreError::VersionMismatch { current }) => {
                    let current = match current {
                        Some(bytes) => decode(&bytes).ok(),
                        None => Some(Arc::new(NodesConfiguration::empty())),
                    };
                    (Status::VersionMismatch, current)
                }
                Err(e) => {
                    warn!(op = op.as_str(), "nodes configuration write failed: {}", e);
                    (Status::from(&e), None)
                }
            };

            if let Some(record) = &record {
                match manager.upgrade() {
                    Some(m) if m.state() != ManagerState::ShutDown => {
                        m.reconcile(record.clone());
                    }
                    _ => debug!(op = op.as_str(), "write completed after shutdown, skipping reconcile"),
                }
            }

            WRITE_OUTCOMES.with_label_values(&[op.as_str(), status.as_str()]).inc();
            info!(
                op = op.as_str(),
                %status,
                version = ?record.as_ref().map(|r| r.version()),
                "nodes configuration write completed"
            );
            callback(status, record);
        });
    }

    /// Stops the change watcher. In-flight writes still complete and call
    /// back, without touching the cache.
    pub async fn shutdown(&self) {
        *self.state.lock() = ManagerState::ShutDown;
        self.shutdown.cancel();
        let handle = self.watcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("change watcher ended abnormally: {}", e);
                }
            }
        }
        info!("nodes configuration manager shut down");
    }
}

impl Reconcile for NodesConfigurationManager {
    /// Installs `candidate` if it is newer than the local snapshot and, if
    /// so, distributes it to every worker. Stale or duplicate candidates are
    /// dropped.
    fn reconcile(
        &self,
        candidate: Arc<NodesConfiguration>,
    ) -> bool {
        let version = candidate.version();
        if !self.cache.install(candidate.clone()) {
            STALE_CANDIDATES.inc();
            debug!(%version, current = ?self.cache.version(), "ignoring stale nodes configuration");
            return false;
        }

        INSTALLED_CONFIGS.inc();
        CURRENT_VERSION.set(version_gauge_value(version.val()));
        self.version_tx.send_if_modified(|current| {
            if current.map_or(true, |held| version > held) {
                *current = Some(version);
                true
            } else {
                false
            }
        });
        info!(%version, "installed new nodes configuration");

        self.distributor.broadcast(candidate);
        true
    }
}

impl Drop for NodesConfigurationManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn decode(bytes: &Bytes) -> Result<Arc<NodesConfiguration>> {
    Ok(Arc::new(NodesConfigurationCodec::deserialize(bytes)?))
}

async fn fetch_initial(
    store: Arc<dyn NodesConfigurationStore>,
    linearizable: bool,
) -> Result<Arc<NodesConfiguration>> {
    let fetched = if linearizable {
        store.get_latest_config().await
    } else {
        store.get_config().await
    };

    match fetched {
        Ok(bytes) => decode(&bytes),
        Err(StoreError::NotFound) => {
            info!("store holds no nodes configuration, starting from EMPTY_VERSION");
            Ok(Arc::new(NodesConfiguration::empty()))
        }
        Err(e) => Err(e.into()),
    }
}
