use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::metrics::MALFORMED_RECORDS;
use crate::metrics::WATCHER_FETCH_FAILURES;
use crate::NodesConfiguration;
use crate::NodesConfigurationCodec;
use crate::NodesConfigurationStore;
use crate::StoreError;
use crate::WatcherConfig;

/// The single entry point through which candidate snapshots are proposed.
#[cfg_attr(test, automock)]
pub trait Reconcile: Send + Sync + 'static {
    /// Returns whether `candidate` was newer and got installed.
    fn reconcile(
        &self,
        candidate: Arc<NodesConfiguration>,
    ) -> bool;
}

/// Background discovery of store-side changes.
///
/// Polls `get_config` every `poll_interval + rand(0..=jitter)` and, when the
/// store pushes notifications, right after each one. Every decoded record is
/// handed to the reconciler whether or not it is newer; failures are logged
/// and left to the next tick.
pub struct ChangeWatcher<R: Reconcile> {
    store: Arc<dyn NodesConfigurationStore>,
    reconciler: Weak<R>,
    config: WatcherConfig,
}

impl<R: Reconcile> ChangeWatcher<R> {
    pub fn new(
        store: Arc<dyn NodesConfigurationStore>,
        reconciler: Weak<R>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            config,
        }
    }

    /// Spawns the watch loop; it stops when `shutdown` is cancelled or the
    /// reconciler is dropped.
    pub fn spawn(
        self,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(
        self,
        shutdown: CancellationToken,
    ) {
        let mut notifications = self.store.subscribe();
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            push = notifications.is_some(),
            "change watcher started"
        );

        loop {
            let delay = self.next_delay();
            let wakeup = tokio::select! {
                _ = shutdown.cancelled() => Wakeup::Shutdown,
                _ = sleep(delay) => Wakeup::Tick,
                changed = wait_for_notification(&mut notifications) => {
                    if changed {
                        Wakeup::Pushed
                    } else {
                        Wakeup::NotificationsClosed
                    }
                }
            };

            match wakeup {
                Wakeup::Shutdown => break,
                Wakeup::Tick => trace!("watcher poll tick"),
                Wakeup::Pushed => trace!("store pushed a change notification"),
                Wakeup::NotificationsClosed => {
                    debug!("store notification channel closed, falling back to polling");
                    notifications = None;
                    continue;
                }
            }

            if !self.poll_once().await {
                break;
            }
        }
        info!("change watcher stopped");
    }

    /// One fetch-and-propose round. Returns false once the reconciler is gone.
    pub async fn poll_once(&self) -> bool {
        let candidate = match self.store.get_config().await {
            Ok(bytes) => match NodesConfigurationCodec::deserialize(&bytes) {
                Ok(config) => config,
                Err(e) => {
                    MALFORMED_RECORDS.inc();
                    warn!("discarding malformed nodes configuration from store: {}", e);
                    return self.reconciler.strong_count() > 0;
                }
            },
            Err(StoreError::NotFound) => {
                trace!("store holds no nodes configuration yet");
                return self.reconciler.strong_count() > 0;
            }
            Err(e) => {
                WATCHER_FETCH_FAILURES.inc();
                warn!("watcher failed to read nodes configuration: {}", e);
                return self.reconciler.strong_count() > 0;
            }
        };

        match self.reconciler.upgrade() {
            Some(reconciler) => {
                reconciler.reconcile(Arc::new(candidate));
                true
            }
            None => false,
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        self.config.poll_interval() + Duration::from_millis(jitter)
    }
}

enum Wakeup {
    Shutdown,
    Tick,
    Pushed,
    NotificationsClosed,
}

/// Resolves with `true` on a change, `false` if the sender is gone, and never
/// if the store does not push.
async fn wait_for_notification(notifications: &mut Option<watch::Receiver<u64>>) -> bool {
    match notifications {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}
