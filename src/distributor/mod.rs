//! Fan-out of newly installed snapshots to every registered worker context.

mod worker;
pub use worker::*;

#[cfg(test)]
mod distributor_test;

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
#[cfg(test)]
use mockall::automock;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::metrics::DISTRIBUTION_FAILURES;
use crate::DistributorConfig;
use crate::LocalCache;
use crate::MembershipVersion;
use crate::NodesConfiguration;
use crate::Result;

pub type SubscriberId = u64;

/// Recipient of snapshot broadcasts. Implementations expose nothing to the
/// manager except this setter.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSubscriber: Send + Sync + 'static {
    /// Makes `config` visible to subsequent reads in the recipient's context.
    /// Returns once the recipient acknowledged it.
    async fn set_nodes_configuration(
        &self,
        config: Arc<NodesConfiguration>,
    ) -> Result<()>;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionReport {
    pub version: MembershipVersion,
    pub delivered: usize,
    pub failed: Vec<SubscriberId>,
}

pub struct Distributor {
    subscribers: DashMap<SubscriberId, Arc<dyn ConfigSubscriber>>,
    next_id: AtomicU64,
    ack_timeout: Duration,
    /// Newest snapshot handed to `broadcast`, replayed to late registrants
    last_broadcast: LocalCache,
    /// Highest version whose broadcast has completed
    distributed_tx: watch::Sender<MembershipVersion>,
}

impl std::fmt::Debug for Distributor {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("subscribers", &self.subscribers.len())
            .field("ack_timeout", &self.ack_timeout)
            .field("distributed", &*self.distributed_tx.borrow())
            .finish()
    }
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new(&DistributorConfig::default())
    }
}

impl Distributor {
    pub fn new(config: &DistributorConfig) -> Self {
        let (distributed_tx, _) = watch::channel(MembershipVersion::EMPTY_VERSION);
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            ack_timeout: config.ack_timeout(),
            last_broadcast: LocalCache::new(),
            distributed_tx,
        }
    }

    /// Adds `subscriber` to every future broadcast. If a snapshot was
    /// already broadcast, the newest one is delivered to it right away.
    pub fn register(
        &self,
        subscriber: Arc<dyn ConfigSubscriber>,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, subscriber.clone());
        debug!(subscriber_id = id, "registered config subscriber");

        if let Some(config) = self.last_broadcast.current() {
            self.catch_up(id, subscriber, config);
        }
        id
    }

    fn catch_up(
        &self,
        id: SubscriberId,
        subscriber: Arc<dyn ConfigSubscriber>,
        config: Arc<NodesConfiguration>,
    ) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(subscriber_id = id, "no runtime to deliver the current config, waiting for the next broadcast");
                return;
            }
        };
        let ack_timeout = self.ack_timeout;
        handle.spawn(async move {
            let version = config.version();
            match timeout(ack_timeout, subscriber.set_nodes_configuration(config)).await {
                Ok(Ok(())) => debug!(subscriber_id = id, %version, "late subscriber caught up"),
                Ok(Err(e)) => {
                    DISTRIBUTION_FAILURES.inc();
                    warn!(subscriber_id = id, %version, "catch-up delivery failed: {}", e);
                }
                Err(_) => {
                    DISTRIBUTION_FAILURES.inc();
                    warn!(subscriber_id = id, %version, "catch-up delivery not acknowledged within {:?}", ack_timeout);
                }
            }
        });
    }

    pub fn unregister(
        &self,
        id: SubscriberId,
    ) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Pushes `config` to every registered subscriber without blocking the
    /// caller. A subscriber that fails or does not acknowledge within the ack
    /// timeout is reported and skipped; it never holds up the others.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn broadcast(
        &self,
        config: Arc<NodesConfiguration>,
    ) -> JoinHandle<DistributionReport> {
        // Recorded before the recipients are collected, so a concurrent
        // `register` either is a recipient or sees this snapshot.
        self.last_broadcast.install(config.clone());
        let recipients: Vec<(SubscriberId, Arc<dyn ConfigSubscriber>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let ack_timeout = self.ack_timeout;
        let distributed_tx = self.distributed_tx.clone();

        tokio::spawn(async move {
            let version = config.version();
            let deliveries = recipients.into_iter().map(|(id, subscriber)| {
                let config = config.clone();
                async move {
                    match timeout(ack_timeout, subscriber.set_nodes_configuration(config)).await {
                        Ok(Ok(())) => Ok(id),
                        Ok(Err(e)) => {
                            warn!(subscriber_id = id, %version, "delivery failed: {}", e);
                            Err(id)
                        }
                        Err(_) => {
                            warn!(subscriber_id = id, %version, "delivery not acknowledged within {:?}", ack_timeout);
                            Err(id)
                        }
                    }
                }
            });

            let mut report = DistributionReport {
                version,
                delivered: 0,
                failed: Vec::new(),
            };
            for outcome in join_all(deliveries).await {
                match outcome {
                    Ok(_) => report.delivered += 1,
                    Err(id) => {
                        DISTRIBUTION_FAILURES.inc();
                        report.failed.push(id);
                    }
                }
            }

            distributed_tx.send_if_modified(|current| {
                if version > *current {
                    *current = version;
                    true
                } else {
                    false
                }
            });
            debug!(%version, delivered = report.delivered, failed = report.failed.len(), "broadcast completed");
            report
        })
    }

    /// Highest version whose broadcast has completed.
    pub fn distributed_version(&self) -> MembershipVersion {
        *self.distributed_tx.borrow()
    }

    /// Resolves once a broadcast of `version` (or newer) has completed on
    /// every subscriber.
    pub async fn wait_until_distributed(
        &self,
        version: MembershipVersion,
    ) {
        let mut rx = self.distributed_tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed
        // channel while we are borrowed.
        let _ = rx.wait_for(|distributed| *distributed >= version).await;
    }
}
