//! Minimal worker pool: each worker is a task owning its own view of the
//! nodes configuration, updated only through its inbox.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;

use super::ConfigSubscriber;
use super::Distributor;
use super::SubscriberId;
use crate::Error;
use crate::LocalCache;
use crate::NodesConfiguration;
use crate::Result;

/// A worker's own copy of the latest configuration. Same install-if-newer
/// rule as the manager's cache, so a worker never goes backwards even when
/// two broadcasts race.
pub type UpdateableNodesConfiguration = LocalCache;

type WorkerJob = Box<dyn FnOnce(&WorkerContext) + Send>;

enum WorkerMessage {
    SetConfig {
        config: Arc<NodesConfiguration>,
        ack: oneshot::Sender<()>,
    },
    Run(WorkerJob),
}

/// What code running on a worker sees.
#[derive(Debug)]
pub struct WorkerContext {
    idx: usize,
    nodes_configuration: Arc<UpdateableNodesConfiguration>,
}

impl WorkerContext {
    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn updateable_nodes_configuration(&self) -> &Arc<UpdateableNodesConfiguration> {
        &self.nodes_configuration
    }

    pub fn nodes_configuration(&self) -> Option<Arc<NodesConfiguration>> {
        self.nodes_configuration.current()
    }
}

pub struct Worker {
    idx: usize,
    tx: mpsc::Sender<WorkerMessage>,
    nodes_configuration: Arc<UpdateableNodesConfiguration>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Worker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Worker").field("idx", &self.idx).finish()
    }
}

impl Worker {
    fn spawn(
        idx: usize,
        queue_size: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<WorkerMessage>(queue_size);
        let nodes_configuration = Arc::new(UpdateableNodesConfiguration::new());
        let ctx = WorkerContext {
            idx,
            nodes_configuration: nodes_configuration.clone(),
        };

        let task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    WorkerMessage::SetConfig { config, ack } => {
                        let version = config.version();
                        if ctx.nodes_configuration.install(config) {
                            trace!(worker = ctx.idx, %version, "worker picked up new config");
                        }
                        let _ = ack.send(());
                    }
                    WorkerMessage::Run(job) => job(&ctx),
                }
            }
            debug!(worker = ctx.idx, "worker stopped");
        });

        Self {
            idx,
            tx,
            nodes_configuration,
            task,
        }
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Latest configuration this worker has acknowledged.
    pub fn nodes_configuration(&self) -> Option<Arc<NodesConfiguration>> {
        self.nodes_configuration.current()
    }

    /// Runs `job` inside this worker's context.
    pub async fn run<R, F>(
        &self,
        job: F,
    ) -> Result<R>
    where
        F: FnOnce(&WorkerContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let boxed: WorkerJob = Box::new(move |ctx| {
            let _ = tx.send(job(ctx));
        });
        self.tx
            .send(WorkerMessage::Run(boxed))
            .await
            .map_err(|_| Error::WorkerUnreachable(self.idx))?;
        rx.await.map_err(|_| Error::WorkerUnreachable(self.idx))
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

#[async_trait]
impl ConfigSubscriber for Worker {
    async fn set_nodes_configuration(
        &self,
        config: Arc<NodesConfiguration>,
    ) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::SetConfig { config, ack })
            .await
            .map_err(|_| Error::WorkerUnreachable(self.idx))?;
        ack_rx.await.map_err(|_| Error::WorkerUnreachable(self.idx))
    }
}

#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
}

impl WorkerPool {
    /// Spawns `num_workers` worker tasks. Must be called from within a Tokio
    /// runtime.
    pub fn spawn(
        num_workers: usize,
        queue_size: usize,
    ) -> Self {
        let workers = (0..num_workers)
            .map(|idx| Arc::new(Worker::spawn(idx, queue_size)))
            .collect();
        Self { workers }
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Registers every worker as a recipient of `distributor`.
    pub fn register_with(
        &self,
        distributor: &Distributor,
    ) -> Vec<SubscriberId> {
        self.workers
            .iter()
            .map(|w| distributor.register(w.clone() as Arc<dyn ConfigSubscriber>))
            .collect()
    }

    /// Runs `job` on every worker and collects the per-worker results in
    /// worker order.
    pub async fn run_on_all_workers<R, F>(
        &self,
        job: F,
    ) -> Vec<Result<R>>
    where
        F: Fn(&WorkerContext) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let job = Arc::new(job);
        let runs = self.workers.iter().map(|worker| {
            let job = job.clone();
            async move { worker.run(move |ctx| job(ctx)).await }
        });
        futures::future::join_all(runs).await
    }

    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.stop();
        }
    }
}
