use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ManagerConfig {
    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub distributor: DistributorConfig,

    /// Retry policy of the startup fetch performed by `init()`
    #[serde(default)]
    pub startup: BackoffPolicy,

    /// Compress records written through `update`/`overwrite`
    #[serde(default)]
    pub compress_records: bool,
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        self.watcher.validate()?;
        self.distributor.validate()?;
        self.startup.validate("manager.startup")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Interval between two store polls (unit: milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Random extra delay added to each poll (unit: milliseconds)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "manager.watcher.poll_interval_ms must be > 0".into(),
            ));
        }
        if self.jitter_ms >= self.poll_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "manager.watcher.jitter_ms ({}) must be below poll_interval_ms ({})",
                self.jitter_ms, self.poll_interval_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DistributorConfig {
    /// How long a single worker may take to acknowledge (unit: milliseconds)
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Per-worker inbox capacity
    #[serde(default = "default_worker_queue_size")]
    pub worker_queue_size: usize,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            worker_queue_size: default_worker_queue_size(),
        }
    }
}

impl DistributorConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.ack_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "manager.distributor.ack_timeout_ms must be > 0".into(),
            ));
        }
        if self.worker_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "manager.distributor.worker_queue_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    100
}
fn default_ack_timeout_ms() -> u64 {
    5000
}
fn default_worker_queue_size() -> usize {
    16
}
