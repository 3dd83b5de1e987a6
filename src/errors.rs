//! Error hierarchy for the nodes configuration manager.
//!
//! Errors are grouped by the layer that produces them: the backing store, the
//! manager state machine, the record codec and the declarative update logic.
//! Write completions do not receive these errors directly; they receive a
//! [`Status`] derived from them together with the best-known current record.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use config::ConfigError;

use crate::MembershipVersion;
use crate::NodeIndex;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backing store failures (conflicts, unavailability, backend errors)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Manager state machine violations
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// Serialized record could not be decoded or failed validation
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Declarative update could not be applied
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Settings loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Worker context stopped accepting messages
    #[error("Worker {0} is unreachable")]
    WorkerUnreachable(usize),

    /// Retry policy exhaustion
    #[error("Task failed after {retries} retries: {last}")]
    RetryExhausted { retries: usize, last: String },

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store location has never been written
    #[error("Nodes configuration not found")]
    NotFound,

    /// A conflicting writer won the compare-and-swap race, or the update
    /// function rejected the stored value. Carries the store's current value.
    #[error("Version mismatch")]
    VersionMismatch { current: Option<Bytes> },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The update function refused to produce a new value
    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("Serialization failure: {0}")]
    Codec(String),

    #[error(transparent)]
    Backend(#[from] sled::Error),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error("Write operations require upgrade_to_proposer()")]
    NotProposer,

    #[error("init() was already called")]
    AlreadyInitialized,

    #[error("Manager has not been initialized")]
    NotInitialized,

    #[error("Manager is shut down")]
    ShutDown,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialized record is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("Bad magic bytes")]
    BadMagic,

    #[error("Unsupported format version {0}")]
    UnsupportedFormat(u8),

    #[error("Compression stream failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decompressed body exceeds {0} bytes")]
    TooLarge(u64),

    #[error(transparent)]
    Decode(#[from] bincode::Error),

    #[error("Decoded record at version {0} failed validation")]
    Invalid(MembershipVersion),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UpdateError {
    /// The update was computed against a different base version
    #[error("Update expects base version {expected} but current is {actual}")]
    VersionMismatch {
        expected: MembershipVersion,
        actual: MembershipVersion,
    },

    #[error("Node {0} already exists")]
    NodeExists(NodeIndex),

    #[error("Node {0} not found")]
    NodeNotFound(NodeIndex),

    #[error("Resulting configuration is invalid: {0}")]
    Invalid(String),
}

/// Completion status handed to `update`/`overwrite` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    VersionMismatch,
    NotFound,
    Unavailable,
    Timeout,
    BadMessage,
    InvalidParam,
    ShutDown,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::VersionMismatch => "VERSION_MISMATCH",
            Status::NotFound => "NOTFOUND",
            Status::Unavailable => "UNAVAILABLE",
            Status::Timeout => "TIMEDOUT",
            Status::BadMessage => "BADMSG",
            Status::InvalidParam => "INVALID_PARAM",
            Status::ShutDown => "SHUTDOWN",
            Status::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&StoreError> for Status {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::NotFound => Status::NotFound,
            StoreError::VersionMismatch { .. } => Status::VersionMismatch,
            StoreError::Unavailable(_) => Status::Unavailable,
            StoreError::Timeout(_) => Status::Timeout,
            StoreError::Rejected(_) => Status::InvalidParam,
            StoreError::Codec(_) => Status::BadMessage,
            StoreError::Backend(_) => Status::Failed,
        }
    }
}

impl From<UpdateError> for StoreError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::VersionMismatch { .. } => StoreError::VersionMismatch { current: None },
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        StoreError::Codec(e.to_string())
    }
}
