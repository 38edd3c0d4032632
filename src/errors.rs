//! Alert Bus Error Hierarchy
//!
//! Defines the error types of the cluster state store and the alert bus,
//! categorized by the layer that raises them: key-value backend, alert store,
//! watch subsystem and cluster database.

use config::ConfigError;

use crate::constants::KEY_NOT_FOUND;
use crate::kv::KvAction;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key-value backend failures (missing keys, conflicts, engine faults)
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Alert store and driver registry failures
    #[error(transparent)]
    Alert(#[from] AlertError),

    /// Watch session failures
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Cluster database failures
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Retry policy exhaustion
    #[error("Retry task failed: {0}")]
    RetryTaskFailed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// True when the error means "key or record absent".
    ///
    /// Backends that only report errors as text are matched by substring.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kv(e) => e.is_not_found(),
            other => other.to_string().contains(KEY_NOT_FOUND),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("Key not found")]
    NotFound,

    #[error("Key already exists")]
    AlreadyExists,

    /// Compare-and-set lost against a concurrent writer
    #[error("Value mismatch")]
    ValueMismatch,

    /// Watch requested history older than the retained window
    #[error("Watch index {requested} compacted, oldest retained index is {oldest}")]
    IndexCompacted { requested: u64, oldest: u64 },

    /// Subscriber fell behind and its buffer overflowed
    #[error("Watch subscriber lagged behind")]
    WatchLagged,

    #[error("Watch closed by the backend")]
    WatchClosed,

    #[error("Failed to unmarshal value at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to marshal value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Persisted entry envelope could not be read or written
    #[error(transparent)]
    Envelope(#[from] bincode::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    Engine(String),

    #[error("Unknown kv engine: {0}")]
    UnknownEngine(String),
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound) || self.to_string().contains(KEY_NOT_FOUND)
    }
}

impl From<sled::Error> for KvError {
    fn from(e: sled::Error) -> Self {
        KvError::Engine(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Implementation not supported")]
    NotSupported,

    #[error("Alert driver {0} already registered")]
    DriverExists(String),

    #[error("Failed to unmarshal value")]
    Unmarshal,

    #[error("Illegal operation")]
    Illegal,

    #[error("Alert not initialized")]
    NotInitialized,

    #[error("Alert client not found")]
    ClientNotFound,

    /// A concrete resource type is required but `None` was given
    #[error("Resource not found in Alert")]
    ResourceNotFound,

    #[error("Could not raise alert and its subscribed alerts")]
    SubscribedRaise,

    #[error("No alert raised yet")]
    NoAlertsRaised,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to bootstrap watch on {0}")]
    BootstrapTimeout(String),

    #[error("Failed to watch on {0}")]
    Failed(String),

    #[error("Failed to find a watch on cluster : {0}")]
    NotRegistered(String),

    #[error("Watch on {cluster_id} stopped after {errors} consecutive errors")]
    PermanentFailure { cluster_id: String, errors: u32 },

    #[error("Watch on {0} is stopped")]
    Stopped(String),

    #[error("Unhandled KV Action: {0:?}")]
    UnhandledAction(KvAction),
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Could not parse cluster database: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Could not marshal cluster database to JSON: {0}")]
    Encode(#[source] serde_json::Error),
}
