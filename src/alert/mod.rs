//! Alert bus.
//!
//! Drivers register an init function under a name. Clients are created from a
//! driver and an [`AlertConfig`]; they raise, enumerate and watch alerts of
//! their cluster and share kv handles and watch sessions through a
//! [`Registry`].

mod bus;
mod id_allocator;
mod kv_alert;
mod registry;
mod types;
mod watch;

pub use bus::*;
pub use id_allocator::*;
pub use kv_alert::*;
pub use registry::*;
pub use types::*;
pub use watch::AlertWatcherFn;
pub use watch::Watcher;
pub use watch::WatcherStatus;
pub(crate) use watch::subscribe_watch;

#[cfg(test)]
mod bus_test;
#[cfg(test)]
mod watch_test;

use std::fmt::Display;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::AlertConfig;
use crate::KvStore;
use crate::Result;

/// Alert client API. `Display` renders the driver name.
#[async_trait]
pub trait AlertClient: Display + Send + Sync + 'static {
    /// Stops the watch sessions this client started
    fn shutdown(&self);

    /// Kv handle of the client's own cluster
    fn kv_instance(&self) -> Option<Arc<dyn KvStore>>;

    /// Raises `alert` and every alert subscribed to its type.
    ///
    /// Assigns `id`, `timestamp` and `cleared` on success.
    async fn raise(
        &self,
        alert: &mut Alert,
    ) -> Result<()>;

    /// Makes `child_alert` be raised whenever an alert of `parent_alert_type` is
    async fn subscribe(
        &self,
        parent_alert_type: i64,
        child_alert: &Alert,
    ) -> Result<()>;

    async fn retrieve(
        &self,
        resource: ResourceType,
        id: i64,
    ) -> Result<Alert>;

    /// `filter.resource` selects a partition (all when `None`), a non zero
    /// `filter.severity` keeps alerts at least that severe.
    async fn enumerate(
        &self,
        filter: &Alert,
    ) -> Result<Vec<Alert>>;

    async fn enumerate_by_cluster(
        &self,
        cluster_id: &str,
        filter: &Alert,
    ) -> Result<Vec<Alert>>;

    /// Alerts raised strictly between `start` and `end`
    async fn enumerate_within_time_range(
        &self,
        start: SystemTime,
        end: SystemTime,
        resource: ResourceType,
    ) -> Result<Vec<Alert>>;

    async fn erase(
        &self,
        resource: ResourceType,
        id: i64,
    ) -> Result<()>;

    async fn clear(
        &self,
        resource: ResourceType,
        id: i64,
        ttl: u64,
    ) -> Result<()>;

    /// Watches every alert of `cluster_id`. Returns once the watch is live.
    async fn watch(
        &self,
        cluster_id: &str,
        cb: AlertWatcherFn,
    ) -> Result<()>;
}

/// Driver constructor registered with [`AlertBus::register`]
pub type InitFn = fn(&AlertConfig, Arc<Registry>) -> Result<Arc<dyn AlertClient>>;
