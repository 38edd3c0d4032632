use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::subscribe_watch;
use super::types::alert_key;
use super::types::resource_key;
use super::types::subscriptions_key;
use super::watch::bootstrap;
use super::Alert;
use super::AlertClient;
use super::AlertWatcherFn;
use super::IdAllocator;
use super::Registry;
use super::ResourceType;
use super::Severity;
use super::Watcher;
use crate::constants::ALERT_KVDB;
use crate::constants::MAX_SUBSCRIPTION_DEPTH;
use crate::metrics::ALERTS_RAISED;
use crate::utils::get_now_as_secs;
use crate::utils::system_time_to_secs;
use crate::AlertConfig;
use crate::AlertError;
use crate::KvPair;
use crate::KvStore;
use crate::KvStoreExt;
use crate::Result;

/// Alert store on the cluster's kv namespace.
///
/// Records live at `alert/<partition>/<id>`, subscription lists at
/// `alert/subscriptions/<alert_type>`.
pub struct KvAlert {
    config: AlertConfig,
    registry: Arc<Registry>,
    /// `(cluster_id, session_id)` of the watches started through this client
    sessions: Mutex<Vec<(String, String)>>,
}

impl fmt::Display for KvAlert {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(ALERT_KVDB)
    }
}

impl KvAlert {
    /// Driver init function, opens (or reuses) the configured cluster's kv handle.
    pub fn init(
        config: &AlertConfig,
        registry: Arc<Registry>,
    ) -> Result<Arc<dyn AlertClient>> {
        Ok(Arc::new(Self::new(config, registry)?))
    }

    pub fn new(
        config: &AlertConfig,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        registry.kv_for_cluster(&config.kv, &config.cluster.cluster_id)?;
        Ok(Self {
            config: config.clone(),
            registry,
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.config.cluster.cluster_id
    }

    fn kv(&self) -> Result<Arc<dyn KvStore>> {
        self.kv_for_cluster(self.cluster_id())
    }

    fn kv_for_cluster(
        &self,
        cluster_id: &str,
    ) -> Result<Arc<dyn KvStore>> {
        self.registry.kv_for_cluster(&self.config.kv, cluster_id)
    }

    fn raise_at_depth<'a>(
        &'a self,
        alert: &'a mut Alert,
        depth: usize,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if alert.resource == ResourceType::None {
                return Err(AlertError::ResourceNotFound.into());
            }
            if depth > MAX_SUBSCRIPTION_DEPTH {
                return Err(AlertError::SubscribedRaise.into());
            }

            let kv = self.kv()?;
            let subscriptions: Vec<Alert> = match kv.get_val(&subscriptions_key(alert.alert_type)).await {
                Ok((_, subs)) => subs,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            for mut child in subscriptions {
                if let Err(e) = self.raise_at_depth(&mut child, depth + 1).await {
                    debug!(alert_type = alert.alert_type, "subscribed alert raise failed: {:?}", e);
                    return Err(AlertError::SubscribedRaise.into());
                }
            }

            let id = IdAllocator::new(kv.clone(), self.config.retry.id_allocation)
                .next_id()
                .await?;
            alert.id = id;
            alert.timestamp = get_now_as_secs();
            alert.cleared = false;

            kv.create_val(&alert_key(alert.resource, id), &*alert, alert.ttl)
                .await?;
            ALERTS_RAISED
                .with_label_values(&[alert.resource.as_str()])
                .inc();
            trace!(id, resource = alert.resource.as_str(), "alert raised");
            Ok(())
        }
        .boxed()
    }

    async fn resource_alerts(
        kv: &dyn KvStore,
        resource: ResourceType,
    ) -> Result<Vec<Alert>> {
        let pairs = kv.enumerate(&resource_key(resource)).await?;
        pairs
            .iter()
            .map(|kvp| crate::decode_json::<Alert>(kvp).map_err(crate::Error::from))
            .collect()
    }

    /// Best effort union of every partition. Nothing at all is an error.
    async fn all_alerts(kv: &dyn KvStore) -> Result<Vec<Alert>> {
        let mut all = Vec::new();
        for resource in ResourceType::ALL {
            match Self::resource_alerts(kv, resource).await {
                Ok(mut alerts) => all.append(&mut alerts),
                Err(e) => debug!(resource = resource.as_str(), "skip partition: {:?}", e),
            }
        }
        if all.is_empty() {
            return Err(AlertError::NoAlertsRaised.into());
        }
        Ok(all)
    }

    async fn alerts_of(
        kv: &dyn KvStore,
        resource: ResourceType,
    ) -> Result<Vec<Alert>> {
        match resource {
            ResourceType::None => Self::all_alerts(kv).await,
            r => Self::resource_alerts(kv, r).await,
        }
    }

    async fn enumerate_in(
        kv: &dyn KvStore,
        filter: &Alert,
    ) -> Result<Vec<Alert>> {
        let alerts = Self::alerts_of(kv, filter.resource).await?;
        if filter.severity == Severity::None {
            return Ok(alerts);
        }
        Ok(alerts
            .into_iter()
            .filter(|a| a.severity <= filter.severity)
            .collect())
    }
}

#[async_trait]
impl AlertClient for KvAlert {
    fn shutdown(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock());
        for (cluster_id, session_id) in sessions {
            if let Some(watcher) = self.registry.remove_watcher(&cluster_id, &session_id) {
                watcher.stop();
                info!(cluster_id = %cluster_id, session = %session_id, "alert watch shut down");
            }
        }
    }

    fn kv_instance(&self) -> Option<Arc<dyn KvStore>> {
        self.registry.kv_instance(self.cluster_id())
    }

    async fn raise(
        &self,
        alert: &mut Alert,
    ) -> Result<()> {
        self.raise_at_depth(alert, 0).await
    }

    async fn subscribe(
        &self,
        parent_alert_type: i64,
        child_alert: &Alert,
    ) -> Result<()> {
        let kv = self.kv()?;
        let key = subscriptions_key(parent_alert_type);
        let mut subscriptions: Vec<Alert> = match kv.get_val(&key).await {
            Ok((_, subs)) => subs,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        subscriptions.push(child_alert.clone());
        kv.put_val(&key, &subscriptions, 0).await?;
        Ok(())
    }

    async fn retrieve(
        &self,
        resource: ResourceType,
        id: i64,
    ) -> Result<Alert> {
        if resource == ResourceType::None {
            return Err(AlertError::ResourceNotFound.into());
        }
        let (_, alert): (KvPair, Alert) = self.kv()?.get_val(&alert_key(resource, id)).await?;
        Ok(alert)
    }

    async fn enumerate(
        &self,
        filter: &Alert,
    ) -> Result<Vec<Alert>> {
        let kv = self.kv()?;
        Self::enumerate_in(kv.as_ref(), filter).await
    }

    async fn enumerate_by_cluster(
        &self,
        cluster_id: &str,
        filter: &Alert,
    ) -> Result<Vec<Alert>> {
        let kv = self.kv_for_cluster(cluster_id)?;
        Self::enumerate_in(kv.as_ref(), filter).await
    }

    async fn enumerate_within_time_range(
        &self,
        start: SystemTime,
        end: SystemTime,
        resource: ResourceType,
    ) -> Result<Vec<Alert>> {
        let (start, end) = (system_time_to_secs(start), system_time_to_secs(end));
        let kv = self.kv()?;
        Ok(Self::alerts_of(kv.as_ref(), resource)
            .await?
            .into_iter()
            .filter(|a| a.timestamp > start && a.timestamp < end)
            .collect())
    }

    async fn erase(
        &self,
        resource: ResourceType,
        id: i64,
    ) -> Result<()> {
        if resource == ResourceType::None {
            return Err(AlertError::ResourceNotFound.into());
        }
        self.kv()?.delete(&alert_key(resource, id)).await?;
        Ok(())
    }

    async fn clear(
        &self,
        resource: ResourceType,
        id: i64,
        ttl: u64,
    ) -> Result<()> {
        if resource == ResourceType::None {
            return Err(AlertError::ResourceNotFound.into());
        }
        let kv = self.kv()?;
        let key = alert_key(resource, id);
        let (_, mut alert): (KvPair, Alert) = kv.get_val(&key).await?;
        alert.cleared = true;
        kv.update_val(&key, &alert, ttl).await?;
        Ok(())
    }

    async fn watch(
        &self,
        cluster_id: &str,
        cb: AlertWatcherFn,
    ) -> Result<()> {
        let kv = self.kv_for_cluster(cluster_id)?;
        let watcher = Arc::new(Watcher::new(
            cluster_id,
            kv,
            cb,
            self.config.watch.max_consecutive_errors,
        ));

        if let Some(prev) = self.registry.install_watcher(watcher.clone()) {
            info!(
                cluster_id,
                replaced = prev.session_id(),
                "replacing alert watch"
            );
            prev.stop();
        }
        self.sessions
            .lock()
            .push((cluster_id.to_string(), watcher.session_id().to_string()));

        let started = match subscribe_watch(self.registry.clone(), cluster_id.to_string()).await {
            Ok(()) => bootstrap(&watcher, &self.config.watch).await,
            Err(e) => Err(e),
        };
        if started.is_err() {
            self.registry.remove_watcher(cluster_id, watcher.session_id());
            watcher.stop();
        }
        started
    }
}
