use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::debug;
use tracing::info;

use super::Watcher;
use crate::KvBackend;
use crate::KvConfig;
use crate::KvFactory;
use crate::KvStore;
use crate::Result;

lazy_static! {
    /// Registry shared by the package level bus
    pub static ref DEFAULT_REGISTRY: Arc<Registry> = Arc::new(Registry::new());
}

#[derive(Default)]
struct RegistryInner {
    /// Opened backends by engine and endpoints
    backends: HashMap<String, Arc<dyn KvFactory>>,
    kv_stores: HashMap<String, Arc<dyn KvStore>>,
    watchers: HashMap<String, Arc<Watcher>>,
}

/// Process wide state of the alert bus: kv handles and watch sessions per
/// cluster id.
///
/// Opening a kv handle is expensive, so one handle per cluster is cached and
/// reused by every client.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
    /// Opens every namespace when set, bypassing the configured engine
    factory: Option<Arc<dyn KvFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(factory: Arc<dyn KvFactory>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            factory: Some(factory),
        }
    }

    /// Cached kv handle of `cluster_id`, opened on first use
    pub fn kv_for_cluster(
        &self,
        config: &KvConfig,
        cluster_id: &str,
    ) -> Result<Arc<dyn KvStore>> {
        if let Some(kv) = self.inner.read().kv_stores.get(cluster_id) {
            return Ok(kv.clone());
        }

        let mut inner = self.inner.write();
        // lost the race to another opener
        if let Some(kv) = inner.kv_stores.get(cluster_id) {
            return Ok(kv.clone());
        }

        let factory = match &self.factory {
            Some(f) => f.clone(),
            None => {
                let key = config.backend_key();
                match inner.backends.get(&key) {
                    Some(f) => f.clone(),
                    None => {
                        let backend: Arc<dyn KvFactory> = Arc::new(KvBackend::open(config)?);
                        inner.backends.insert(key, backend.clone());
                        backend
                    }
                }
            }
        };

        let namespace = config.namespace(cluster_id);
        let kv = factory.open(&namespace)?;
        info!(cluster_id, namespace = %namespace, "kv store opened for cluster");
        inner.kv_stores.insert(cluster_id.to_string(), kv.clone());
        Ok(kv)
    }

    pub fn kv_instance(
        &self,
        cluster_id: &str,
    ) -> Option<Arc<dyn KvStore>> {
        self.inner.read().kv_stores.get(cluster_id).cloned()
    }

    /// Pins `kv` as the store of `cluster_id`
    pub fn insert_kv(
        &self,
        cluster_id: &str,
        kv: Arc<dyn KvStore>,
    ) {
        self.inner.write().kv_stores.insert(cluster_id.to_string(), kv);
    }

    /// Installs `watcher` for its cluster and returns the one it replaced
    pub(crate) fn install_watcher(
        &self,
        watcher: Arc<Watcher>,
    ) -> Option<Arc<Watcher>> {
        let cluster_id = watcher.cluster_id().to_string();
        debug!(cluster_id = %cluster_id, session = watcher.session_id(), "install watcher");
        self.inner.write().watchers.insert(cluster_id, watcher)
    }

    pub(crate) fn watcher(
        &self,
        cluster_id: &str,
    ) -> Option<Arc<Watcher>> {
        self.inner.read().watchers.get(cluster_id).cloned()
    }

    /// Removes the watcher of `cluster_id` if it still belongs to `session_id`
    pub(crate) fn remove_watcher(
        &self,
        cluster_id: &str,
        session_id: &str,
    ) -> Option<Arc<Watcher>> {
        let mut inner = self.inner.write();
        match inner.watchers.get(cluster_id) {
            Some(w) if w.session_id() == session_id => inner.watchers.remove(cluster_id),
            _ => None,
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.read().watchers.len()
    }
}
