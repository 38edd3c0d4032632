use std::sync::Arc;

use super::super::enable_logger;
use super::super::test_config;
use crate::AlertConfig;
use crate::KvAlert;
use crate::KvStore;
use crate::Registry;

/// Assembles a [`KvAlert`] around injected collaborators
pub struct MockBuilder {
    pub settings: Option<AlertConfig>,
    pub kv: Option<Arc<dyn KvStore>>,
    pub registry: Option<Arc<Registry>>,
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            kv: None,
            registry: None,
        }
    }

    pub fn with_settings(
        mut self,
        settings: AlertConfig,
    ) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_kv(
        mut self,
        kv: impl KvStore,
    ) -> Self {
        self.kv = Some(Arc::new(kv));
        self
    }

    pub fn with_registry(
        mut self,
        registry: Arc<Registry>,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build_alert(self) -> (KvAlert, Arc<Registry>) {
        enable_logger();

        let settings = self.settings.unwrap_or_else(|| test_config("c1"));
        let registry = self.registry.unwrap_or_else(|| Arc::new(Registry::new()));
        if let Some(kv) = self.kv {
            registry.insert_kv(&settings.cluster.cluster_id, kv);
        }
        let alert = KvAlert::new(&settings, registry.clone()).expect("should build KvAlert");
        (alert, registry)
    }
}
