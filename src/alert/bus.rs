use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::debug;
use tracing::info;

use super::AlertClient;
use super::InitFn;
use super::KvAlert;
use super::Registry;
use super::DEFAULT_REGISTRY;
use crate::constants::ALERT_KVDB;
use crate::constants::ALERT_KVDB_TEST;
use crate::AlertConfig;
use crate::AlertError;
use crate::Result;

lazy_static! {
    static ref DEFAULT_BUS: AlertBus = AlertBus::with_default_drivers(DEFAULT_REGISTRY.clone());
}

/// Driver table and the clients created from it
pub struct AlertBus {
    drivers: RwLock<HashMap<String, InitFn>>,
    instances: RwLock<HashMap<String, Arc<dyn AlertClient>>>,
    registry: Arc<Registry>,
}

impl AlertBus {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            registry,
        }
    }

    /// Bus with the kv driver registered under its production and test names
    pub fn with_default_drivers(registry: Arc<Registry>) -> Self {
        let bus = Self::new(registry);
        let mut drivers = bus.drivers.write();
        drivers.insert(ALERT_KVDB.to_string(), KvAlert::init as InitFn);
        drivers.insert(ALERT_KVDB_TEST.to_string(), KvAlert::init as InitFn);
        drop(drivers);
        bus
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn register(
        &self,
        name: &str,
        init: InitFn,
    ) -> Result<()> {
        let mut drivers = self.drivers.write();
        if drivers.contains_key(name) {
            return Err(AlertError::DriverExists(name.to_string()).into());
        }
        drivers.insert(name.to_string(), init);
        debug!(driver = name, "alert driver registered");
        Ok(())
    }

    /// Creates a client of driver `name`; it replaces any earlier instance of that driver.
    pub fn new_client(
        &self,
        name: &str,
        config: &AlertConfig,
    ) -> Result<Arc<dyn AlertClient>> {
        let init = self
            .drivers
            .read()
            .get(name)
            .copied()
            .ok_or(AlertError::NotSupported)?;

        let client = init(config, self.registry.clone())?;
        self.instances.write().insert(name.to_string(), client.clone());
        info!(
            driver = name,
            cluster_id = %config.cluster.cluster_id,
            "alert client created"
        );
        Ok(client)
    }

    pub fn instance(
        &self,
        name: &str,
    ) -> Result<Arc<dyn AlertClient>> {
        self.instances
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AlertError::ClientNotFound.into())
    }

    /// Shuts down every client created through this bus
    pub fn shutdown(&self) {
        let instances: Vec<Arc<dyn AlertClient>> = self.instances.read().values().cloned().collect();
        for client in instances {
            debug!(driver = %client, "shutting down alert client");
            client.shutdown();
        }
    }
}

/// Registers a driver on the package level bus
pub fn register(
    name: &str,
    init: InitFn,
) -> Result<()> {
    DEFAULT_BUS.register(name, init)
}

/// Creates a client from the package level bus
pub fn new(
    name: &str,
    config: &AlertConfig,
) -> Result<Arc<dyn AlertClient>> {
    DEFAULT_BUS.new_client(name, config)
}

/// Shuts down every client of the package level bus
pub fn shutdown() {
    DEFAULT_BUS.shutdown();
}
