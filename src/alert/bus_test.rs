use std::sync::Arc;

use super::InitFn;
use crate::constants::ALERT_KVDB;
use crate::constants::ALERT_KVDB_TEST;
use crate::test_utils::*;
use crate::AlertBus;
use crate::AlertClient;
use crate::AlertConfig;
use crate::AlertError;
use crate::Error;
use crate::KvAlert;
use crate::Registry;
use crate::Result;

fn custom_init(
    config: &AlertConfig,
    registry: Arc<Registry>,
) -> Result<Arc<dyn AlertClient>> {
    KvAlert::init(config, registry)
}

fn failing_init(
    _config: &AlertConfig,
    _registry: Arc<Registry>,
) -> Result<Arc<dyn AlertClient>> {
    Err(AlertError::Illegal.into())
}

fn bus() -> AlertBus {
    enable_logger();
    AlertBus::with_default_drivers(Arc::new(Registry::new()))
}

#[test]
fn test_default_drivers_cannot_be_registered_twice() {
    let bus = bus();

    assert!(matches!(
        bus.register(ALERT_KVDB, KvAlert::init as InitFn),
        Err(Error::Alert(AlertError::DriverExists(_)))
    ));
    assert!(matches!(
        bus.register(ALERT_KVDB_TEST, custom_init as InitFn),
        Err(Error::Alert(AlertError::DriverExists(_)))
    ));
    assert!(matches!(
        super::register(ALERT_KVDB, KvAlert::init as InitFn),
        Err(Error::Alert(AlertError::DriverExists(_)))
    ));
}

#[test]
fn test_unknown_driver_is_not_supported() {
    let bus = bus();

    assert!(matches!(
        bus.new_client("alert_nosuch", &test_config("c1")),
        Err(Error::Alert(AlertError::NotSupported))
    ));
    assert!(matches!(
        bus.instance("alert_nosuch"),
        Err(Error::Alert(AlertError::ClientNotFound))
    ));
}

#[test]
fn test_new_client_is_kept_as_instance() {
    let bus = bus();

    let client = bus.new_client(ALERT_KVDB, &test_config("c1")).unwrap();
    assert_eq!(client.to_string(), ALERT_KVDB);

    let instance = bus.instance(ALERT_KVDB).unwrap();
    assert!(Arc::ptr_eq(&client, &instance));
    assert!(bus.registry().kv_instance("c1").is_some());
}

#[test]
fn test_registered_driver_creates_clients() {
    let bus = bus();
    bus.register("alert_custom", custom_init as InitFn).unwrap();
    bus.register("alert_broken", failing_init as InitFn).unwrap();

    assert!(bus.new_client("alert_custom", &test_config("c1")).is_ok());
    assert!(matches!(
        bus.new_client("alert_broken", &test_config("c1")),
        Err(Error::Alert(AlertError::Illegal))
    ));
    assert!(bus.instance("alert_broken").is_err());
}

#[test]
fn test_invalid_engine_fails_client_creation() {
    let bus = bus();
    let mut config = test_config("c1");
    config.kv.engine = "kv-consul".to_string();

    assert!(matches!(
        bus.new_client(ALERT_KVDB, &config),
        Err(Error::Kv(crate::KvError::UnknownEngine(_)))
    ));
}

#[tokio::test]
async fn test_shutdown_stops_every_client_watch() {
    let bus = bus();
    let c1 = bus.new_client(ALERT_KVDB, &test_config("c1")).unwrap();
    let c2 = bus.new_client(ALERT_KVDB_TEST, &test_config("c2")).unwrap();

    let (cb1, _) = recording_alert_watcher();
    let (cb2, _) = recording_alert_watcher();
    c1.watch("c1", cb1).await.unwrap();
    c2.watch("c2", cb2).await.unwrap();
    assert_eq!(bus.registry().watcher_count(), 2);

    bus.shutdown();
    assert_eq!(bus.registry().watcher_count(), 0);
}
