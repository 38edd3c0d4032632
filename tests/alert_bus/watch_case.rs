//! Watches see what any client of the cluster raises.

use std::sync::Arc;
use std::time::Duration;

use d_alert::constants::ALERT_KVDB;
use d_alert::constants::ALERT_KVDB_TEST;
use d_alert::AlertAction;
use d_alert::AlertBus;
use d_alert::Registry;
use d_alert::ResourceType;
use d_alert::Severity;

use crate::common::*;

#[tokio::test]
async fn test_watcher_sees_alerts_of_other_clients() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = sled_config(dir.path(), "c1");
    let bus = AlertBus::with_default_drivers(Arc::new(Registry::new()));

    let watching = bus.new_client(ALERT_KVDB, &config).unwrap();
    let raising = bus.new_client(ALERT_KVDB_TEST, &config).unwrap();

    let (cb, events) = recording_watcher();
    watching.watch("c1", cb).await.unwrap();

    let mut a = alert(ResourceType::Volume, 5, Severity::Alarm);
    raising.raise(&mut a).await.unwrap();
    raising.clear(ResourceType::Volume, a.id, 0).await.unwrap();
    raising.erase(ResourceType::Volume, a.id).await.unwrap();

    wait_until("alert lifecycle", || events.lock().len() == 3).await;
    let actions: Vec<AlertAction> = events.lock().iter().map(|e| e.1).collect();
    assert_eq!(
        actions,
        vec![AlertAction::Create, AlertAction::Update, AlertAction::Delete]
    );
    assert_eq!(events.lock()[0].0.as_ref().unwrap().id, a.id);

    bus.shutdown();
    let mut b = alert(ResourceType::Volume, 6, Severity::Alarm);
    raising.raise(&mut b).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(events.lock().len(), 3);
}

#[tokio::test]
async fn test_watch_other_cluster() {
    let bus = AlertBus::with_default_drivers(Arc::new(Registry::new()));
    let local = bus.new_client(ALERT_KVDB, &mem_config("c1")).unwrap();
    let remote = bus.new_client(ALERT_KVDB_TEST, &mem_config("c2")).unwrap();

    let (cb, events) = recording_watcher();
    local.watch("c2", cb).await.unwrap();

    let mut mine = alert(ResourceType::Node, 1, Severity::Warning);
    local.raise(&mut mine).await.unwrap();
    let mut theirs = alert(ResourceType::Node, 2, Severity::Warning);
    remote.raise(&mut theirs).await.unwrap();

    wait_until("remote alert", || events.lock().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0.as_ref().unwrap().alert_type, 2);
}
