//! The process wide bus behind `alert::new`.

use d_alert::alert;
use d_alert::constants::ALERT_KVDB;
use d_alert::constants::ALERT_KVDB_TEST;
use d_alert::AlertAction;
use d_alert::Error;
use d_alert::KvAlert;
use d_alert::ResourceType;
use d_alert::Severity;

use crate::common::*;

#[tokio::test]
async fn test_package_level_bus() {
    enable_logger();
    assert!(matches!(
        alert::register(ALERT_KVDB, KvAlert::init),
        Err(Error::Alert(_))
    ));

    let client = alert::new(ALERT_KVDB_TEST, &mem_config("package-bus")).unwrap();
    let (cb, events) = recording_watcher();
    client.watch("package-bus", cb).await.unwrap();

    let mut a = alert(ResourceType::Cluster, 1, Severity::Notify);
    client.raise(&mut a).await.unwrap();
    wait_until("create event", || events.lock().len() == 1).await;
    assert_eq!(events.lock()[0].1, AlertAction::Create);

    alert::shutdown();
}
