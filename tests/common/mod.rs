use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use d_alert::constants::MEM_ENGINE;
use d_alert::constants::SLED_ENGINE;
use d_alert::Alert;
use d_alert::AlertAction;
use d_alert::AlertConfig;
use d_alert::AlertWatcherFn;
use d_alert::ResourceType;
use d_alert::Severity;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn mem_config(cluster_id: &str) -> AlertConfig {
    let mut config = AlertConfig::default();
    config.cluster.cluster_id = cluster_id.to_string();
    config.kv.engine = MEM_ENGINE.to_string();
    config.watch.bootstrap_interval_ms = 20;
    config
}

pub fn sled_config(
    root: &Path,
    cluster_id: &str,
) -> AlertConfig {
    let mut config = mem_config(cluster_id);
    config.kv.engine = SLED_ENGINE.to_string();
    config.kv.machines = vec![root.join("db").to_string_lossy().to_string()];
    config
}

pub fn alert(
    resource: ResourceType,
    alert_type: i64,
    severity: Severity,
) -> Alert {
    Alert {
        severity,
        alert_type,
        message: format!("{} failure", resource.as_str()),
        resource_id: format!("{}-0001", resource.as_str()),
        resource,
        ..Default::default()
    }
}

pub type Events = Arc<Mutex<Vec<(Option<Alert>, AlertAction, String)>>>;

pub fn recording_watcher() -> (AlertWatcherFn, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let cb: AlertWatcherFn = Arc::new(
        move |alert: Option<&Alert>, action: AlertAction, _prefix: &str, key: &str| {
            sink.lock().push((alert.cloned(), action, key.to_string()));
            Ok(())
        },
    );
    (cb, events)
}

pub async fn wait_until<F: Fn() -> bool>(
    what: &str,
    f: F,
) {
    for _ in 0..400 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting until {what}");
}
