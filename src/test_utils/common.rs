use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::Alert;
use crate::AlertAction;
use crate::AlertConfig;
use crate::AlertWatcherFn;
use crate::KvBackend;
use crate::KvError;
use crate::KvFactory;
use crate::KvPair;
use crate::KvStore;
use crate::MemKvEngine;
use crate::ResourceType;
use crate::Severity;
use crate::WatchCb;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn mem_backend() -> KvBackend {
    mem_backend_with(4096, 1024)
}

pub fn mem_backend_with(
    history_size: usize,
    buffer_size: usize,
) -> KvBackend {
    KvBackend::new(
        "test-mem",
        Arc::new(MemKvEngine::new()),
        history_size,
        buffer_size,
    )
    .unwrap()
}

pub fn mem_kv_store(namespace: &str) -> Arc<dyn KvStore> {
    KvFactory::open(&mem_backend(), namespace).unwrap()
}

/// Watch deliveries in arrival order, errors rendered as text
pub type Recorded = Arc<Mutex<Vec<std::result::Result<KvPair, String>>>>;

/// Callback recording every delivery, plus the prefixes it was called with
pub fn recording_cb() -> (WatchCb, Recorded, Arc<Mutex<Vec<String>>>) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let prefixes = Arc::new(Mutex::new(Vec::new()));
    let (r, p) = (recorded.clone(), prefixes.clone());
    let cb: WatchCb = Arc::new(move |prefix: String, update: std::result::Result<KvPair, KvError>| {
        p.lock().push(prefix);
        r.lock().push(update.map_err(|e| e.to_string()));
        futures::future::ready(Ok(())).boxed()
    });
    (cb, recorded, prefixes)
}

/// Polls `f` until it holds, panics after two seconds
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

pub fn test_config(cluster_id: &str) -> AlertConfig {
    let mut config = AlertConfig::default();
    config.cluster.cluster_id = cluster_id.to_string();
    config.watch.bootstrap_interval_ms = 20;
    config
}

pub fn alert_of(
    resource: ResourceType,
    alert_type: i64,
    severity: Severity,
) -> Alert {
    Alert {
        severity,
        alert_type,
        message: format!("{} alert {}", resource.as_str(), alert_type),
        resource_id: format!("{}-1", resource.as_str()),
        resource,
        ..Default::default()
    }
}

/// `(alert, action, key)` per alert watch event
pub type AlertEvents = Arc<Mutex<Vec<(Option<Alert>, AlertAction, String)>>>;

pub fn recording_alert_watcher() -> (AlertWatcherFn, AlertEvents) {
    let events: AlertEvents = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    let cb: AlertWatcherFn = Arc::new(
        move |alert: Option<&Alert>, action: AlertAction, _prefix: &str, key: &str| {
            e.lock().push((alert.cloned(), action, key.to_string()));
            Ok(())
        },
    );
    (cb, events)
}
