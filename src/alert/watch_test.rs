use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use super::watch::cluster_id_from_prefix;
use super::watch::kv_watch;
use super::KvAlert;
use super::WatcherStatus;
use crate::test_utils::*;
use crate::Alert;
use crate::AlertAction;
use crate::AlertClient;
use crate::AlertError;
use crate::AlertWatcherFn;
use crate::Error;
use crate::KvAction;
use crate::KvBackend;
use crate::KvError;
use crate::KvPair;
use crate::MockKvStore;
use crate::Registry;
use crate::ResourceType;
use crate::Severity;
use crate::WatchError;

struct Watched {
    client: KvAlert,
    registry: Arc<Registry>,
    backend: KvBackend,
    events: AlertEvents,
}

async fn watched_client() -> Watched {
    let backend = mem_backend();
    let registry = Arc::new(Registry::with_factory(Arc::new(backend.clone())));
    let (client, registry) = MockBuilder::new().with_registry(registry).build_alert();

    let (cb, events) = recording_alert_watcher();
    client.watch("c1", cb).await.unwrap();
    Watched {
        client,
        registry,
        backend,
        events,
    }
}

fn echo_put() -> impl Fn(&str, Vec<u8>, u64) -> std::result::Result<KvPair, KvError> + Send + 'static {
    |key: &str, value: Vec<u8>, ttl: u64| {
        Ok(KvPair {
            key: key.to_string(),
            value,
            action: KvAction::Set,
            create_index: 1,
            modified_index: 1,
            ttl,
        })
    }
}

#[test]
fn test_cluster_id_from_prefix() {
    assert_eq!(cluster_id_from_prefix("pwx/c1/alert/"), Some("c1"));
    assert_eq!(cluster_id_from_prefix("c1/alert/"), Some("c1"));
    assert_eq!(cluster_id_from_prefix("pwx/alert/c2/alert/"), Some("c2"));
    assert_eq!(cluster_id_from_prefix("alert/"), None);
    assert_eq!(cluster_id_from_prefix("pwx/c1/cluster/"), None);
}

#[tokio::test]
async fn test_watch_reports_alert_lifecycle() {
    enable_logger();
    let w = watched_client().await;
    let watcher = w.registry.watcher("c1").unwrap();
    assert_eq!(watcher.status(), WatcherStatus::Ready);

    let mut alert = alert_of(ResourceType::Volume, 1, Severity::Alarm);
    w.client.raise(&mut alert).await.unwrap();
    w.client.clear(ResourceType::Volume, alert.id, 0).await.unwrap();
    w.client.erase(ResourceType::Volume, alert.id).await.unwrap();

    wait_until("three alert events", || w.events.lock().len() == 3).await;
    let events = w.events.lock().clone();

    assert_eq!(events[0].0.as_ref(), Some(&alert));
    assert_eq!(events[0].1, AlertAction::Create);
    assert_eq!(events[0].2, "alert/volume/0");

    assert_eq!(events[1].1, AlertAction::Update);
    assert!(events[1].0.as_ref().unwrap().cleared);

    assert_eq!(events[2], (None, AlertAction::Delete, "alert/volume/0".to_string()));
}

#[tokio::test]
async fn test_bookkeeping_keys_are_not_reported() {
    let w = watched_client().await;

    w.client
        .subscribe(99, &alert_of(ResourceType::Node, 100, Severity::Warning))
        .await
        .unwrap();
    let mut alert = alert_of(ResourceType::Node, 1, Severity::Warning);
    w.client.raise(&mut alert).await.unwrap();

    wait_until("create event", || !w.events.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    let events = w.events.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].2, "alert/node/0");
}

#[tokio::test]
async fn test_undecodable_alert_is_skipped() {
    let w = watched_client().await;
    let kv = w.client.kv_instance().unwrap();

    kv.put("alert/volume/42", b"not json".to_vec(), 0).await.unwrap();
    let mut alert = alert_of(ResourceType::Volume, 1, Severity::Alarm);
    w.client.raise(&mut alert).await.unwrap();

    wait_until("create event", || !w.events.lock().is_empty()).await;
    let events = w.events.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, AlertAction::Create);
    assert_eq!(events[0].2, "alert/volume/0");

    let watcher = w.registry.watcher("c1").unwrap();
    assert_eq!(watcher.status(), WatcherStatus::Ready);
    assert_eq!(w.backend.watcher_count(), 1);
}

#[tokio::test]
async fn test_expired_alert_is_reported_as_delete() {
    let w = watched_client().await;

    let mut alert = alert_of(ResourceType::Volume, 1, Severity::Alarm);
    w.client.raise(&mut alert).await.unwrap();
    w.client.clear(ResourceType::Volume, alert.id, 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(w
        .client
        .retrieve(ResourceType::Volume, alert.id)
        .await
        .unwrap_err()
        .is_not_found());

    let mut next = alert_of(ResourceType::Volume, 2, Severity::Alarm);
    w.client.raise(&mut next).await.unwrap();

    wait_until("four alert events", || w.events.lock().len() == 4).await;
    let events = w.events.lock().clone();
    let actions: Vec<AlertAction> = events.iter().map(|e| e.1).collect();
    assert_eq!(
        actions,
        vec![
            AlertAction::Create,
            AlertAction::Update,
            AlertAction::Delete,
            AlertAction::Create
        ]
    );
    assert_eq!(events[2], (None, AlertAction::Delete, "alert/volume/0".to_string()));
    assert_eq!(events[3].2, "alert/volume/1");
}

#[tokio::test]
async fn test_failing_callback_keeps_subscription() {
    let backend = mem_backend();
    let registry = Arc::new(Registry::with_factory(Arc::new(backend.clone())));
    let (client, registry) = MockBuilder::new().with_registry(registry).build_alert();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let cb: AlertWatcherFn = Arc::new(
        move |_alert: Option<&Alert>, _action: AlertAction, _prefix: &str, _key: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(AlertError::Illegal.into())
        },
    );
    client.watch("c1", cb).await.unwrap();

    for alert_type in 1..=2 {
        let mut alert = alert_of(ResourceType::Node, alert_type, Severity::Warning);
        client.raise(&mut alert).await.unwrap();
    }

    wait_until("both events delivered", || calls.load(Ordering::SeqCst) == 2).await;
    let watcher = registry.watcher("c1").unwrap();
    assert_eq!(watcher.status(), WatcherStatus::Ready);
    assert_eq!(watcher.consecutive_errors(), 0);
    assert_eq!(backend.watcher_count(), 1);
}

#[tokio::test]
async fn test_delivery_errors_resubscribe_until_budget_is_spent() {
    let w = watched_client().await;
    let watcher = w.registry.watcher("c1").unwrap();

    for i in 1..5u32 {
        w.backend.close_watches();
        wait_until("resubscribed", || {
            watcher.consecutive_errors() == i && w.backend.watcher_count() == 1
        })
        .await;
        assert_eq!(watcher.status(), WatcherStatus::Ready);
    }

    w.backend.close_watches();
    wait_until("watch given up", || watcher.status() == WatcherStatus::Error).await;
    assert!(watcher.is_stopped());

    let mut alert = alert_of(ResourceType::Volume, 1, Severity::Alarm);
    w.client.raise(&mut alert).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let events = w.events.lock().clone();
    assert_eq!(events, vec![(None, AlertAction::None, String::new())]);
    assert_eq!(w.backend.watcher_count(), 0);
}

#[tokio::test]
async fn test_successful_delivery_resets_error_count() {
    let w = watched_client().await;
    let watcher = w.registry.watcher("c1").unwrap();

    for i in 1..3u32 {
        w.backend.close_watches();
        wait_until("resubscribed", || {
            watcher.consecutive_errors() == i && w.backend.watcher_count() == 1
        })
        .await;
    }

    let mut alert = alert_of(ResourceType::Volume, 1, Severity::Alarm);
    w.client.raise(&mut alert).await.unwrap();
    wait_until("create event", || w.events.lock().len() == 1).await;
    assert_eq!(watcher.consecutive_errors(), 0);
}

#[tokio::test]
async fn test_rewatch_replaces_previous_session() {
    let w = watched_client().await;
    let first = w.registry.watcher("c1").unwrap();

    let (cb, events) = recording_alert_watcher();
    w.client.watch("c1", cb).await.unwrap();

    assert!(first.is_stopped());
    let second = w.registry.watcher("c1").unwrap();
    assert_ne!(first.session_id(), second.session_id());
    assert_eq!(w.registry.watcher_count(), 1);
    wait_until("old subscription gone", || w.backend.watcher_count() == 1).await;

    let mut alert = alert_of(ResourceType::Cluster, 1, Severity::Notify);
    w.client.raise(&mut alert).await.unwrap();
    wait_until("create event", || events.lock().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(w.events.lock().is_empty());
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test]
async fn test_shutdown_stops_own_sessions() {
    let w = watched_client().await;
    let watcher = w.registry.watcher("c1").unwrap();

    w.client.shutdown();

    assert!(watcher.is_stopped());
    assert_eq!(w.registry.watcher_count(), 0);
    wait_until("subscription gone", || w.backend.watcher_count() == 0).await;
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_times_out_without_marker_delivery() {
    let mut kv = MockKvStore::new();
    kv.expect_watch_tree()
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    // one marker per retry with the default budget
    kv.expect_put().times(5).returning(echo_put());

    let mut settings = test_config("c1");
    settings.watch = Default::default();
    let (client, registry) = MockBuilder::new()
        .with_settings(settings)
        .with_kv(kv)
        .build_alert();

    let (cb, events) = recording_alert_watcher();
    let started = tokio::time::Instant::now();
    let res = client.watch("c1", cb).await;

    assert!(matches!(
        res,
        Err(Error::Watch(WatchError::BootstrapTimeout(_)))
    ));
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(registry.watcher_count(), 0);
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn test_delivery_error_during_bootstrap_fails_watch() {
    let mut kv = MockKvStore::new();
    kv.expect_watch_tree()
        .times(1)
        .returning(|_, _, _, cb| {
            tokio::spawn(
                cb("pwx/c1/alert/".to_string(), Err(KvError::WatchClosed)).map(|_| ()),
            );
            Ok(())
        });
    kv.expect_put().returning(echo_put());

    let (client, registry) = MockBuilder::new().with_kv(kv).build_alert();
    let (cb, _) = recording_alert_watcher();

    assert!(matches!(
        client.watch("c1", cb).await,
        Err(Error::Watch(WatchError::Failed(_)))
    ));
    assert_eq!(registry.watcher_count(), 0);
}

#[tokio::test]
async fn test_unknown_cluster_or_session_is_rejected() {
    let registry = Arc::new(Registry::new());
    let kvp = KvPair {
        key: "alert/volume/0".to_string(),
        value: b"{}".to_vec(),
        action: KvAction::Create,
        create_index: 1,
        modified_index: 1,
        ttl: 0,
    };

    let res = kv_watch(
        registry,
        "session".to_string(),
        "pwx/c1/alert/".to_string(),
        Ok(kvp.clone()),
    )
    .await;
    assert!(matches!(res, Err(Error::Watch(WatchError::NotRegistered(_)))));

    let w = watched_client().await;
    let res = kv_watch(
        w.registry.clone(),
        "stale".to_string(),
        "pwx/c1/alert/".to_string(),
        Ok(kvp),
    )
    .await;
    assert!(matches!(res, Err(Error::Watch(WatchError::Stopped(_)))));
}
