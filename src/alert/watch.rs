//! Per-cluster alert watch sessions.
//!
//! A session subscribes to the whole alert prefix of a cluster, proves the
//! subscription is live with a bootstrap handshake, then turns kv mutations
//! into alert events for the registered callback. Delivery errors on a ready
//! session trigger one resubscription each, up to a consecutive error budget.

use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Alert;
use super::AlertAction;
use super::Registry;
use crate::constants::ALERT_KEY;
use crate::constants::BOOTSTRAP_KEY;
use crate::constants::NEXT_ALERT_ID_KEY;
use crate::constants::SUBSCRIPTIONS_KEY;
use crate::metrics::WATCH_ERRORS;
use crate::metrics::WATCH_EVENTS;
use crate::utils::get_now_as_nanos;
use crate::AlertError;
use crate::KvAction;
use crate::KvError;
use crate::KvPair;
use crate::KvStore;
use crate::KvStoreExt;
use crate::Result;
use crate::WatchCb;
use crate::WatchConfig;
use crate::WatchError;

/// Alert event handler: `(alert, action, watched prefix, key)`.
///
/// Deletions and expirations carry no alert. A final call with no alert and
/// [`AlertAction::None`] means the watch stopped for good.
pub type AlertWatcherFn =
    Arc<dyn Fn(Option<&Alert>, AlertAction, &str, &str) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    /// Subscribed, waiting to see the bootstrap marker
    Bootstrap,
    Ready,
    /// Terminal
    Error,
}

pub struct Watcher {
    cluster_id: String,
    session_id: String,
    kv: Arc<dyn KvStore>,
    cb: AlertWatcherFn,
    status: watch::Sender<WatcherStatus>,
    consecutive_errors: AtomicU32,
    max_consecutive_errors: u32,
    session: CancellationToken,
}

impl fmt::Debug for Watcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("cluster_id", &self.cluster_id)
            .field("session_id", &self.session_id)
            .field("status", &self.status())
            .finish()
    }
}

impl Watcher {
    pub(crate) fn new(
        cluster_id: &str,
        kv: Arc<dyn KvStore>,
        cb: AlertWatcherFn,
        max_consecutive_errors: u32,
    ) -> Self {
        let (status, _) = watch::channel(WatcherStatus::Bootstrap);
        Self {
            cluster_id: cluster_id.to_string(),
            session_id: nanoid::nanoid!(),
            kv,
            cb,
            status,
            consecutive_errors: AtomicU32::new(0),
            max_consecutive_errors,
            session: CancellationToken::new(),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> WatcherStatus {
        *self.status.borrow()
    }

    fn set_status(
        &self,
        status: WatcherStatus,
    ) {
        let prev = self.status.send_replace(status);
        if prev != status {
            debug!(
                cluster_id = %self.cluster_id,
                session = %self.session_id,
                ?prev,
                ?status,
                "watcher status changed"
            );
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    /// Cancels every subscription of this session
    pub fn stop(&self) {
        self.session.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.session.is_cancelled()
    }
}

/// `<domain>/<cluster_id>/alert/` -> `cluster_id`
pub(crate) fn cluster_id_from_prefix(prefix: &str) -> Option<&str> {
    let segments: Vec<&str> = prefix.split('/').collect();
    let alert = ALERT_KEY.trim_end_matches('/');
    let pos = segments.iter().rposition(|s| *s == alert)?;
    pos.checked_sub(1).map(|i| segments[i]).filter(|s| !s.is_empty())
}

/// Subscribes the cluster's current watcher to the alert prefix, from now on.
pub(crate) fn subscribe_watch(
    registry: Arc<Registry>,
    cluster_id: String,
) -> BoxFuture<'static, Result<()>> {
    async move {
        let watcher = registry
            .watcher(&cluster_id)
            .ok_or_else(|| WatchError::NotRegistered(cluster_id.clone()))?;

        let reg = registry.clone();
        let session_id = watcher.session_id.clone();
        let cb: WatchCb = Arc::new(
            move |prefix: String, update: std::result::Result<KvPair, KvError>| {
                kv_watch(reg.clone(), session_id.clone(), prefix, update).boxed()
            },
        );

        watcher
            .kv
            .watch_tree(ALERT_KEY, 0, watcher.session.child_token(), cb)
            .await?;
        trace!(cluster_id = %cluster_id, session = %watcher.session_id, "alert prefix subscribed");
        Ok(())
    }
    .boxed()
}

/// Writes the bootstrap marker until the session turns ready.
pub(crate) async fn bootstrap(
    watcher: &Watcher,
    config: &WatchConfig,
) -> Result<()> {
    let key = format!("{ALERT_KEY}{BOOTSTRAP_KEY}");
    let mut status_rx = watcher.status.subscribe();
    let mut retries = 0;

    while watcher.status() == WatcherStatus::Bootstrap {
        watcher.kv.put_val(&key, &get_now_as_nanos(), 0).await?;

        let settled = timeout(
            config.bootstrap_interval(),
            status_rx.wait_for(|s| *s != WatcherStatus::Bootstrap),
        )
        .await
        .map(|r| r.is_ok());

        match settled {
            Ok(true) => break,
            Ok(false) => return Err(WatchError::Failed(watcher.cluster_id.clone()).into()),
            Err(_) => {
                retries += 1;
                if retries == config.bootstrap_retries {
                    warn!(
                        cluster_id = %watcher.cluster_id,
                        retries,
                        "watch bootstrap timed out"
                    );
                    return Err(WatchError::BootstrapTimeout(watcher.cluster_id.clone()).into());
                }
            }
        }
    }

    if watcher.status() != WatcherStatus::Ready {
        return Err(WatchError::Failed(watcher.cluster_id.clone()).into());
    }
    info!(
        cluster_id = %watcher.cluster_id,
        session = %watcher.session_id,
        "alert watch ready"
    );
    Ok(())
}

fn is_bookkeeping_key(key: &str) -> bool {
    key.ends_with(NEXT_ALERT_ID_KEY) || key.contains(SUBSCRIPTIONS_KEY)
}

/// Kv watch callback shared by every alert watch session.
///
/// Deliveries of a replaced session fail, which ends their subscription.
/// Events that fail to decode or to reach the callback are logged and skipped.
pub(crate) async fn kv_watch(
    registry: Arc<Registry>,
    session_id: String,
    prefix: String,
    update: std::result::Result<KvPair, KvError>,
) -> Result<()> {
    let cluster_id = cluster_id_from_prefix(&prefix)
        .ok_or_else(|| WatchError::NotRegistered(prefix.clone()))?
        .to_string();
    let watcher = registry
        .watcher(&cluster_id)
        .ok_or_else(|| WatchError::NotRegistered(cluster_id.clone()))?;

    if watcher.session_id != session_id
        || watcher.status() == WatcherStatus::Error
        || watcher.is_stopped()
    {
        return Err(WatchError::Stopped(cluster_id).into());
    }

    let kvp = match update {
        Ok(kvp) if kvp.key.ends_with(BOOTSTRAP_KEY) => {
            if watcher.status() == WatcherStatus::Bootstrap {
                watcher.set_status(WatcherStatus::Ready);
            }
            return Ok(());
        }
        Ok(kvp) => kvp,
        Err(e) => return on_delivery_error(registry, &watcher, &prefix, e).await,
    };

    if is_bookkeeping_key(&kvp.key) {
        return Ok(());
    }
    watcher.consecutive_errors.store(0, Ordering::SeqCst);

    // a bad event is dropped, the subscription stays up
    if let Err(e) = deliver_event(&watcher, &prefix, &kvp) {
        WATCH_ERRORS.with_label_values(&[&watcher.cluster_id]).inc();
        warn!(
            cluster_id = %watcher.cluster_id,
            key = %kvp.key,
            "alert event dropped: {}",
            e
        );
    }
    Ok(())
}

fn deliver_event(
    watcher: &Watcher,
    prefix: &str,
    kvp: &KvPair,
) -> Result<()> {
    let action = match kvp.action {
        KvAction::Delete | KvAction::Expire => {
            return dispatch(watcher, None, AlertAction::Delete, prefix, &kvp.key);
        }
        KvAction::Create => AlertAction::Create,
        KvAction::Set => AlertAction::Update,
        other => return Err(WatchError::UnhandledAction(other).into()),
    };

    let alert: Alert = serde_json::from_slice(&kvp.value).map_err(|e| {
        warn!(key = %kvp.key, "Failed to unmarshal Alert: {}", e);
        AlertError::Unmarshal
    })?;
    dispatch(watcher, Some(&alert), action, prefix, &kvp.key)
}

fn dispatch(
    watcher: &Watcher,
    alert: Option<&Alert>,
    action: AlertAction,
    prefix: &str,
    key: &str,
) -> Result<()> {
    WATCH_EVENTS.with_label_values(&[action.as_str()]).inc();
    (watcher.cb)(alert, action, prefix, key)
}

async fn on_delivery_error(
    registry: Arc<Registry>,
    watcher: &Watcher,
    prefix: &str,
    err: KvError,
) -> Result<()> {
    WATCH_ERRORS.with_label_values(&[&watcher.cluster_id]).inc();

    if watcher.status() == WatcherStatus::Bootstrap {
        warn!(cluster_id = %watcher.cluster_id, "watch failed during bootstrap: {}", err);
        watcher.set_status(WatcherStatus::Error);
        return Err(err.into());
    }

    let errors = watcher.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
    if errors >= watcher.max_consecutive_errors {
        warn!(
            "Too many watch errors for key ({}). Error: {}. Stopping the watch!!",
            watcher.cluster_id, err
        );
        watcher.set_status(WatcherStatus::Error);
        if let Err(e) = (watcher.cb)(None, AlertAction::None, prefix, "") {
            debug!("watch callback failed on stop notification: {:?}", e);
        }
        watcher.stop();
        return Err(WatchError::PermanentFailure {
            cluster_id: watcher.cluster_id.clone(),
            errors,
        }
        .into());
    }

    if let Err(e) = subscribe_watch(registry, watcher.cluster_id.clone()).await {
        warn!("Failed to resubscribe : {}", e);
    }
    Err(err.into())
}
