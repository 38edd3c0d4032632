//! Shared semantic layer over a [`KvEngine`].
//!
//! A backend owns one engine, the mutation index and the watch hub. Clusters
//! get [`KvHandle`]s scoped to their namespace; every handle on the same
//! backend sees the same mutation order.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::watch_hub::Subscription;
use super::watch_hub::WatchHub;
use super::KvAction;
use super::KvEngine;
use super::KvFactory;
use super::KvPair;
use super::KvSnapshot;
use super::KvStore;
use super::MemKvEngine;
use super::SledKvEngine;
use super::StoredEntry;
use super::WatchCb;
use crate::constants::MEM_ENGINE;
use crate::constants::SLED_ENGINE;
use crate::utils::get_now_as_millis;
use crate::utils::spawn_task;
use crate::KvConfig;
use crate::KvError;
use crate::Result;

struct BackendInner {
    name: String,
    engine: Arc<dyn KvEngine>,
    /// Index of the last committed mutation. Locked for the whole of every
    /// operation so engine writes and hub publication happen in one order.
    revision: Mutex<u64>,
    hub: WatchHub,
}

#[derive(Clone)]
pub struct KvBackend {
    inner: Arc<BackendInner>,
}

impl fmt::Debug for KvBackend {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("KvBackend")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl KvBackend {
    pub fn new(
        name: &str,
        engine: Arc<dyn KvEngine>,
        history_size: usize,
        buffer_size: usize,
    ) -> Result<Self> {
        let revision = engine.load_revision()?;
        info!(backend = name, revision, "kv backend opened");

        Ok(Self {
            inner: Arc::new(BackendInner {
                name: name.to_string(),
                engine,
                revision: Mutex::new(revision),
                hub: WatchHub::new(revision, history_size, buffer_size),
            }),
        })
    }

    /// Builds the engine named by `config.engine`
    pub fn open(config: &KvConfig) -> Result<Self> {
        let engine: Arc<dyn KvEngine> = match config.engine.as_str() {
            MEM_ENGINE => Arc::new(MemKvEngine::new()),
            SLED_ENGINE => {
                let path = config.machines.first().ok_or_else(|| {
                    KvError::Engine("kv-sled requires a database directory".to_string())
                })?;
                Arc::new(SledKvEngine::open(path)?)
            }
            other => return Err(KvError::UnknownEngine(other.to_string()).into()),
        };
        Self::new(
            &config.backend_key(),
            engine,
            config.watch_history_size,
            config.watch_buffer_size,
        )
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Index of the last committed mutation
    pub fn revision(&self) -> u64 {
        *self.inner.revision.lock()
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.engine.flush()?;
        Ok(())
    }

    /// Ends every active watch on this backend
    pub fn close_watches(&self) {
        self.inner.hub.close();
    }

    pub(crate) fn watcher_count(&self) -> usize {
        self.inner.hub.subscriber_count()
    }

    pub fn handle(
        &self,
        namespace: &str,
    ) -> KvHandle {
        KvHandle {
            backend: self.clone(),
            namespace: namespace.to_string(),
        }
    }
}

impl KvFactory for KvBackend {
    fn open(
        &self,
        namespace: &str,
    ) -> Result<Arc<dyn KvStore>> {
        debug!(backend = %self.inner.name, namespace, "open kv handle");
        Ok(Arc::new(self.handle(namespace)))
    }
}

fn to_pair(
    key: &str,
    entry: StoredEntry,
    action: KvAction,
) -> KvPair {
    KvPair {
        key: key.to_string(),
        value: entry.value,
        action,
        create_index: entry.create_index,
        modified_index: entry.modified_index,
        ttl: entry.ttl,
    }
}

impl BackendInner {
    /// Reads `key`, expiring it first if its ttl elapsed
    fn load_live(
        &self,
        revision: &mut u64,
        key: &str,
    ) -> std::result::Result<Option<StoredEntry>, KvError> {
        match self.engine.get(key)? {
            Some(entry) if entry.is_expired(get_now_as_millis()) => {
                self.remove(revision, key, entry, KvAction::Expire)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn scan_live(
        &self,
        revision: &mut u64,
        prefix: &str,
    ) -> std::result::Result<Vec<(String, StoredEntry)>, KvError> {
        let now = get_now_as_millis();
        let mut live = Vec::new();
        for (key, entry) in self.engine.scan_prefix(prefix)? {
            if entry.is_expired(now) {
                self.remove(revision, &key, entry, KvAction::Expire)?;
            } else {
                live.push((key, entry));
            }
        }
        Ok(live)
    }

    fn commit(
        &self,
        revision: &mut u64,
        index: u64,
    ) -> std::result::Result<(), KvError> {
        self.engine.store_revision(index)?;
        *revision = index;
        Ok(())
    }

    fn write(
        &self,
        revision: &mut u64,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
        create_index: Option<u64>,
        action: KvAction,
    ) -> std::result::Result<KvPair, KvError> {
        let index = *revision + 1;
        let entry = StoredEntry {
            value,
            create_index: create_index.unwrap_or(index),
            modified_index: index,
            ttl,
            expires_at_ms: (ttl > 0).then(|| get_now_as_millis() + ttl * 1000),
        };
        self.engine.insert(key, &entry)?;
        self.commit(revision, index)?;

        let kvp = to_pair(key, entry, action);
        trace!(key, index, ?action, "kv mutation committed");
        self.hub.publish(kvp.clone());
        Ok(kvp)
    }

    fn remove(
        &self,
        revision: &mut u64,
        key: &str,
        entry: StoredEntry,
        action: KvAction,
    ) -> std::result::Result<KvPair, KvError> {
        let index = *revision + 1;
        self.engine.remove(key)?;
        self.commit(revision, index)?;

        let kvp = KvPair {
            modified_index: index,
            ..to_pair(key, entry, action)
        };
        trace!(key, index, ?action, "kv key removed");
        self.hub.publish(kvp.clone());
        Ok(kvp)
    }
}

/// A [`KvStore`] scoped to one namespace of a [`KvBackend`].
///
/// Keys handed in and out are relative to the namespace.
#[derive(Clone, Debug)]
pub struct KvHandle {
    backend: KvBackend,
    namespace: String,
}

impl KvHandle {
    fn full_key(
        &self,
        key: &str,
    ) -> String {
        format!("{}{}", self.namespace, key)
    }

    fn relative(
        &self,
        kvp: KvPair,
    ) -> KvPair {
        strip_namespace(&self.namespace, kvp)
    }

    pub fn backend(&self) -> &KvBackend {
        &self.backend
    }
}

fn strip_namespace(
    namespace: &str,
    mut kvp: KvPair,
) -> KvPair {
    if let Some(rest) = kvp.key.strip_prefix(namespace) {
        kvp.key = rest.to_string();
    }
    kvp
}

#[async_trait]
impl KvStore for KvHandle {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(
        &self,
        key: &str,
    ) -> std::result::Result<KvPair, KvError> {
        let full = self.full_key(key);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        match inner.load_live(&mut revision, &full)? {
            Some(entry) => Ok(self.relative(to_pair(&full, entry, KvAction::Get))),
            None => Err(KvError::NotFound),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError> {
        let full = self.full_key(key);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        let kvp = match inner.load_live(&mut revision, &full)? {
            Some(existing) => inner.write(
                &mut revision,
                &full,
                value,
                ttl,
                Some(existing.create_index),
                KvAction::Set,
            )?,
            None => inner.write(&mut revision, &full, value, ttl, None, KvAction::Create)?,
        };
        Ok(self.relative(kvp))
    }

    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError> {
        let full = self.full_key(key);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        if inner.load_live(&mut revision, &full)?.is_some() {
            return Err(KvError::AlreadyExists);
        }
        let kvp = inner.write(&mut revision, &full, value, ttl, None, KvAction::Create)?;
        Ok(self.relative(kvp))
    }

    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError> {
        let full = self.full_key(key);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        let existing = inner
            .load_live(&mut revision, &full)?
            .ok_or(KvError::NotFound)?;
        let kvp = inner.write(
            &mut revision,
            &full,
            value,
            ttl,
            Some(existing.create_index),
            KvAction::Set,
        )?;
        Ok(self.relative(kvp))
    }

    async fn delete(
        &self,
        key: &str,
    ) -> std::result::Result<KvPair, KvError> {
        let full = self.full_key(key);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        let existing = inner
            .load_live(&mut revision, &full)?
            .ok_or(KvError::NotFound)?;
        let kvp = inner.remove(&mut revision, &full, existing, KvAction::Delete)?;
        Ok(self.relative(kvp))
    }

    async fn compare_and_set(
        &self,
        kvp: KvPair,
        prev_value: Vec<u8>,
    ) -> std::result::Result<KvPair, KvError> {
        let full = self.full_key(&kvp.key);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        let existing = inner
            .load_live(&mut revision, &full)?
            .ok_or(KvError::NotFound)?;
        if existing.value != prev_value {
            return Err(KvError::ValueMismatch);
        }
        let written = inner.write(
            &mut revision,
            &full,
            kvp.value,
            kvp.ttl,
            Some(existing.create_index),
            KvAction::Set,
        )?;
        Ok(self.relative(written))
    }

    async fn enumerate(
        &self,
        prefix: &str,
    ) -> std::result::Result<Vec<KvPair>, KvError> {
        let full = self.full_key(prefix);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        Ok(inner
            .scan_live(&mut revision, &full)?
            .into_iter()
            .map(|(key, entry)| self.relative(to_pair(&key, entry, KvAction::Get)))
            .collect())
    }

    async fn watch_tree(
        &self,
        prefix: &str,
        start_index: u64,
        cancel: CancellationToken,
        cb: WatchCb,
    ) -> std::result::Result<(), KvError> {
        let full_prefix = self.full_key(prefix);
        let subscription = self.backend.inner.hub.subscribe(&full_prefix, start_index)?;
        debug!(
            prefix = %full_prefix,
            start_index,
            watcher_id = subscription.id,
            "watch_tree started"
        );

        let backend = self.backend.clone();
        let namespace = self.namespace.clone();
        spawn_task(
            "kv watch delivery",
            move || deliver(backend, namespace, full_prefix, subscription, cancel, cb),
            None,
        )
        .await;
        Ok(())
    }

    async fn snapshot(
        &self,
        prefix: &str,
    ) -> std::result::Result<(KvSnapshot, u64), KvError> {
        let full = self.full_key(prefix);
        let inner = &self.backend.inner;
        let mut revision = inner.revision.lock();

        let pairs = inner
            .scan_live(&mut revision, &full)?
            .into_iter()
            .map(|(key, entry)| self.relative(to_pair(&key, entry, KvAction::Get)));
        let version = *revision + 1;
        Ok((KvSnapshot::new(prefix, version, pairs), version))
    }
}

/// Hands subscription events to `cb` until it fails, the token fires or the
/// hub drops the subscriber.
async fn deliver(
    backend: KvBackend,
    namespace: String,
    prefix: String,
    mut subscription: Subscription,
    cancel: CancellationToken,
    cb: WatchCb,
) -> Result<()> {
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                trace!(prefix = %prefix, "watch cancelled");
                break Ok(());
            }
            next = subscription.receiver.recv() => match next {
                Some(kvp) => {
                    let kvp = strip_namespace(&namespace, kvp);
                    if let Err(e) = cb(prefix.clone(), Ok(kvp)).await {
                        break Err(e);
                    }
                }
                None => {
                    let err = if subscription.lagged.load(Ordering::SeqCst) {
                        KvError::WatchLagged
                    } else {
                        KvError::WatchClosed
                    };
                    debug!(prefix = %prefix, %err, "watch delivery ended by backend");
                    // the subscription is over whatever the callback says
                    let _ = cb(prefix.clone(), Err(err)).await;
                    break Ok(());
                }
            }
        }
    };

    backend.inner.hub.unsubscribe(subscription.id);
    result
}
