use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::KvPair;
use super::KvStore;
use super::WatchCb;
use crate::KvError;
use crate::Result;

/// Buffers every mutation under a prefix from a given index on, so a reader of
/// a snapshot can catch up with what happened after it was taken.
pub struct UpdatesCollector {
    prefix: String,
    updates: Arc<Mutex<Vec<KvPair>>>,
    failure: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
}

impl UpdatesCollector {
    /// Starts collecting mutations with `modified_index >= since_index`
    pub async fn start(
        store: &dyn KvStore,
        prefix: &str,
        since_index: u64,
    ) -> Result<Self> {
        let updates: Arc<Mutex<Vec<KvPair>>> = Arc::new(Mutex::new(Vec::new()));
        let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let sink = updates.clone();
        let failed = failure.clone();
        let cb: WatchCb = Arc::new(move |prefix: String, update: std::result::Result<KvPair, KvError>| {
            match update {
                Ok(kvp) => sink.lock().push(kvp),
                Err(e) => {
                    warn!(prefix = %prefix, "updates collector lost its watch: {}", e);
                    *failed.lock() = Some(e.to_string());
                }
            }
            futures::future::ready(Ok(())).boxed()
        });

        store
            .watch_tree(prefix, since_index, cancel.clone(), cb)
            .await?;
        debug!(prefix, since_index, "updates collector started");

        Ok(Self {
            prefix: prefix.to_string(),
            updates,
            failure,
            cancel,
        })
    }

    /// Hands buffered mutations to `f` in commit order.
    ///
    /// Returns the index of the last replayed mutation, or 0 if none.
    pub fn replay_updates<F>(
        &self,
        mut f: F,
    ) -> Result<u64>
    where
        F: FnMut(&KvPair) -> Result<()>,
    {
        let updates = std::mem::take(&mut *self.updates.lock());
        let mut last_index = 0;
        for kvp in &updates {
            f(kvp)?;
            last_index = kvp.modified_index;
        }
        Ok(last_index)
    }

    /// Takes the buffered mutations without replaying them
    pub fn drain(&self) -> Vec<KvPair> {
        std::mem::take(&mut *self.updates.lock())
    }

    /// Delivery error that ended collection, if any
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!(prefix = %self.prefix, "updates collector stopped");
            self.cancel.cancel();
        }
    }
}

impl Drop for UpdatesCollector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
