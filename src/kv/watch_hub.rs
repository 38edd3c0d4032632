//! Fan-out of committed mutations to prefix watchers.
//!
//! The backend publishes every mutation while it still holds its write lock,
//! so subscribers observe commit order. A bounded history lets a watcher start
//! from an older index without a gap between replay and live delivery.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;
use tracing::warn;

use super::KvPair;
use crate::KvError;

struct Subscriber {
    prefix: String,
    sender: mpsc::Sender<KvPair>,
    lagged: Arc<AtomicBool>,
}

struct HubState {
    history: VecDeque<KvPair>,
    last_index: u64,
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
}

/// Receiving end of a hub subscription
pub(crate) struct Subscription {
    pub(crate) id: u64,
    pub(crate) receiver: mpsc::Receiver<KvPair>,
    /// Set when the hub dropped this subscriber because its buffer was full
    pub(crate) lagged: Arc<AtomicBool>,
}

pub(crate) struct WatchHub {
    state: Mutex<HubState>,
    history_size: usize,
    buffer_size: usize,
}

impl WatchHub {
    pub(crate) fn new(
        last_index: u64,
        history_size: usize,
        buffer_size: usize,
    ) -> Self {
        Self {
            state: Mutex::new(HubState {
                history: VecDeque::with_capacity(history_size.min(1024)),
                last_index,
                subscribers: HashMap::new(),
                next_id: 1,
            }),
            history_size,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Records `kvp` (fully namespaced key) and hands it to matching subscribers.
    pub(crate) fn publish(
        &self,
        kvp: KvPair,
    ) {
        let mut state = self.state.lock();
        state.last_index = kvp.modified_index;

        state.subscribers.retain(|id, sub| {
            if !kvp.key.starts_with(&sub.prefix) {
                return true;
            }
            match sub.sender.try_send(kvp.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        watcher_id = id,
                        prefix = %sub.prefix,
                        "watch subscriber lagged, dropping it"
                    );
                    sub.lagged.store(true, Ordering::SeqCst);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });

        if self.history_size > 0 {
            if state.history.len() == self.history_size {
                state.history.pop_front();
            }
            state.history.push_back(kvp);
        }
    }

    /// Registers a subscriber for keys under `prefix`.
    ///
    /// With a non-zero `start_index`, retained mutations at or after it are
    /// queued before any live mutation.
    pub(crate) fn subscribe(
        &self,
        prefix: &str,
        start_index: u64,
    ) -> Result<Subscription, KvError> {
        let mut state = self.state.lock();

        let replay: Vec<KvPair> = if start_index == 0 {
            Vec::new()
        } else {
            let oldest = state
                .history
                .front()
                .map(|p| p.modified_index)
                .unwrap_or(state.last_index + 1);
            if start_index < oldest {
                return Err(KvError::IndexCompacted {
                    requested: start_index,
                    oldest,
                });
            }
            state
                .history
                .iter()
                .filter(|p| p.modified_index >= start_index && p.key.starts_with(prefix))
                .cloned()
                .collect()
        };

        let (sender, receiver) = mpsc::channel(self.buffer_size + replay.len());
        for kvp in replay {
            // capacity covers the whole replay
            let _ = sender.try_send(kvp);
        }

        let id = state.next_id;
        state.next_id += 1;
        let lagged = Arc::new(AtomicBool::new(false));
        state.subscribers.insert(
            id,
            Subscriber {
                prefix: prefix.to_string(),
                sender,
                lagged: lagged.clone(),
            },
        );
        trace!(watcher_id = id, prefix, start_index, "watch subscriber registered");

        Ok(Subscription {
            id,
            receiver,
            lagged,
        })
    }

    pub(crate) fn unsubscribe(
        &self,
        id: u64,
    ) {
        if self.state.lock().subscribers.remove(&id).is_some() {
            trace!(watcher_id = id, "watch subscriber removed");
        }
    }

    /// Drops every subscriber; their deliveries end with `WatchClosed`.
    pub(crate) fn close(&self) {
        self.state.lock().subscribers.clear();
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}
