use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use super::types::next_alert_id_key;
use crate::metrics::ALERT_ID_CAS_CONFLICTS;
use crate::utils::retry_with_backoff;
use crate::utils::Attempt;
use crate::AlertError;
use crate::BackoffPolicy;
use crate::KvError;
use crate::KvPair;
use crate::KvStore;
use crate::KvStoreExt;
use crate::Result;

/// Hands out alert ids from a counter key holding the next id.
///
/// Ids are unique per namespace and never reused. Callers racing on the
/// counter retry their compare-and-set, so the order in which racing callers
/// receive ids is unspecified.
pub struct IdAllocator {
    kv: Arc<dyn KvStore>,
    policy: BackoffPolicy,
}

impl IdAllocator {
    pub fn new(
        kv: Arc<dyn KvStore>,
        policy: BackoffPolicy,
    ) -> Self {
        Self { kv, policy }
    }

    pub async fn next_id(&self) -> Result<i64> {
        let key = next_alert_id_key();

        match self.kv.create(&key, b"1".to_vec(), 0).await {
            Ok(_) => return Ok(0),
            Err(e) => debug!("alert id counter present ({}), bumping it", e),
        }

        let kv = self.kv.as_ref();
        let key = key.as_str();
        retry_with_backoff(self.policy, || bump_counter(kv, key)).await
    }
}

/// One read-then-compare-and-set round on the counter
async fn bump_counter(
    kv: &dyn KvStore,
    key: &str,
) -> Result<Attempt<i64>> {
    let (kvp, current): (KvPair, i64) = kv.get_val(key).await.map_err(|e| {
        warn!("Could not read alert id counter: {}", e);
        AlertError::NotInitialized
    })?;

    let prev_value = kvp.value.clone();
    let next = KvPair {
        value: (current + 1).to_string().into_bytes(),
        ..kvp
    };
    match kv.compare_and_set(next, prev_value).await {
        Ok(_) => Ok(Attempt::Done(current)),
        Err(KvError::ValueMismatch) => {
            ALERT_ID_CAS_CONFLICTS.inc();
            Ok(Attempt::Retry)
        }
        Err(e) => Err(e.into()),
    }
}
