//! Cluster database access.
//!
//! The descriptor lives under a single key of the cluster namespace. A node
//! joining a running cluster reads it through [`ClusterStore::snap_and_read_cluster_info`],
//! which pairs a snapshot with an updates collector anchored at the snapshot
//! version, so nothing written between the read and the start of a live watch
//! is lost or applied twice.

use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ClusterInfo;
use crate::constants::CLUSTER_DB_KEY;
use crate::constants::EMPTY_OBJECT;
use crate::ClusterError;
use crate::Error;
use crate::KvAction;
use crate::KvError;
use crate::KvPair;
use crate::KvSnapshot;
use crate::KvStore;
use crate::Result;
use crate::UpdatesCollector;

/// Transient bootstrap handle returned by [`ClusterStore::snap_and_read_cluster_info`]
pub struct ClusterInitState {
    pub cluster_info: ClusterInfo,
    pub init_db: KvSnapshot,
    pub version: u64,
    pub collector: UpdatesCollector,
}

impl ClusterInitState {
    /// Stops the collector and applies what it buffered to the frozen descriptor.
    ///
    /// Returns the up to date descriptor and the index a live watch must start from.
    pub fn catch_up(self) -> Result<(ClusterInfo, u64)> {
        let ClusterInitState {
            mut cluster_info,
            version,
            collector,
            ..
        } = self;

        collector.stop();
        if let Some(reason) = collector.failure() {
            error!("Updates collector for cluster db failed: {}", reason);
            return Err(Error::Fatal(format!(
                "cluster db updates collector failed: {reason}"
            )));
        }

        let last_index = collector.replay_updates(|kvp| {
            if kvp.key == CLUSTER_DB_KEY {
                cluster_info = apply_update(kvp)?;
            }
            Ok(())
        })?;

        let next_index = version.max(last_index + 1);
        debug!(version, last_index, next_index, "cluster db caught up");
        Ok((cluster_info, next_index))
    }
}

fn apply_update(kvp: &KvPair) -> Result<ClusterInfo> {
    match kvp.action {
        KvAction::Delete | KvAction::Expire => {
            info!("Cluster database removed, cluster is uninitialized");
            Ok(ClusterInfo::default())
        }
        _ => decode_cluster_info(Some(kvp)),
    }
}

/// Absent or `{}` means uninitialized; anything else must decode.
fn decode_cluster_info(kvp: Option<&KvPair>) -> Result<ClusterInfo> {
    let kvp = match kvp {
        Some(kvp) if kvp.value != EMPTY_OBJECT => kvp,
        _ => {
            info!("Cluster is uninitialized...");
            return Ok(ClusterInfo::default());
        }
    };

    serde_json::from_slice(&kvp.value).map_err(|e| {
        warn!("Fatal, Could not parse cluster database {:?}: {}", kvp.key, e);
        ClusterError::Decode(e).into()
    })
}

fn absent_as_none(res: std::result::Result<KvPair, KvError>) -> Result<Option<KvPair>> {
    match res {
        Ok(kvp) => Ok(Some(kvp)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => {
            warn!("Warning, could not read cluster database: {}", e);
            Err(e.into())
        }
    }
}

#[derive(Clone)]
pub struct ClusterStore {
    kv: Arc<dyn KvStore>,
}

impl ClusterStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Single shot read of the descriptor.
    ///
    /// A descriptor that fails to decode comes back as
    /// [`ClusterError::Decode`] with no partial state.
    pub async fn read_cluster_info(&self) -> Result<ClusterInfo> {
        let kvp = absent_as_none(self.kv.get(CLUSTER_DB_KEY).await)?;
        decode_cluster_info(kvp.as_ref())
    }

    /// Reads the descriptor from a fresh snapshot and starts collecting every
    /// mutation made from the snapshot version on.
    ///
    /// On a decode failure the collector is stopped and only the error is
    /// returned, as for [`ClusterStore::read_cluster_info`].
    pub async fn snap_and_read_cluster_info(&self) -> Result<ClusterInitState> {
        let (snap, version) = self.kv.snapshot("").await.map_err(|e| {
            error!("Snapshot failed for cluster db: {}", e);
            e
        })?;
        info!("Cluster db snapshot at: {}", version);

        let collector = UpdatesCollector::start(self.kv.as_ref(), "", version)
            .await
            .map_err(|e| {
                error!("Failed to start collector for cluster db: {:?}", e);
                e
            })?;

        let cluster_info = match absent_as_none(snap.get(CLUSTER_DB_KEY))
            .and_then(|kvp| decode_cluster_info(kvp.as_ref()))
        {
            Ok(info) => info,
            Err(e) => {
                collector.stop();
                return Err(e);
            }
        };

        Ok(ClusterInitState {
            cluster_info,
            init_db: snap,
            version,
            collector,
        })
    }

    /// Unconditionally overwrites the descriptor
    pub async fn write_cluster_info(
        &self,
        db: &ClusterInfo,
    ) -> Result<KvPair> {
        let bytes = serde_json::to_vec(db).map_err(|e| {
            warn!("Fatal, Could not marshal cluster database to JSON: {}", e);
            ClusterError::Encode(e)
        })?;

        let kvp = self.kv.put(CLUSTER_DB_KEY, bytes, 0).await.map_err(|e| {
            warn!("Fatal, Could not write cluster database: {}", e);
            e
        })?;

        info!("Cluster database updated.");
        Ok(kvp)
    }
}
