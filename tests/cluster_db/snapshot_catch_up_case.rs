//! A joining node reads the cluster database from a snapshot, catches up with
//! concurrent writers and continues with a live watch without gaps.

use std::collections::HashMap;
use std::sync::Arc;

use d_alert::constants::CLUSTER_DB_KEY;
use d_alert::ClusterInfo;
use d_alert::ClusterStore;
use d_alert::KvBackend;
use d_alert::KvError;
use d_alert::KvFactory;
use d_alert::KvPair;
use d_alert::NodeEntry;
use d_alert::Status;
use d_alert::WatchCb;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::common::*;

fn descriptor(size: i32) -> ClusterInfo {
    let node_entries: HashMap<String, NodeEntry> = (0..size)
        .map(|i| {
            let id = format!("node-{i}");
            let entry = NodeEntry {
                id: id.clone(),
                mgmt_ip: format!("192.168.0.{}", i + 10),
                status: Status::Ok,
                ..Default::default()
            };
            (id, entry)
        })
        .collect();
    ClusterInfo {
        id: "c1".to_string(),
        size,
        status: Status::Ok,
        node_entries,
    }
}

#[tokio::test]
async fn test_join_reads_snapshot_then_follows_live_updates() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = sled_config(dir.path(), "c1");
    let backend = KvBackend::open(&config.kv).unwrap();
    let kv = KvFactory::open(&backend, &config.kv.namespace("c1")).unwrap();
    let store = ClusterStore::new(kv.clone());

    assert!(store.read_cluster_info().await.unwrap().is_uninitialized());
    store.write_cluster_info(&descriptor(1)).await.unwrap();

    let state = store.snap_and_read_cluster_info().await.unwrap();
    assert_eq!(state.cluster_info.size, 1);

    // writers keep going while the joiner works off its snapshot
    let writer = ClusterStore::new(kv.clone());
    writer.write_cluster_info(&descriptor(2)).await.unwrap();
    writer.write_cluster_info(&descriptor(3)).await.unwrap();
    wait_until("writes committed", || backend.revision() == 3).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (info, next_index) = state.catch_up().unwrap();
    assert_eq!(info, descriptor(3));
    assert_eq!(next_index, 4);

    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: WatchCb = Arc::new(move |_prefix: String, update: Result<KvPair, KvError>| {
        if let Ok(kvp) = update {
            sink.lock().push(kvp.modified_index);
        }
        futures::future::ready(Ok(())).boxed()
    });
    kv.watch_tree(CLUSTER_DB_KEY, next_index, CancellationToken::new(), cb)
        .await
        .unwrap();

    writer.write_cluster_info(&descriptor(4)).await.unwrap();
    wait_until("live update", || !seen.lock().is_empty()).await;
    assert_eq!(*seen.lock(), vec![4]);
    assert_eq!(store.read_cluster_info().await.unwrap(), descriptor(4));
}
