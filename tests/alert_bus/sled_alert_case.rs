//! Alerts raised on a sled backed store survive a restart of the bus.

use std::sync::Arc;

use d_alert::constants::ALERT_KVDB;
use d_alert::Alert;
use d_alert::AlertBus;
use d_alert::KvBackend;
use d_alert::Registry;
use d_alert::ResourceType;
use d_alert::Severity;

use crate::common::*;

fn sled_bus(backend: &KvBackend) -> AlertBus {
    let registry = Arc::new(Registry::with_factory(Arc::new(backend.clone())));
    AlertBus::with_default_drivers(registry)
}

#[tokio::test]
async fn test_alerts_survive_restart() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = sled_config(dir.path(), "c1");

    let raised_ids = {
        let backend = KvBackend::open(&config.kv).unwrap();
        let bus = sled_bus(&backend);
        let client = bus.new_client(ALERT_KVDB, &config).unwrap();

        let mut ids = Vec::new();
        for (i, resource) in [ResourceType::Volume, ResourceType::Node, ResourceType::Volume]
            .into_iter()
            .enumerate()
        {
            let mut a = alert(resource, i as i64, Severity::Alarm);
            client.raise(&mut a).await.unwrap();
            ids.push(a.id);
        }
        client.clear(ResourceType::Node, ids[1], 0).await.unwrap();

        bus.shutdown();
        backend.flush().unwrap();
        ids
    };
    assert_eq!(raised_ids, vec![0, 1, 2]);

    let backend = KvBackend::open(&config.kv).unwrap();
    let bus = sled_bus(&backend);
    let client = bus.new_client(ALERT_KVDB, &config).unwrap();

    let volumes = client
        .enumerate(&Alert {
            resource: ResourceType::Volume,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(volumes.iter().map(|a| a.id).collect::<Vec<_>>(), vec![0, 2]);
    assert!(client.retrieve(ResourceType::Node, 1).await.unwrap().cleared);

    // the id counter continues where it stopped
    let mut next = alert(ResourceType::Cluster, 9, Severity::Notify);
    client.raise(&mut next).await.unwrap();
    assert_eq!(next.id, 3);
}

#[tokio::test]
async fn test_clusters_share_a_backend_without_sharing_alerts() {
    let dir = tempfile::tempdir().unwrap();
    let backend = KvBackend::open(&sled_config(dir.path(), "c1").kv).unwrap();
    let bus = sled_bus(&backend);

    let c1 = bus
        .new_client(ALERT_KVDB, &sled_config(dir.path(), "c1"))
        .unwrap();
    let c2 = bus
        .new_client(ALERT_KVDB, &sled_config(dir.path(), "c2"))
        .unwrap();

    let mut a = alert(ResourceType::Drive, 1, Severity::Warning);
    c1.raise(&mut a).await.unwrap();
    let mut b = alert(ResourceType::Drive, 1, Severity::Warning);
    c2.raise(&mut b).await.unwrap();
    // each namespace has its own id counter
    assert_eq!((a.id, b.id), (0, 0));

    let from_c1 = c1.enumerate_by_cluster("c2", &Alert::default()).await.unwrap();
    assert_eq!(from_c1, vec![b]);
    assert_eq!(c2.enumerate(&Alert::default()).await.unwrap().len(), 1);
}
