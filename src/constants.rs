// -
// Persisted key layout. Must stay byte-compatible with existing deployments.

/// Cluster descriptor key
pub const CLUSTER_DB_KEY: &str = "cluster/database";

/// Canonical "uninitialized" encoding of the cluster descriptor
pub(crate) const EMPTY_OBJECT: &[u8] = b"{}";

pub const ALERT_KEY: &str = "alert/";
pub(crate) const SUBSCRIPTIONS_KEY: &str = "subscriptions";
pub(crate) const NEXT_ALERT_ID_KEY: &str = "nextAlertId";
pub(crate) const BOOTSTRAP_KEY: &str = "bootstrap";
pub(crate) const CLUSTER_PARTITION: &str = "cluster/";
pub(crate) const VOLUME_PARTITION: &str = "volume/";
pub(crate) const NODE_PARTITION: &str = "node/";
pub(crate) const DRIVE_PARTITION: &str = "drive/";

/// Text every backend uses to report a missing key
pub(crate) const KEY_NOT_FOUND: &str = "Key not found";

// -
// Alert drivers

/// Name of the kv backed alert driver
pub const ALERT_KVDB: &str = "alert_kvdb";
/// Same driver, registered under the name unit tests use
pub const ALERT_KVDB_TEST: &str = "alert_kvdb_test";

/// Guard against subscription cycles
pub(crate) const MAX_SUBSCRIPTION_DEPTH: usize = 16;

// -
// KV engines

pub const MEM_ENGINE: &str = "kv-mem";
pub const SLED_ENGINE: &str = "kv-sled";

/// Sled tree holding the namespaced entries
pub(crate) const SLED_DATA_TREE: &str = "_kv_data";
/// Sled tree holding engine metadata
pub(crate) const SLED_META_TREE: &str = "_kv_meta";
pub(crate) const SLED_META_KEY_REVISION: &str = "_kv_revision";
