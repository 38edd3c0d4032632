use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Lifecycle state of a cluster or of one of its nodes.
///
/// Persisted as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Status {
    #[default]
    None,
    Init,
    Ok,
    Offline,
    Error,
    NotInQuorum,
    Decommission,
    Maintenance,
    StorageDown,
    StorageDegraded,
    NeedsReboot,
    StorageRebalance,
    StorageDriveReplace,
}

impl From<Status> for i32 {
    fn from(s: Status) -> Self {
        match s {
            Status::None => 0,
            Status::Init => 1,
            Status::Ok => 2,
            Status::Offline => 3,
            Status::Error => 4,
            Status::NotInQuorum => 5,
            Status::Decommission => 6,
            Status::Maintenance => 7,
            Status::StorageDown => 8,
            Status::StorageDegraded => 9,
            Status::NeedsReboot => 10,
            Status::StorageRebalance => 11,
            Status::StorageDriveReplace => 12,
        }
    }
}

impl TryFrom<i32> for Status {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, <Self as TryFrom<i32>>::Error> {
        Ok(match code {
            0 => Status::None,
            1 => Status::Init,
            2 => Status::Ok,
            3 => Status::Offline,
            4 => Status::Error,
            5 => Status::NotInQuorum,
            6 => Status::Decommission,
            7 => Status::Maintenance,
            8 => Status::StorageDown,
            9 => Status::StorageDegraded,
            10 => Status::NeedsReboot,
            11 => Status::StorageRebalance,
            12 => Status::StorageDriveReplace,
            other => return Err(format!("unknown status code {other}")),
        })
    }
}

impl fmt::Display for Status {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Status::None => "STATUS_NONE",
            Status::Init => "STATUS_INIT",
            Status::Ok => "STATUS_OK",
            Status::Offline => "STATUS_OFFLINE",
            Status::Error => "STATUS_ERROR",
            Status::NotInQuorum => "STATUS_NOT_IN_QUORUM",
            Status::Decommission => "STATUS_DECOMMISSION",
            Status::Maintenance => "STATUS_MAINTENANCE",
            Status::StorageDown => "STATUS_STORAGE_DOWN",
            Status::StorageDegraded => "STATUS_STORAGE_DEGRADED",
            Status::NeedsReboot => "STATUS_NEEDS_REBOOT",
            Status::StorageRebalance => "STATUS_STORAGE_REBALANCE",
            Status::StorageDriveReplace => "STATUS_STORAGE_DRIVE_REPLACE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeEntry {
    pub id: String,
    pub mgmt_ip: String,
    pub data_ip: String,
    pub gen_number: u64,
    /// RFC 3339 start time as written by the node
    pub start_time: String,
    pub hostname: String,
    pub status: Status,
    pub node_labels: HashMap<String, String>,
}

/// Cluster-wide descriptor stored under [`crate::constants::CLUSTER_DB_KEY`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterInfo {
    pub id: String,
    pub size: i32,
    pub status: Status,
    pub node_entries: HashMap<String, NodeEntry>,
}

impl Default for ClusterInfo {
    /// The uninitialized descriptor
    fn default() -> Self {
        Self {
            id: String::new(),
            size: 0,
            status: Status::Init,
            node_entries: HashMap::new(),
        }
    }
}

impl ClusterInfo {
    pub fn is_uninitialized(&self) -> bool {
        self.status == Status::Init && self.node_entries.is_empty()
    }
}
