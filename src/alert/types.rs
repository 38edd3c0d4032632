use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::ALERT_KEY;
use crate::constants::CLUSTER_PARTITION;
use crate::constants::DRIVE_PARTITION;
use crate::constants::NEXT_ALERT_ID_KEY;
use crate::constants::NODE_PARTITION;
use crate::constants::SUBSCRIPTIONS_KEY;
use crate::constants::VOLUME_PARTITION;

/// Kind of resource an alert is raised against. Selects the key partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ResourceType {
    #[default]
    None,
    Volume,
    Node,
    Cluster,
    Drive,
}

impl ResourceType {
    /// Partitions scanned when no resource type is given, in scan order
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Node,
        ResourceType::Volume,
        ResourceType::Cluster,
        ResourceType::Drive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::None => "none",
            ResourceType::Volume => "volume",
            ResourceType::Node => "node",
            ResourceType::Cluster => "cluster",
            ResourceType::Drive => "drive",
        }
    }
}

impl From<ResourceType> for i32 {
    fn from(r: ResourceType) -> Self {
        match r {
            ResourceType::None => 0,
            ResourceType::Volume => 1,
            ResourceType::Node => 2,
            ResourceType::Cluster => 3,
            ResourceType::Drive => 4,
        }
    }
}

impl TryFrom<i32> for ResourceType {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, <Self as TryFrom<i32>>::Error> {
        Ok(match code {
            0 => ResourceType::None,
            1 => ResourceType::Volume,
            2 => ResourceType::Node,
            3 => ResourceType::Cluster,
            4 => ResourceType::Drive,
            other => return Err(format!("unknown resource type {other}")),
        })
    }
}

/// Lower codes are more severe, `None` means "unset"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Severity {
    #[default]
    None,
    Alarm,
    Warning,
    Notify,
}

impl From<Severity> for i32 {
    fn from(s: Severity) -> Self {
        match s {
            Severity::None => 0,
            Severity::Alarm => 1,
            Severity::Warning => 2,
            Severity::Notify => 3,
        }
    }
}

impl TryFrom<i32> for Severity {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, <Self as TryFrom<i32>>::Error> {
        Ok(match code {
            0 => Severity::None,
            1 => Severity::Alarm,
            2 => Severity::Warning,
            3 => Severity::Notify,
            other => return Err(format!("unknown severity {other}")),
        })
    }
}

/// What happened to an alert, as reported to watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AlertAction {
    /// Also sent once, with no alert, when a watch stops for good
    #[default]
    None,
    Create,
    Delete,
    Update,
}

impl AlertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertAction::None => "none",
            AlertAction::Create => "create",
            AlertAction::Delete => "delete",
            AlertAction::Update => "update",
        }
    }
}

impl fmt::Display for AlertAction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AlertAction> for i32 {
    fn from(a: AlertAction) -> Self {
        match a {
            AlertAction::None => 0,
            AlertAction::Create => 1,
            AlertAction::Delete => 2,
            AlertAction::Update => 3,
        }
    }
}

impl TryFrom<i32> for AlertAction {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, <Self as TryFrom<i32>>::Error> {
        Ok(match code {
            0 => AlertAction::None,
            1 => AlertAction::Create,
            2 => AlertAction::Delete,
            3 => AlertAction::Update,
            other => return Err(format!("unknown alert action {other}")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    pub id: i64,
    pub severity: Severity,
    /// Subscriptions are keyed by this
    pub alert_type: i64,
    pub message: String,
    /// Unix seconds, stamped at raise time
    pub timestamp: i64,
    pub resource_id: String,
    pub resource: ResourceType,
    pub cleared: bool,
    /// Seconds, 0 for none
    pub ttl: u64,
}

/// `alert/<partition>/`. Anything that is not a volume, node or cluster
/// lands in the drive partition.
pub(crate) fn resource_key(resource: ResourceType) -> String {
    let partition = match resource {
        ResourceType::Volume => VOLUME_PARTITION,
        ResourceType::Node => NODE_PARTITION,
        ResourceType::Cluster => CLUSTER_PARTITION,
        ResourceType::Drive | ResourceType::None => DRIVE_PARTITION,
    };
    format!("{ALERT_KEY}{partition}")
}

pub(crate) fn alert_key(
    resource: ResourceType,
    id: i64,
) -> String {
    format!("{}{}", resource_key(resource), id)
}

pub(crate) fn next_alert_id_key() -> String {
    format!("{ALERT_KEY}{NEXT_ALERT_ID_KEY}")
}

pub(crate) fn subscriptions_key(alert_type: i64) -> String {
    format!("{ALERT_KEY}{SUBSCRIPTIONS_KEY}/{alert_type}")
}
