use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Cluster this process raises and watches alerts for
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    /// Alert driver the daemon asks the bus for
    #[serde(default = "default_driver")]
    pub alert_driver: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_id: default_cluster_id(),
            alert_driver: default_driver(),
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.is_empty() {
            return Err(invalid("cluster_id cannot be empty"));
        }
        // cluster id is a single path segment of the kv namespace
        if self.cluster_id.contains('/') {
            return Err(invalid(format!(
                "cluster_id {} must not contain '/'",
                self.cluster_id
            )));
        }
        if self.alert_driver.is_empty() {
            return Err(invalid("alert_driver cannot be empty"));
        }
        Ok(())
    }
}

fn default_cluster_id() -> String {
    "default".to_string()
}
fn default_driver() -> String {
    crate::constants::ALERT_KVDB.to_string()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
