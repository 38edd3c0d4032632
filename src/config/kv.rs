use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::constants::MEM_ENGINE;
use crate::constants::SLED_ENGINE;
use crate::Result;

/// Key-value backend parameters.
///
/// Every cluster gets its own namespace `<domain>/<cluster_id>/` on the
/// backend identified by `engine` and `machines`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KvConfig {
    /// `kv-mem` or `kv-sled`
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Prefix all kv requests are made with
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Backend endpoints. For `kv-sled` the first entry is the database directory.
    #[serde(default)]
    pub machines: Vec<String>,

    /// Engine specific options
    #[serde(default)]
    pub options: HashMap<String, String>,

    /// Mutations retained for watches that start from an older index
    #[serde(default = "default_history_size")]
    pub watch_history_size: usize,

    /// Per-subscriber delivery buffer
    #[serde(default = "default_watch_buffer_size")]
    pub watch_buffer_size: usize,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            domain: default_domain(),
            machines: vec![],
            options: HashMap::new(),
            watch_history_size: default_history_size(),
            watch_buffer_size: default_watch_buffer_size(),
        }
    }
}

impl KvConfig {
    pub fn validate(&self) -> Result<()> {
        match self.engine.as_str() {
            MEM_ENGINE => {}
            SLED_ENGINE => {
                if self.machines.first().map_or(true, |p| p.is_empty()) {
                    return Err(invalid("kv-sled requires the database directory in machines[0]"));
                }
            }
            other => return Err(invalid(format!("unknown kv engine {other}"))),
        }
        if self.watch_buffer_size == 0 {
            return Err(invalid("watch_buffer_size must be > 0"));
        }
        Ok(())
    }

    /// Identity of the backend these settings point to.
    pub(crate) fn backend_key(&self) -> String {
        format!("{}|{}", self.engine, self.machines.join(","))
    }

    /// Namespace of `cluster_id` on this backend
    pub fn namespace(
        &self,
        cluster_id: &str,
    ) -> String {
        if self.domain.is_empty() {
            format!("{cluster_id}/")
        } else {
            format!("{}/{}/", self.domain.trim_end_matches('/'), cluster_id)
        }
    }
}

fn default_engine() -> String {
    MEM_ENGINE.to_string()
}
fn default_domain() -> String {
    "pwx".to_string()
}
fn default_history_size() -> usize {
    4096
}
fn default_watch_buffer_size() -> usize {
    1024
}
