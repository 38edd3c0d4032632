use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Budgets of an alert watch session
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Bootstrap marker writes before giving up
    #[serde(default = "default_bootstrap_retries")]
    pub bootstrap_retries: u32,

    /// Wait after each bootstrap marker write (milliseconds)
    #[serde(default = "default_bootstrap_interval_ms")]
    pub bootstrap_interval_ms: u64,

    /// Consecutive delivery errors tolerated on a ready watch
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            bootstrap_retries: default_bootstrap_retries(),
            bootstrap_interval_ms: default_bootstrap_interval_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_retries == 0 {
            return Err(invalid("bootstrap_retries must be > 0"));
        }
        if self.bootstrap_interval_ms == 0 {
            return Err(invalid("bootstrap_interval_ms must be > 0"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(invalid("max_consecutive_errors must be > 0"));
        }
        Ok(())
    }

    pub fn bootstrap_interval(&self) -> Duration {
        Duration::from_millis(self.bootstrap_interval_ms)
    }
}

fn default_bootstrap_retries() -> u32 {
    5
}
fn default_bootstrap_interval_ms() -> u64 {
    100
}
fn default_max_consecutive_errors() -> u32 {
    5
}
