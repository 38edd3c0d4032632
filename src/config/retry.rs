use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Backoff base (unit: milliseconds, 0 retries immediately)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid(format!(
                "{name}: base_delay_ms({}) exceeds max_delay_ms({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by operation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Alert id compare-and-set loop. Contention is expected, so never give up.
    #[serde(default = "default_id_allocation")]
    pub id_allocation: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            id_allocation: default_id_allocation(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.id_allocation.validate("id_allocation")
    }
}

fn default_id_allocation() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        base_delay_ms: 1,
        max_delay_ms: 50,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
