//! Configuration management module for the alert bus.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation

mod cluster;
mod kv;
mod retry;
mod watch;
pub use cluster::*;
pub use kv::*;
pub use retry::*;
pub use watch::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Environment prefix, e.g. `ALERT__KV__ENGINE=kv-sled`
pub(crate) const ENV_PREFIX: &str = "ALERT";

/// Main configuration container for the alert bus components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct AlertConfig {
    /// Cluster identity and local paths
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Key-value backend selection
    #[serde(default)]
    pub kv: KvConfig,
    /// Watch session budgets
    #[serde(default)]
    pub watch: WatchConfig,
    /// Retry policies for kv operations
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Debug for AlertConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AlertConfig")
            .field("cluster", &self.cluster)
            .field("kv", &self.kv)
            .finish()
    }
}

impl AlertConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `ALERT__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred to allow further overrides via
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/alert.toml");
    /// std::env::set_var("ALERT__CLUSTER__CLUSTER_ID", "c1");
    /// let cfg = AlertConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("kv.machines")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kv.machines")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Empty cluster id
    /// - Unknown kv engine or missing sled directory
    /// - Zero watch budgets
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.kv.validate()?;
        self.watch.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(msg.into()))
}
