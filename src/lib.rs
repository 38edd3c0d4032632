//! Crash-consistent cluster state store and distributed alert bus on a
//! pluggable key-value backend.
//!
//! - [`ClusterStore`] reads the cluster descriptor through a snapshot paired
//!   with an updates collector, so a joining node never misses a mutation.
//! - [`alert`] raises, enumerates and watches alerts; ids come from a
//!   compare-and-set counter and watches recover from delivery errors.

pub mod alert;
mod cluster;
mod config;
pub mod constants;
mod errors;
mod kv;
pub mod metrics;
pub mod utils;

pub use alert::Alert;
pub use alert::AlertAction;
pub use alert::AlertBus;
pub use alert::AlertClient;
pub use alert::AlertWatcherFn;
pub use alert::KvAlert;
pub use alert::Registry;
pub use alert::ResourceType;
pub use alert::Severity;
pub use cluster::*;
pub use config::*;
pub use errors::*;
pub use kv::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
