mod cluster_store;
mod types;

pub use cluster_store::*;
pub use types::*;
