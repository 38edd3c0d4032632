mod sled_kv_engine;

pub use sled_kv_engine::*;
