mod mem_kv_engine;

pub use mem_kv_engine::*;
