mod adaptors;
mod backend;
mod collector;
mod kv_engine;
mod snapshot;
mod store;
mod watch_hub;

#[doc(hidden)]
pub use adaptors::*;
pub use backend::*;
pub use collector::*;
#[doc(hidden)]
pub use kv_engine::*;
pub use snapshot::*;
pub use store::*;
