pub mod async_task;
pub mod time;

pub use async_task::*;
pub use time::*;
