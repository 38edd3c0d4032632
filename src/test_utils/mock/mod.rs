mod mock_builder;

pub use mock_builder::*;
