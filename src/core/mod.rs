pub mod config;
pub mod error;
pub mod types;

pub use config::{config, EngineConfig};
pub use error::{EngineError, Result};
pub use types::{tag_set, EventId, EventKey, TagSet, Time};
