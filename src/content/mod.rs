//! Content files: starting variables, activities, upgrades

pub mod loader;

pub use loader::{load_content, load_content_file, Content, Rewards};
