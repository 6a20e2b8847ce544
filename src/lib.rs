//! annostore - versioned annotation dataset store
//!
//! Imports, merges, filters and remaps image annotations held in git-backed
//! repositories, each with its own growable class-id vocabulary.

pub mod class_ids;
pub mod config;
pub mod error;
pub mod import;
pub mod model;
pub mod ops;
pub mod storage;

pub use class_ids::ClassIdRegistry;
pub use config::{LogLevel, StoreConfig};
pub use error::{MirError, MirResult};
