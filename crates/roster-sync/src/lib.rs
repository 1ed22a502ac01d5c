//! roster-sync library: File-backed collaborators for the sync host.
//!
//! This is a thin library layer over the binary's components,
//! allowing integration tests to access them.

pub mod config;
pub mod json_cache;
pub mod json_store;

// Re-export key types for convenience
pub use config::{Config, ConfigError, Overrides};
pub use json_cache::JsonDirCache;
pub use json_store::JsonFileStore;
