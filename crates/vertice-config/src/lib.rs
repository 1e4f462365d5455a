//! # vertice-config
//!
//! Configuration system for the Vertice agent runtime. Reads from
//! `vertice.toml`, environment variables, and CLI overrides — in that
//! precedence order.
//!
//! Supports hot-reload via filesystem watcher.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{ConfigWarning, LoggingConfig, MeshConfig, ServerConfig, VerticeConfig, WarningSeverity};
