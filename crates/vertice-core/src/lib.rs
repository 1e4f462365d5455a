//! # vertice-core
//!
//! Core types, traits, and error taxonomy for the Vertice agent runtime core.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: messages, tool calls, the unified error type, and the
//! system-wide event bus.

pub mod error;
pub mod event;
pub mod message;
pub mod tool;
pub mod types;

pub use error::{Result, VerticeError};
pub use event::{Event, EventBus};
pub use message::{Message, MessageContent, Role};
pub use tool::{Tool, ToolCall, ToolExecutor, ToolResult};
pub use types::*;
