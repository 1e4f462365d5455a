//! # vertice-stream
//!
//! Translates a provider's raw token stream into the Open Responses SSE
//! event grammar (C5): strictly monotonic sequence numbers, a well-formed
//! output-item lifecycle, and exactly one terminal event followed by
//! `[DONE]`. Transport-oblivious by design — this crate renders wire-format
//! SSE text but never touches axum; the gateway owns the HTTP response.

pub mod builder;
pub mod event;
pub mod translate;

pub use builder::ResponseBuilder;
pub use event::{ItemKind, ItemStatus, OpenResponsesEvent, OutputItem, StreamError, DONE_MARKER};
pub use translate::{render_sse, translate_stream};
