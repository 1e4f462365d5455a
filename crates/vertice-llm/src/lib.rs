//! # vertice-llm
//!
//! Provider adapters (C2) and the `VerticeClient` router (C3). Supports
//! streaming, tool use, thinking/reasoning, and priority-ordered automatic
//! failover between providers, composing `vertice-resilience` rather than
//! re-implementing retry/circuit logic.

pub mod anthropic;
pub mod echo;
pub mod embedding;
pub mod local;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod router;

pub use echo::EchoProvider;
pub use embedding::EmbeddingProvider;
pub use mock::MockProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, StreamChunk, Usage};
pub use router::{ProviderStatus, ProviderStatusEntry, VerticeClient, VerticeClientConfig};
