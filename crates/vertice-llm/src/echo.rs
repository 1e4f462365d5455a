//! A deterministic provider that echoes its prompt back, verbatim, prefixed
//! with `"Echo: "`. Used by the gateway's default configuration and by tests
//! that need a provider with no network dependency and a single, entirely
//! predictable text response — unlike [`crate::mock::MockProvider`], which
//! streams word-by-word for more general-purpose mocking.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use vertice_core::{Message, Result, Role, ToolCall};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, StreamChunk, Usage};

pub struct EchoProvider {
    name: String,
}

impl EchoProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new("echo")
    }
}

fn prompt_of(request: &LlmRequest) -> String {
    request
        .messages
        .last()
        .map(|m| m.text_content())
        .unwrap_or_default()
}

fn tool_calls_for(request: &LlmRequest) -> Vec<ToolCall> {
    request
        .tools
        .iter()
        .map(|tool| ToolCall {
            id: format!("call_{}", Uuid::new_v4()),
            tool_name: tool.name.clone(),
            arguments: serde_json::json!({}),
        })
        .collect()
}

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["echo/v1".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let text = format!("Echo: {}", prompt_of(request));
        let tool_calls = tool_calls_for(request);
        let has_tool_calls = !tool_calls.is_empty();

        let mut message = Message::text(Uuid::nil(), Role::Assistant, text);
        message.tool_calls = tool_calls;

        Ok(LlmResponse {
            message,
            usage: Usage::default(),
            has_tool_calls,
            stop_reason: if has_tool_calls {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            },
        })
    }

    /// Sends every queued tool call first, then the whole echoed text as a
    /// single delta — not word-by-word, so callers can assert on the exact
    /// joined string without accounting for `MockProvider`'s trailing spaces.
    async fn stream(&self, request: &LlmRequest) -> Result<mpsc::Receiver<StreamChunk>> {
        let text = format!("Echo: {}", prompt_of(request));
        let tool_calls = tool_calls_for(request);
        let stop_reason = if tool_calls.is_empty() {
            StopReason::EndTurn
        } else {
            StopReason::ToolUse
        };

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for call in tool_calls {
                if tx.send(StreamChunk::ToolCall(call)).await.is_err() {
                    return;
                }
            }
            if tx.send(StreamChunk::TextDelta(text)).await.is_err() {
                return;
            }
            let _ = tx.send(StreamChunk::Usage(Usage::default())).await;
            let _ = tx.send(StreamChunk::Done(stop_reason)).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vertice_core::Tool;

    fn request(prompt: &str, tools: Vec<Tool>) -> LlmRequest {
        LlmRequest {
            model: "echo".into(),
            messages: vec![Message::text(Uuid::nil(), Role::User, prompt)],
            tools,
            system: None,
            max_tokens: 100,
            temperature: 0.0,
            thinking_level: None,
            stream: false,
        }
    }

    #[tokio::test]
    async fn complete_echoes_the_prompt_verbatim() {
        let provider = EchoProvider::new("echo");
        let resp = provider
            .complete(&request("hello world", vec![]))
            .await
            .unwrap();
        assert_eq!(resp.message.text_content(), "Echo: hello world");
        assert!(!resp.has_tool_calls);
    }

    #[tokio::test]
    async fn stream_sends_the_whole_text_as_a_single_delta() {
        let provider = EchoProvider::new("echo");
        let mut rx = provider.stream(&request("hello world", vec![])).await.unwrap();

        let mut deltas = Vec::new();
        while let Some(chunk) = rx.recv().await {
            if let StreamChunk::TextDelta(d) = chunk {
                deltas.push(d);
            }
        }
        assert_eq!(deltas, vec!["Echo: hello world".to_string()]);
    }

    #[tokio::test]
    async fn stream_emits_a_tool_call_before_the_text_when_tools_are_requested() {
        let provider = EchoProvider::new("echo");
        let tool = Tool {
            name: "search".into(),
            description: "ad hoc tool".into(),
            parameters: serde_json::json!({}),
            capabilities: vec![],
            is_mutating: false,
            risk_level: 0,
            provider: None,
        };
        let mut rx = provider
            .stream(&request("run search", vec![tool]))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamChunk::ToolCall(_)));
    }
}
