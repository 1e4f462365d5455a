//! Converts an LLM provider's raw [`StreamChunk`] channel into the Open
//! Responses event sequence, and renders that sequence to SSE wire text.

use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use vertice_llm::provider::{StopReason, StreamChunk, Usage};

use crate::builder::ResponseBuilder;
use crate::event::{ItemKind, OpenResponsesEvent, StreamError, DONE_MARKER};

/// Consumes `rx` and yields the Open Responses event sequence for it.
/// Exactly one of `response.completed` / `response.failed` is yielded,
/// always last. A cancelled `token` produces a `cancelled` failure instead
/// of draining the channel further.
pub fn translate_stream(
    mut rx: Receiver<StreamChunk>,
    token: CancellationToken,
) -> impl Stream<Item = OpenResponsesEvent> {
    async_stream::stream! {
        let mut builder = ResponseBuilder::new();
        yield builder.created();
        yield builder.in_progress();

        let mut usage: Option<Usage> = None;
        let mut terminal: Option<OpenResponsesEvent> = None;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    for ev in builder.close_open_item() {
                        yield ev;
                    }
                    terminal = Some(builder.failed(StreamError::cancelled()));
                    break;
                }
                chunk = rx.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                for ev in builder.close_open_item() {
                    yield ev;
                }
                terminal = Some(builder.completed());
                break;
            };

            match chunk {
                StreamChunk::Thinking(delta) => {
                    for ev in builder.reasoning_delta(&delta) {
                        yield ev;
                    }
                }
                StreamChunk::TextDelta(delta) => {
                    for ev in builder.text_delta(&delta) {
                        yield ev;
                    }
                }
                StreamChunk::ToolCall(call) => {
                    let arguments = call.arguments.to_string();
                    for ev in builder.function_call(&call.tool_name, &arguments) {
                        yield ev;
                    }
                }
                StreamChunk::Usage(u) => {
                    usage = Some(u);
                }
                StreamChunk::Done(stop_reason) => {
                    for ev in builder.close_open_item() {
                        yield ev;
                    }
                    if let Some(u) = usage.take() {
                        for ev in builder.extension_item(ItemKind::VerticeTelemetry {
                            metadata: json!({
                                "stop_reason": stop_reason_label(stop_reason),
                                "input_tokens": u.input_tokens,
                                "output_tokens": u.output_tokens,
                                "thinking_tokens": u.thinking_tokens,
                                "estimated_cost_usd": u.estimated_cost_usd,
                            }),
                        }) {
                            yield ev;
                        }
                    }
                    terminal = Some(builder.completed());
                    break;
                }
                StreamChunk::Error(message) => {
                    terminal = Some(builder.failed(StreamError::provider_error(message)));
                    break;
                }
            }
        }

        if let Some(ev) = terminal {
            yield ev;
        }
    }
}

fn stop_reason_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "end_turn",
        StopReason::ToolUse => "tool_use",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
        StopReason::ContentFilter => "content_filter",
    }
}

/// Renders an event sequence as wire-format SSE text, stopping right after
/// the first terminal event and appending the `[DONE]` marker. Any events
/// past the terminal one are dropped rather than forwarded.
pub fn render_sse<S>(events: S) -> impl Stream<Item = String>
where
    S: Stream<Item = OpenResponsesEvent>,
{
    async_stream::stream! {
        futures::pin_mut!(events);
        while let Some(event) = futures::StreamExt::next(&mut events).await {
            let terminal = event.is_terminal();
            yield event.to_sse();
            if terminal {
                yield DONE_MARKER.to_string();
                return;
            }
        }
        yield DONE_MARKER.to_string();
    }
}
