//! Open Responses event grammar: output items and the wire event enum.

use serde::Serialize;
use serde_json::Value;

/// Lifecycle status of an output item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
    Failed,
}

/// The kind of content an output item carries.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Message {
        #[serde(default)]
        citations: Vec<String>,
    },
    Reasoning,
    FunctionCall {
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    /// Extension item. Clients that don't recognise `name` must ignore it.
    #[serde(rename = "vertice:telemetry")]
    VerticeTelemetry { metadata: Value },
    #[serde(rename = "vertice:governance")]
    VerticeGovernance { metadata: Value },
}

/// An item in the response's ordered output list.
#[derive(Debug, Clone, Serialize)]
pub struct OutputItem {
    pub id: String,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub status: ItemStatus,
}

/// A structured error carried by `response.failed`. Message is capped at
/// 200 chars per `spec.md` §4.5.
#[derive(Debug, Clone, Serialize)]
pub struct StreamError {
    pub code: String,
    pub message: String,
}

impl StreamError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > 200 {
            message.truncate(200);
        }
        Self {
            code: code.into(),
            message,
        }
    }

    pub fn cancelled() -> Self {
        Self::new("cancelled", "the operation was cancelled")
    }

    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::new("provider_error", message)
    }
}

/// Every event the translator can emit, in the order named in `spec.md`
/// §4.5. `sequence_number` is assigned by the builder, never by the
/// variant itself.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenResponsesEvent {
    #[serde(rename = "response.created")]
    ResponseCreated { sequence_number: u64, response_id: String },
    #[serde(rename = "response.in_progress")]
    ResponseInProgress { sequence_number: u64, response_id: String },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { sequence_number: u64, item: OutputItem },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        sequence_number: u64,
        item_id: String,
        part_index: u32,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        sequence_number: u64,
        item_id: String,
        delta: String,
    },
    #[serde(rename = "response.reasoning_content.delta")]
    ReasoningContentDelta {
        sequence_number: u64,
        item_id: String,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        sequence_number: u64,
        item_id: String,
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        sequence_number: u64,
        item_id: String,
        text: String,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { sequence_number: u64, item: OutputItem },
    #[serde(rename = "response.completed")]
    ResponseCompleted { sequence_number: u64, response_id: String },
    #[serde(rename = "response.failed")]
    ResponseFailed {
        sequence_number: u64,
        response_id: String,
        error: StreamError,
    },
}

impl OpenResponsesEvent {
    pub fn sequence_number(&self) -> u64 {
        match self {
            OpenResponsesEvent::ResponseCreated { sequence_number, .. }
            | OpenResponsesEvent::ResponseInProgress { sequence_number, .. }
            | OpenResponsesEvent::OutputItemAdded { sequence_number, .. }
            | OpenResponsesEvent::ContentPartAdded { sequence_number, .. }
            | OpenResponsesEvent::OutputTextDelta { sequence_number, .. }
            | OpenResponsesEvent::ReasoningContentDelta { sequence_number, .. }
            | OpenResponsesEvent::FunctionCallArgumentsDelta { sequence_number, .. }
            | OpenResponsesEvent::OutputTextDone { sequence_number, .. }
            | OpenResponsesEvent::OutputItemDone { sequence_number, .. }
            | OpenResponsesEvent::ResponseCompleted { sequence_number, .. }
            | OpenResponsesEvent::ResponseFailed { sequence_number, .. } => *sequence_number,
        }
    }

    /// The SSE `event:` line name, e.g. "response.created".
    pub fn event_name(&self) -> &'static str {
        match self {
            OpenResponsesEvent::ResponseCreated { .. } => "response.created",
            OpenResponsesEvent::ResponseInProgress { .. } => "response.in_progress",
            OpenResponsesEvent::OutputItemAdded { .. } => "response.output_item.added",
            OpenResponsesEvent::ContentPartAdded { .. } => "response.content_part.added",
            OpenResponsesEvent::OutputTextDelta { .. } => "response.output_text.delta",
            OpenResponsesEvent::ReasoningContentDelta { .. } => "response.reasoning_content.delta",
            OpenResponsesEvent::FunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            OpenResponsesEvent::OutputTextDone { .. } => "response.output_text.done",
            OpenResponsesEvent::OutputItemDone { .. } => "response.output_item.done",
            OpenResponsesEvent::ResponseCompleted { .. } => "response.completed",
            OpenResponsesEvent::ResponseFailed { .. } => "response.failed",
        }
    }

    /// Render as a wire-format SSE frame: `event: <type>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.event_name(), data)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OpenResponsesEvent::ResponseCompleted { .. } | OpenResponsesEvent::ResponseFailed { .. }
        )
    }
}

/// The literal `[DONE]` terminal marker, always the last line of a stream.
pub const DONE_MARKER: &str = "data: [DONE]\n\n";
