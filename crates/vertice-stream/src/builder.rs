//! Sequence-number and output-item bookkeeping for one response.

use uuid::Uuid;

use crate::event::{ItemKind, ItemStatus, OpenResponsesEvent, OutputItem, StreamError};

/// Tracks the strictly-monotonic `sequence_number` and the identity of
/// whichever output item is currently open, for a single response.
pub struct ResponseBuilder {
    response_id: String,
    next_seq: u64,
    open_item: Option<OpenItem>,
    text: String,
}

struct OpenItem {
    id: String,
    kind: OpenItemKind,
}

#[derive(PartialEq, Eq)]
enum OpenItemKind {
    Message,
    Reasoning,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            response_id: format!("resp_{}", Uuid::new_v4()),
            next_seq: 1,
            open_item: None,
            text: String::new(),
        }
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    fn seq(&mut self) -> u64 {
        let n = self.next_seq;
        self.next_seq += 1;
        n
    }

    pub fn created(&mut self) -> OpenResponsesEvent {
        OpenResponsesEvent::ResponseCreated {
            sequence_number: self.seq(),
            response_id: self.response_id.clone(),
        }
    }

    pub fn in_progress(&mut self) -> OpenResponsesEvent {
        OpenResponsesEvent::ResponseInProgress {
            sequence_number: self.seq(),
            response_id: self.response_id.clone(),
        }
    }

    /// Opens a message item if one isn't already open and emits the
    /// `output_item.added` + `content_part.added` pair; returns just the
    /// delta event if a message item is already open.
    pub fn text_delta(&mut self, delta: &str) -> Vec<OpenResponsesEvent> {
        let mut events = Vec::new();
        if self.open_item.is_none() {
            let id = format!("item_{}", Uuid::new_v4());
            events.push(OpenResponsesEvent::OutputItemAdded {
                sequence_number: self.seq(),
                item: OutputItem {
                    id: id.clone(),
                    kind: ItemKind::Message {
                        citations: Vec::new(),
                    },
                    status: ItemStatus::InProgress,
                },
            });
            events.push(OpenResponsesEvent::ContentPartAdded {
                sequence_number: self.seq(),
                item_id: id.clone(),
                part_index: 0,
            });
            self.open_item = Some(OpenItem {
                id,
                kind: OpenItemKind::Message,
            });
            self.text.clear();
        }
        let item_id = self.open_item.as_ref().unwrap().id.clone();
        self.text.push_str(delta);
        events.push(OpenResponsesEvent::OutputTextDelta {
            sequence_number: self.seq(),
            item_id,
            delta: delta.to_string(),
        });
        events
    }

    pub fn reasoning_delta(&mut self, delta: &str) -> Vec<OpenResponsesEvent> {
        let mut events = Vec::new();
        if self.open_item.is_none() {
            let id = format!("item_{}", Uuid::new_v4());
            events.push(OpenResponsesEvent::OutputItemAdded {
                sequence_number: self.seq(),
                item: OutputItem {
                    id: id.clone(),
                    kind: ItemKind::Reasoning,
                    status: ItemStatus::InProgress,
                },
            });
            self.open_item = Some(OpenItem {
                id,
                kind: OpenItemKind::Reasoning,
            });
        }
        let item_id = self.open_item.as_ref().unwrap().id.clone();
        events.push(OpenResponsesEvent::ReasoningContentDelta {
            sequence_number: self.seq(),
            item_id,
            delta: delta.to_string(),
        });
        events
    }

    /// Closes whatever item is currently open, if any. No-op otherwise.
    pub fn close_open_item(&mut self) -> Vec<OpenResponsesEvent> {
        let Some(open) = self.open_item.take() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        let (kind, status) = match open.kind {
            OpenItemKind::Message => {
                events.push(OpenResponsesEvent::OutputTextDone {
                    sequence_number: self.seq(),
                    item_id: open.id.clone(),
                    text: std::mem::take(&mut self.text),
                });
                (
                    ItemKind::Message {
                        citations: Vec::new(),
                    },
                    ItemStatus::Completed,
                )
            }
            OpenItemKind::Reasoning => (ItemKind::Reasoning, ItemStatus::Completed),
        };
        events.push(OpenResponsesEvent::OutputItemDone {
            sequence_number: self.seq(),
            item: OutputItem {
                id: open.id,
                kind,
                status,
            },
        });
        events
    }

    /// A tool call arrives whole (not incrementally), so it's added and
    /// immediately completed.
    pub fn function_call(&mut self, name: &str, arguments: &str) -> Vec<OpenResponsesEvent> {
        let mut events = self.close_open_item();
        let id = format!("item_{}", Uuid::new_v4());
        let kind = ItemKind::FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        };
        events.push(OpenResponsesEvent::OutputItemAdded {
            sequence_number: self.seq(),
            item: OutputItem {
                id: id.clone(),
                kind: kind.clone(),
                status: ItemStatus::InProgress,
            },
        });
        events.push(OpenResponsesEvent::OutputItemDone {
            sequence_number: self.seq(),
            item: OutputItem {
                id,
                kind,
                status: ItemStatus::Completed,
            },
        });
        events
    }

    /// An extension item (telemetry, governance) carrying out-of-band
    /// metadata. Added and completed in the same step, like a function call.
    pub fn extension_item(&mut self, kind: ItemKind) -> Vec<OpenResponsesEvent> {
        let id = format!("item_{}", Uuid::new_v4());
        vec![
            OpenResponsesEvent::OutputItemAdded {
                sequence_number: self.seq(),
                item: OutputItem {
                    id: id.clone(),
                    kind: kind.clone(),
                    status: ItemStatus::InProgress,
                },
            },
            OpenResponsesEvent::OutputItemDone {
                sequence_number: self.seq(),
                item: OutputItem {
                    id,
                    kind,
                    status: ItemStatus::Completed,
                },
            },
        ]
    }

    pub fn completed(&mut self) -> OpenResponsesEvent {
        OpenResponsesEvent::ResponseCompleted {
            sequence_number: self.seq(),
            response_id: self.response_id.clone(),
        }
    }

    pub fn failed(&mut self, error: StreamError) -> OpenResponsesEvent {
        OpenResponsesEvent::ResponseFailed {
            sequence_number: self.seq(),
            response_id: self.response_id.clone(),
            error,
        }
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
