use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

/// System-wide events published by the router, cache, and mesh components.
/// Consumers (logging, metrics, the HTTP gateway) subscribe rather than
/// poll — the same pattern the runtime uses for per-session streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    MessageReceived {
        session_id: Uuid,
        message_id: Uuid,
    },
    MessageSent {
        session_id: Uuid,
        message_id: Uuid,
    },
    AgentToolCall {
        session_id: Uuid,
        tool_name: String,
        tool_call_id: String,
    },
    AgentToolResult {
        session_id: Uuid,
        tool_call_id: String,
        is_error: bool,
    },
    AgentError {
        session_id: Uuid,
        error: String,
    },
    TaskRouted {
        task_id: String,
        topology: String,
    },
    TaskDelegated {
        task_id: String,
        node_id: String,
    },
    PeerJoined {
        peer_id: String,
    },
    PeerLeft {
        peer_id: String,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Shutdown,
}

/// A broadcast-based event bus for system-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
