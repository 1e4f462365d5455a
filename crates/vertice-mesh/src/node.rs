//! The logical control/worker coordination graph. Distinct from any
//! physical network transport — this models *which agent talks to which*,
//! not how bytes move between them.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationPlane {
    Control,
    Worker,
}

/// One node in the coordination graph. `connections` is stored
/// redundantly in both directions by the caller (`connect_to` is not
/// symmetric by itself) for O(1) neighbour lookups.
#[derive(Debug, Clone, Serialize)]
pub struct MeshNode {
    pub id: String,
    pub agent_id: String,
    pub plane: CoordinationPlane,
    pub connections: HashSet<String>,
    pub metadata: Value,
}

impl MeshNode {
    pub fn new(id: String, agent_id: String, plane: CoordinationPlane, metadata: Value) -> Self {
        Self {
            id,
            agent_id,
            plane,
            connections: HashSet::new(),
            metadata,
        }
    }

    pub fn connect_to(&mut self, node_id: &str) {
        self.connections.insert(node_id.to_string());
    }
}
