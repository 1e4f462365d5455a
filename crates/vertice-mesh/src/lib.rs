//! # vertice-mesh
//!
//! Agent runtime coordination (C6): classifies a task description,
//! selects a coordination topology, maintains the logical control/worker
//! graph those topologies route across, and dispatches work through one
//! of three observably distinct execution strategies.
//!
//! This is a coordination model, not a network transport — nodes and
//! connections here describe *who talks to whom*, not sockets or peers.

pub mod classify;
pub mod node;
pub mod route;
pub mod topology;

pub use classify::{classify_task, TaskCharacteristic};
pub use node::{CoordinationPlane, MeshNode};
pub use route::{execute_via_mesh, Mesh, MeshStatus, TaskRoute};
pub use topology::{error_factor, select_topology, CoordinationTopology, TopologyAdvisory};
