use uuid::Uuid;

/// Unique identifier for a chat session.
pub type SessionId = Uuid;

/// Unique identifier for a dispatched task / goal.
pub type GoalId = Uuid;

/// Unique identifier for a mesh peer (a `MeshNode::id`, not a network address).
pub type PeerId = String;
