//! Mesh graph registry, task routing, and the three dispatch strategies.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use vertice_core::{Result, VerticeError};

use crate::classify::{classify_task, TaskCharacteristic};
use crate::node::{CoordinationPlane, MeshNode};
use crate::topology::{error_factor, select_topology, CoordinationTopology};

/// An immutable routing decision for one task, stored under `task_id`
/// once computed.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRoute {
    pub task_id: String,
    pub topology: CoordinationTopology,
    pub target_nodes: Vec<String>,
    pub estimated_error_factor: f64,
    pub parallel: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeshStatus {
    pub initialized: bool,
    pub total_nodes: usize,
    pub control_nodes: usize,
    pub worker_nodes: usize,
    pub active_routes: usize,
}

struct MeshState {
    nodes: HashMap<String, MeshNode>,
    control_node_id: String,
    active_routes: HashMap<String, TaskRoute>,
}

/// The control/worker coordination graph plus the active-routes table.
/// One control-plane node is created at construction; everything else
/// (`register_worker`, `create_tactical_mesh`, `route_task`) mutates the
/// graph behind a single lock, matching the rest of this workspace's
/// "coarse mutex, infrequent writes" approach to shared mesh state.
pub struct Mesh {
    state: RwLock<MeshState>,
}

impl Mesh {
    pub fn new(control_agent_id: impl Into<String>) -> Self {
        let control_id = Uuid::new_v4().to_string();
        let control_node = MeshNode::new(
            control_id.clone(),
            control_agent_id.into(),
            CoordinationPlane::Control,
            Value::Null,
        );
        let mut nodes = HashMap::new();
        nodes.insert(control_id.clone(), control_node);
        Self {
            state: RwLock::new(MeshState {
                nodes,
                control_node_id: control_id,
                active_routes: HashMap::new(),
            }),
        }
    }

    pub fn control_node_id(&self) -> String {
        self.state.read().control_node_id.clone()
    }

    /// Registers a worker node and bidirectionally connects it to the
    /// control node.
    pub fn register_worker(&self, agent_id: &str, metadata: Value) -> MeshNode {
        let mut state = self.state.write();
        let node_id = Uuid::new_v4().to_string();
        let mut node = MeshNode::new(
            node_id.clone(),
            agent_id.to_string(),
            CoordinationPlane::Worker,
            metadata,
        );
        node.connect_to(&state.control_node_id);
        let control_id = state.control_node_id.clone();
        if let Some(control) = state.nodes.get_mut(&control_id) {
            control.connect_to(&node_id);
        }
        state.nodes.insert(node_id, node.clone());
        node
    }

    pub fn find_node_by_agent(&self, agent_id: &str) -> Option<MeshNode> {
        self.state
            .read()
            .nodes
            .values()
            .find(|n| n.agent_id == agent_id)
            .cloned()
    }

    fn find_or_register(&self, agent_id: &str) -> MeshNode {
        self.find_node_by_agent(agent_id)
            .unwrap_or_else(|| self.register_worker(agent_id, Value::Null))
    }

    /// Connects a set of worker nodes as a ring (`full_mesh = false`,
    /// each node linked to its successor, wrapping around) or as a
    /// complete graph (`full_mesh = true`). Agents not already registered
    /// are registered first.
    pub fn create_tactical_mesh(&self, agent_ids: &[String], full_mesh: bool) -> Vec<MeshNode> {
        let nodes: Vec<MeshNode> = agent_ids.iter().map(|id| self.find_or_register(id)).collect();
        if nodes.len() < 2 {
            return nodes;
        }

        let mut state = self.state.write();
        if full_mesh {
            for i in 0..nodes.len() {
                for j in (i + 1)..nodes.len() {
                    let (a, b) = (nodes[i].id.clone(), nodes[j].id.clone());
                    if let Some(n) = state.nodes.get_mut(&a) {
                        n.connect_to(&b);
                    }
                    if let Some(n) = state.nodes.get_mut(&b) {
                        n.connect_to(&a);
                    }
                }
            }
        } else {
            for i in 0..nodes.len() {
                let next = (i + 1) % nodes.len();
                let (a, b) = (nodes[i].id.clone(), nodes[next].id.clone());
                if let Some(n) = state.nodes.get_mut(&a) {
                    n.connect_to(&b);
                }
                if let Some(n) = state.nodes.get_mut(&b) {
                    n.connect_to(&a);
                }
            }
        }
        drop(state);
        agent_ids
            .iter()
            .map(|id| self.find_node_by_agent(id).expect("just registered"))
            .collect()
    }

    /// Classifies `description`, selects a topology, resolves
    /// `target_agents` to mesh node ids (registering workers as needed),
    /// and stores the resulting route under `task_id`.
    pub fn route_task(
        &self,
        task_id: &str,
        description: &str,
        target_agents: &[String],
        prefer_parallel: bool,
    ) -> TaskRoute {
        let characteristic = classify_task(description);
        let (topology, _advisory) = select_topology(characteristic, 0.0, true);

        let target_nodes: Vec<String> = target_agents
            .iter()
            .map(|agent_id| self.find_or_register(agent_id).id)
            .collect();

        let route = TaskRoute {
            task_id: task_id.to_string(),
            topology,
            target_nodes,
            estimated_error_factor: error_factor(topology),
            parallel: prefer_parallel && characteristic == TaskCharacteristic::Parallelizable,
            reasoning: format!(
                "Task classified as {characteristic}, selected {topology} topology"
            ),
        };

        self.state
            .write()
            .active_routes
            .insert(task_id.to_string(), route.clone());
        route
    }

    pub fn get_route(&self, task_id: &str) -> Option<TaskRoute> {
        self.state.read().active_routes.get(task_id).cloned()
    }

    pub fn status(&self) -> MeshStatus {
        let state = self.state.read();
        let worker_nodes = state
            .nodes
            .values()
            .filter(|n| n.plane == CoordinationPlane::Worker)
            .count();
        MeshStatus {
            initialized: true,
            total_nodes: state.nodes.len(),
            control_nodes: 1,
            worker_nodes,
            active_routes: state.active_routes.len(),
        }
    }
}

/// Runs `executor` against the route stored for `task_id`, dispatching
/// through the strategy its topology implies:
///
/// - `Independent`: calls `executor` once, directly, with `task_id` itself.
/// - `Centralized`: calls `executor` once per target node, sequentially,
///   one completing before the next starts.
/// - `Decentralized`: calls `executor` for every target node concurrently,
///   with no coordinating step — completion order is nondeterministic.
/// - `Hybrid`: a synchronous planning call against the control node,
///   then every target node concurrently — the planning call always
///   finishes before any worker-plane call starts.
///
/// These three strategies are chosen to be observably distinguishable:
/// the same `executor` run through each produces a different call count
/// and a different interleaving of calls, confirmable by a caller logging
/// side effects in `executor` itself.
pub async fn execute_via_mesh<F, Fut, T>(mesh: &Mesh, task_id: &str, executor: F) -> Result<Vec<T>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = T>,
{
    let route = mesh
        .get_route(task_id)
        .ok_or_else(|| VerticeError::Other(format!("no route found for task {task_id}")))?;

    let results = match route.topology {
        CoordinationTopology::Independent => vec![executor(task_id.to_string()).await],
        CoordinationTopology::Centralized => {
            let mut out = Vec::with_capacity(route.target_nodes.len());
            for node_id in &route.target_nodes {
                out.push(executor(node_id.clone()).await);
            }
            out
        }
        CoordinationTopology::Decentralized => {
            futures::future::join_all(route.target_nodes.iter().cloned().map(executor)).await
        }
        CoordinationTopology::Hybrid => {
            let _plan = executor(mesh.control_node_id()).await;
            futures::future::join_all(route.target_nodes.iter().cloned().map(executor)).await
        }
    };

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    #[test]
    fn control_node_is_created_at_construction() {
        let mesh = Mesh::new("orchestrator");
        let status = mesh.status();
        assert_eq!(status.control_nodes, 1);
        assert_eq!(status.total_nodes, 1);
        assert_eq!(status.worker_nodes, 0);
    }

    #[test]
    fn register_worker_connects_bidirectionally_to_control() {
        let mesh = Mesh::new("orchestrator");
        let control_id = mesh.control_node_id();
        let worker = mesh.register_worker("worker-a", Value::Null);
        assert!(worker.connections.contains(&control_id));

        let status = mesh.status();
        assert_eq!(status.worker_nodes, 1);
        assert_eq!(status.total_nodes, 2);
    }

    #[test]
    fn find_node_by_agent_reuses_existing_node() {
        let mesh = Mesh::new("orchestrator");
        let first = mesh.register_worker("worker-a", Value::Null);
        let found = mesh.find_node_by_agent("worker-a").unwrap();
        assert_eq!(first.id, found.id);
    }

    #[test]
    fn ring_topology_connects_each_node_to_its_successor_wrapping_around() {
        let mesh = Mesh::new("orchestrator");
        let agents = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let nodes = mesh.create_tactical_mesh(&agents, false);
        let a = mesh.find_node_by_agent("a").unwrap();
        let b = mesh.find_node_by_agent("b").unwrap();
        let c = mesh.find_node_by_agent("c").unwrap();
        assert!(a.connections.contains(&b.id));
        assert!(b.connections.contains(&c.id));
        assert!(c.connections.contains(&a.id));
        assert!(!a.connections.contains(&c.id));
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn full_mesh_topology_connects_every_pair() {
        let mesh = Mesh::new("orchestrator");
        let agents = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        mesh.create_tactical_mesh(&agents, true);
        let a = mesh.find_node_by_agent("a").unwrap();
        let b = mesh.find_node_by_agent("b").unwrap();
        let c = mesh.find_node_by_agent("c").unwrap();
        assert!(a.connections.contains(&b.id) && a.connections.contains(&c.id));
        assert!(b.connections.contains(&a.id) && b.connections.contains(&c.id));
        assert!(c.connections.contains(&a.id) && c.connections.contains(&b.id));
    }

    #[test]
    fn route_task_for_sequential_description_is_independent_and_unparallel() {
        let mesh = Mesh::new("orchestrator");
        let route = mesh.route_task("t1", "do this step by step", &[], true);
        assert_eq!(route.topology, CoordinationTopology::Independent);
        assert!(!route.parallel);
        assert_eq!(route.reasoning, "Task classified as sequential, selected independent topology");
    }

    #[test]
    fn route_task_registers_missing_target_agents() {
        let mesh = Mesh::new("orchestrator");
        let agents = vec!["x".to_string(), "y".to_string()];
        let route = mesh.route_task("t2", "run these batch jobs", &agents, true);
        assert_eq!(route.target_nodes.len(), 2);
        assert!(route.parallel);
        assert_eq!(mesh.status().worker_nodes, 2);
    }

    #[tokio::test]
    async fn centralized_dispatch_runs_targets_strictly_sequentially() {
        let mesh = Mesh::new("orchestrator");
        let agents = vec!["a".to_string(), "b".to_string()];
        mesh.route_task("centralized-task", "run this batch", &agents, true);

        let log = Arc::new(AsyncMutex::new(Vec::<String>::new()));
        let results = execute_via_mesh(&mesh, "centralized-task", |node_id| {
            let log = Arc::clone(&log);
            async move {
                log.lock().await.push(format!("start:{node_id}"));
                log.lock().await.push(format!("end:{node_id}"));
                node_id
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        let log = log.lock().await;
        // Sequential: each node's start/end pair is contiguous.
        assert_eq!(log[0].split(':').next().unwrap(), "start");
        assert_eq!(log[1].split(':').next().unwrap(), "end");
        assert_eq!(log[2].split(':').next().unwrap(), "start");
        assert_eq!(log[3].split(':').next().unwrap(), "end");
    }

    #[tokio::test]
    async fn decentralized_dispatch_has_no_planning_call() {
        let mesh = Mesh::new("orchestrator");
        let agents = vec!["a".to_string(), "b".to_string()];
        mesh.route_task("decentralized-task", "explore the repo", &agents, true);

        let calls = Arc::new(AsyncMutex::new(Vec::<String>::new()));
        let results = execute_via_mesh(&mesh, "decentralized-task", |node_id| {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().await.push(node_id.clone());
                node_id
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(calls.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn hybrid_dispatch_calls_control_node_before_any_worker() {
        let mesh = Mesh::new("orchestrator");
        let agents = vec!["a".to_string(), "b".to_string()];
        mesh.route_task(
            "hybrid-task",
            "design a multi-step architecture",
            &agents,
            true,
        );
        let control_id = mesh.control_node_id();

        let calls = Arc::new(AsyncMutex::new(Vec::<String>::new()));
        let results = execute_via_mesh(&mesh, "hybrid-task", |node_id| {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().await.push(node_id.clone());
                node_id
            }
        })
        .await
        .unwrap();

        // One planning call plus one per worker node.
        assert_eq!(results.len(), 3);
        let calls = calls.lock().await;
        assert_eq!(calls[0], control_id);
    }

    #[tokio::test]
    async fn independent_dispatch_calls_executor_exactly_once() {
        let mesh = Mesh::new("orchestrator");
        mesh.route_task("solo-task", "do this step by step", &[], true);

        let results = execute_via_mesh(&mesh, "solo-task", |node_id| async move { node_id })
            .await
            .unwrap();
        assert_eq!(results, vec!["solo-task".to_string()]);
    }

    #[tokio::test]
    async fn missing_route_is_an_error() {
        let mesh = Mesh::new("orchestrator");
        let result = execute_via_mesh(&mesh, "nonexistent", |node_id| async move { node_id }).await;
        assert!(result.is_err());
    }
}
