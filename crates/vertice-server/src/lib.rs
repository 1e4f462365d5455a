//! # vertice-server
//!
//! HTTP agent gateway for the Vertice runtime core. Exposes:
//!
//! - `GET /agui/stream` — live Open Responses SSE for a single prompt
//! - `POST /agui/tasks` + `GET /agui/tasks/{id}` + `GET /agui/tasks/{id}/stream`
//!   — background tasks, routed through the mesh and served from the
//!   response cache on repeat prompts
//! - `GET /healthz` and `GET /metrics` for operational checks

pub mod metrics;
pub mod ratelimit;

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{Json, Response, Sse, sse::Event as SseEvent},
    routing::{get, post},
};
use dashmap::DashMap;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use vertice_cache::{CachingMixin, HashEmbedder};
use vertice_config::VerticeConfig;
use vertice_config::schema::ServerConfig;
use vertice_core::{Message, Role, Tool, ToolCall, VerticeError};
use vertice_llm::{EchoProvider, LlmProvider, LlmRequest, StopReason, Usage, VerticeClient, VerticeClientConfig};
use vertice_mesh::{Mesh, TaskRoute, execute_via_mesh};
use vertice_stream::{ItemKind, OpenResponsesEvent, ResponseBuilder, StreamError, translate_stream};

/// Shared gateway state.
pub struct AppState {
    server: ServerConfig,
    client: Arc<VerticeClient>,
    cache: Arc<CachingMixin<CachedTurn>>,
    mesh: Arc<Mesh>,
    metrics: metrics::Metrics,
    tasks: DashMap<Uuid, Arc<TaskRecord>>,
}

impl AppState {
    fn new(config: VerticeConfig) -> Self {
        let provider: Arc<dyn LlmProvider> = Arc::new(EchoProvider::default());
        let client = VerticeClient::new(
            VerticeClientConfig {
                priority: vec!["echo".to_string()],
                max_retries: config.resilience.retry.max_retries,
                circuit_breaker_threshold: config.resilience.circuit_breaker.failure_threshold,
                default_max_tokens: 4096,
                default_temperature: 0.7,
                ..Default::default()
            },
            vec![provider],
        );
        let cache = CachingMixin::new(config.cache.clone(), Arc::new(HashEmbedder::default()));
        let mesh = Mesh::new(config.mesh.control_agent_id.clone());

        Self {
            server: config.server.clone(),
            client: Arc::new(client),
            cache: Arc::new(cache),
            mesh: Arc::new(mesh),
            metrics: metrics::Metrics::new(),
            tasks: DashMap::new(),
        }
    }
}

/// The result of one completed turn — what gets cached and what the
/// synthesized event sequence is built from.
#[derive(Debug, Clone)]
struct CachedTurn {
    text: String,
    tool_calls: Vec<ToolCall>,
    #[allow(dead_code)]
    stop_reason: StopReason,
    usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// A background task: its routing decision, lifecycle status, the event
/// log replayed to late subscribers, and a broadcast channel for live
/// ones.
struct TaskRecord {
    id: Uuid,
    session_id: String,
    route: TaskRoute,
    status: Mutex<TaskState>,
    events: Mutex<Vec<OpenResponsesEvent>>,
    tx: broadcast::Sender<OpenResponsesEvent>,
}

impl TaskRecord {
    fn new(id: Uuid, session_id: String, route: TaskRoute) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            id,
            session_id,
            route,
            status: Mutex::new(TaskState::Queued),
            events: Mutex::new(Vec::new()),
            tx,
        }
    }

    fn set_status(&self, state: TaskState) {
        *self.status.lock() = state;
    }

    fn status(&self) -> TaskState {
        *self.status.lock()
    }

    fn push_event(&self, event: OpenResponsesEvent) {
        self.events.lock().push(event);
    }

    fn snapshot_events(&self) -> Vec<OpenResponsesEvent> {
        self.events.lock().clone()
    }
}

/// Build the Axum router.
pub fn build_router(config: VerticeConfig) -> Router {
    let server_config = config.server.clone();
    let state = Arc::new(AppState::new(config));

    let agui_routes = Router::new()
        .route("/agui/stream", get(agui_stream_handler))
        .route("/agui/tasks", post(create_task_handler))
        .route("/agui/tasks/{id}", get(get_task_handler))
        .route("/agui/tasks/{id}/stream", get(task_stream_handler));

    let agui_routes = if server_config.api_key.is_some() {
        agui_routes.layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
    } else {
        agui_routes
    };

    // Note: layers execute outermost-first. The Extension layer must wrap
    // the middleware so the RateLimiter is present in the request
    // extensions when rate_limit_middleware tries to extract it.
    let rate_limiter = ratelimit::RateLimiter::new(ratelimit::RateLimitConfig {
        burst: server_config.rate_limit_per_minute.max(1),
        refill_per_sec: server_config.rate_limit_per_minute as f64 / 60.0,
    });
    let agui_routes = agui_routes
        .layer(middleware::from_fn(ratelimit::rate_limit_middleware))
        .layer(axum::Extension(rate_limiter.clone()));

    tokio::spawn({
        let limiter = rate_limiter;
        async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(300)).await;
                limiter.cleanup();
            }
        }
    });

    let router = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .merge(agui_routes);

    let mut router = router.with_state(state);

    if server_config.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Middleware that checks the Authorization header against the configured
/// API key.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ref expected_key) = state.server.api_key {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(key) if key == expected_key => {}
            _ => {
                warn!("unauthorized agent gateway request — invalid or missing API key");
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }
    Ok(next.run(request).await)
}

#[derive(Serialize)]
struct HealthzResponse {
    status: &'static str,
    service: &'static str,
}

async fn healthz_handler(State(state): State<Arc<AppState>>) -> Json<HealthzResponse> {
    state.metrics.inc_http_requests();
    Json(HealthzResponse {
        status: "ok",
        service: "agent-gateway",
    })
}

async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    let mut body = state.metrics.render_prometheus();
    body.push_str(&state.cache.prometheus_metrics("gateway"));
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

fn build_request(prompt: &str, tool: Option<&str>) -> LlmRequest {
    let tools = match tool {
        Some(name) if !name.is_empty() => vec![Tool {
            name: name.to_string(),
            description: format!("ad hoc tool '{name}' requested via the agent gateway"),
            parameters: json!({}),
            capabilities: vec![],
            is_mutating: false,
            risk_level: 0,
            provider: None,
        }],
        _ => vec![],
    };

    LlmRequest {
        model: "echo/v1".to_string(),
        messages: vec![Message::text(Uuid::new_v4(), Role::User, prompt)],
        tools,
        system: None,
        max_tokens: 4096,
        temperature: 0.7,
        thinking_level: None,
        stream: false,
    }
}

/// Whether this event should be surfaced under the wire type `"tool"`
/// rather than its raw Open Responses event name — true for any output
/// item carrying a function call.
fn is_tool_event(event: &OpenResponsesEvent) -> bool {
    matches!(
        event,
        OpenResponsesEvent::OutputItemAdded { item, .. } | OpenResponsesEvent::OutputItemDone { item, .. }
            if matches!(item.kind, ItemKind::FunctionCall { .. })
    )
}

fn wire_type(event: &OpenResponsesEvent) -> String {
    if is_tool_event(event) {
        "tool".to_string()
    } else {
        event.event_name().to_string()
    }
}

/// Wraps a translated event in the envelope the gateway's scenario
/// assertions expect: a `session_id` alongside every event, the
/// accumulated response text on the terminal `response.completed` event,
/// and function-call items surfaced as wire type `"tool"`.
fn envelope_event(event: &OpenResponsesEvent, session_id: &str, final_text: &str) -> SseEvent {
    let mut value = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    let data = value.as_object_mut().expect("event serializes to an object");
    data.remove("type");
    let sequence_number = data.remove("sequence_number").unwrap_or(json!(0));

    let mut data_value = serde_json::Value::Object(data.clone());
    if matches!(event, OpenResponsesEvent::ResponseCompleted { .. }) {
        data_value["text"] = json!(final_text);
    }

    let wire = wire_type(event);
    let envelope = json!({
        "type": wire.clone(),
        "sequence_number": sequence_number,
        "session_id": session_id,
        "data": data_value,
    });
    SseEvent::default().event(wire).data(envelope.to_string())
}

#[derive(Deserialize)]
struct StreamParams {
    prompt: Option<String>,
    session_id: Option<String>,
    tool: Option<String>,
}

/// `GET /agui/stream` — translates a live provider stream into the
/// envelope-wrapped Open Responses SSE sequence.
async fn agui_stream_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Sse<Pin<Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send>>> {
    state.metrics.inc_http_requests();
    state.metrics.inc_streams_started();

    let session_id = params.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let prompt = params.prompt.unwrap_or_default();
    let tool = params.tool;
    let metrics = state.metrics.clone();

    if prompt == "__error__" {
        let stream = async_stream::stream! {
            let mut builder = ResponseBuilder::new();
            let ev = builder.failed(StreamError::provider_error("forced error"));
            metrics.inc_streams_failed();
            yield Ok(envelope_event(&ev, &session_id, ""));
            yield Ok(SseEvent::default().data("[DONE]"));
        };
        return Sse::new(Box::pin(stream));
    }

    let request = build_request(&prompt, tool.as_deref());
    let client = state.client.clone();

    let stream = async_stream::stream! {
        let rx = match client.stream_chat(&request).await {
            Ok(rx) => rx,
            Err(e) => {
                let mut builder = ResponseBuilder::new();
                let ev = builder.failed(StreamError::provider_error(e.to_string()));
                metrics.inc_streams_failed();
                yield Ok(envelope_event(&ev, &session_id, ""));
                yield Ok(SseEvent::default().data("[DONE]"));
                return;
            }
        };

        let token = CancellationToken::new();
        let events = translate_stream(rx, token);
        futures::pin_mut!(events);
        let mut final_text = String::new();
        while let Some(ev) = futures::StreamExt::next(&mut events).await {
            if let OpenResponsesEvent::OutputTextDone { text, .. } = &ev {
                final_text = text.clone();
            }
            let terminal = ev.is_terminal();
            match &ev {
                OpenResponsesEvent::ResponseCompleted { .. } => metrics.inc_streams_completed(),
                OpenResponsesEvent::ResponseFailed { .. } => metrics.inc_streams_failed(),
                _ => {}
            }
            yield Ok(envelope_event(&ev, &session_id, &final_text));
            if terminal {
                break;
            }
        }
        yield Ok(SseEvent::default().data("[DONE]"));
    };

    Sse::new(Box::pin(stream))
}

#[derive(Deserialize)]
struct CreateTaskRequest {
    prompt: String,
    session_id: Option<String>,
    tool: Option<String>,
}

/// `POST /agui/tasks` — classifies and routes the task through the mesh,
/// then runs it in the background.
async fn create_task_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    state.metrics.inc_http_requests();
    if req.prompt.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let task_id = Uuid::new_v4();
    let session_id = req.session_id.clone().unwrap_or_else(|| task_id.to_string());
    let route = state
        .mesh
        .route_task(&task_id.to_string(), &req.prompt, &["gateway-worker".to_string()], false);
    info!(task_id = %task_id, topology = %route.topology, reasoning = %route.reasoning, "task routed through mesh");

    let record = Arc::new(TaskRecord::new(task_id, session_id, route));
    state.tasks.insert(task_id, record.clone());

    tokio::spawn(run_task(state.clone(), record, req.prompt, req.tool));

    Ok((
        StatusCode::CREATED,
        Json(json!({ "task_id": task_id, "status": "queued" })),
    ))
}

/// Built from the completed provider response, in the same shape
/// `translate_stream` would have produced for a live stream.
fn synthesize_events(turn: &CachedTurn) -> Vec<OpenResponsesEvent> {
    let mut builder = ResponseBuilder::new();
    let mut events = vec![builder.created(), builder.in_progress()];
    for call in &turn.tool_calls {
        events.extend(builder.function_call(&call.tool_name, &call.arguments.to_string()));
    }
    if !turn.text.is_empty() {
        events.extend(builder.text_delta(&turn.text));
        events.extend(builder.close_open_item());
    }
    events.push(builder.completed());
    events
}

async fn run_task(state: Arc<AppState>, record: Arc<TaskRecord>, prompt: String, tool: Option<String>) {
    record.set_status(TaskState::Running);

    if prompt == "__error__" {
        let mut builder = ResponseBuilder::new();
        let ev = builder.failed(StreamError::provider_error("forced error"));
        record.push_event(ev.clone());
        let _ = record.tx.send(ev);
        record.set_status(TaskState::Failed);
        state.metrics.inc_streams_failed();
        return;
    }

    let args = json!({ "prompt": prompt, "tool": tool });
    let request = build_request(&prompt, tool.as_deref());
    let task_id = record.id.to_string();

    let outcome: Result<CachedTurn, VerticeError> = state
        .cache
        .cached_call(None, &args, false, json!({ "task_id": task_id }), {
            let client = state.client.clone();
            let mesh = state.mesh.clone();
            let request = request.clone();
            let task_id = task_id.clone();
            move || async move {
                let results = execute_via_mesh(&mesh, &task_id, move |_node_id: String| {
                    let client = client.clone();
                    let request = request.clone();
                    async move { client.generate(&request).await }
                })
                .await?;
                let response = results
                    .into_iter()
                    .next()
                    .ok_or_else(|| VerticeError::Other("mesh produced no result".into()))??;
                Ok(CachedTurn {
                    text: response.message.text_content(),
                    tool_calls: response.message.tool_calls,
                    stop_reason: response.stop_reason,
                    usage: response.usage,
                })
            }
        })
        .await;

    match outcome {
        Ok(turn) => {
            state.metrics.add_llm_tokens(turn.usage.input_tokens, turn.usage.output_tokens);
            state.metrics.add_cost_usd(turn.usage.estimated_cost_usd);
            for ev in synthesize_events(&turn) {
                record.push_event(ev.clone());
                let _ = record.tx.send(ev);
            }
            record.set_status(TaskState::Completed);
            state.metrics.inc_streams_completed();
        }
        Err(e) => {
            warn!(error = %e, task_id = %record.id, "task failed");
            let mut builder = ResponseBuilder::new();
            let ev = builder.failed(StreamError::provider_error(e.to_string()));
            record.push_event(ev.clone());
            let _ = record.tx.send(ev);
            record.set_status(TaskState::Failed);
            state.metrics.inc_streams_failed();
        }
    }
}

/// `GET /agui/tasks/{id}` — current status and routing metadata.
async fn get_task_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state.metrics.inc_http_requests();
    let uuid = id.parse::<Uuid>().map_err(|_| StatusCode::BAD_REQUEST)?;
    let record = state
        .tasks
        .get(&uuid)
        .map(|r| r.value().clone())
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(json!({
        "task_id": id,
        "status": record.status(),
        "session_id": record.session_id,
        "topology": record.route.topology,
        "reasoning": record.route.reasoning,
    })))
}

/// `GET /agui/tasks/{id}/stream` — replays buffered events then follows
/// the task live until a terminal event, or the task has already finished.
async fn task_stream_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<Pin<Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send>>>, StatusCode> {
    state.metrics.inc_http_requests();
    let uuid = id.parse::<Uuid>().map_err(|_| StatusCode::BAD_REQUEST)?;
    let record = state
        .tasks
        .get(&uuid)
        .map(|r| r.value().clone())
        .ok_or(StatusCode::NOT_FOUND)?;

    let stream = async_stream::stream! {
        let mut rx = record.tx.subscribe();
        let mut final_text = String::new();
        let mut terminal_seen = false;

        for ev in record.snapshot_events() {
            if let OpenResponsesEvent::OutputTextDone { text, .. } = &ev {
                final_text = text.clone();
            }
            let terminal = ev.is_terminal();
            yield Ok(envelope_event(&ev, &record.session_id, &final_text));
            if terminal {
                terminal_seen = true;
                break;
            }
        }

        if !terminal_seen {
            while let Ok(ev) = rx.recv().await {
                if let OpenResponsesEvent::OutputTextDone { text, .. } = &ev {
                    final_text = text.clone();
                }
                let terminal = ev.is_terminal();
                yield Ok(envelope_event(&ev, &record.session_id, &final_text));
                if terminal {
                    break;
                }
            }
        }

        yield Ok(SseEvent::default().data("[DONE]"));
    };

    Ok(Sse::new(Box::pin(stream)))
}

/// Start the HTTP server.
pub async fn start_server(config: VerticeConfig) -> Result<(), VerticeError> {
    let listen = config.server.listen.clone();
    let router = build_router(config);

    info!(listen = %listen, "starting agent gateway");

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| VerticeError::Io(format!("failed to bind {listen}: {e}")))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| VerticeError::Io(format!("server error: {e}")))?;

    Ok(())
}
