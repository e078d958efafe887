//! Per-dialect front door routers.
//!
//! Each request runs one pipeline: parse the body, resolve the model name,
//! make sure a backend is ready, translate, forward, relay. Streaming
//! requests report every failure as a single inline error frame; buffered
//! requests get a dialect-shaped JSON error with a matching status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Client;
use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use llamarun_core::{ModelConfigPort, ModelRuntimePort, RuntimeError};

use crate::adapter::{Dialect, OperationKind};
use crate::forward;
use crate::frames::error_frame;
use crate::models::{
    ModelsResponse, OLLAMA_COMPAT_VERSION, OLLAMA_ROOT_RESPONSE, OllamaShowResponse,
    OllamaTagsResponse, OllamaVersionResponse,
};

const OPERATIONS: [OperationKind; 3] = [
    OperationKind::Completion,
    OperationKind::Chat,
    OperationKind::Embeddings,
];

/// Shared state for one front door, injected via Axum `State`.
#[derive(Clone, Debug)]
pub struct ProxyState {
    pub dialect: Dialect,
    /// HTTP client for forwarding requests to backends.
    pub client: Client,
    pub runtime: Arc<dyn ModelRuntimePort>,
    pub config: Arc<dyn ModelConfigPort>,
}

impl ProxyState {
    /// Build state with a client whose per-request timeout is `request_timeout`.
    pub fn new(
        dialect: Dialect,
        runtime: Arc<dyn ModelRuntimePort>,
        config: Arc<dyn ModelConfigPort>,
        request_timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            dialect,
            client,
            runtime,
            config,
        })
    }
}

/// Build the router for `state.dialect`.
pub fn proxy_router(state: ProxyState) -> Router {
    let mut router = Router::<ProxyState>::new().route("/health", get(health_check));

    router = match state.dialect {
        Dialect::Ollama => router
            .route("/", get(ollama_root))
            .route("/api/version", get(ollama_version))
            .route("/api/tags", get(ollama_tags))
            .route("/api/show", post(ollama_show)),
        Dialect::OpenAi => router.route("/v1/models", get(list_models)),
    };

    for op in OPERATIONS {
        router = router.route(
            state.dialect.client_path(op),
            post(
                move |State(state): State<ProxyState>,
                      method: Method,
                      headers: HeaderMap,
                      body: Bytes| async move {
                    run_pipeline(&state, op, method, &headers, &body).await
                },
            ),
        );
    }

    router.with_state(state)
}

async fn run_pipeline(
    state: &ProxyState,
    op: OperationKind,
    method: Method,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let dialect = state.dialect;

    let inbound: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(dialect = dialect.name(), "Invalid request body: {e}");
            let streaming = dialect.wants_stream(op, &Value::Null);
            return reject(
                dialect,
                streaming,
                StatusCode::BAD_REQUEST,
                &format!("Invalid request body: {e}"),
                Some("invalid_request"),
            );
        }
    };
    let streaming = dialect.wants_stream(op, &inbound);

    let Some(model) = dialect.extract_model_name(&inbound) else {
        warn!(dialect = dialect.name(), "Request without a model name");
        return reject(
            dialect,
            streaming,
            StatusCode::BAD_REQUEST,
            "Model name not specified",
            Some("model_not_specified"),
        );
    };

    info!(
        model = %model,
        dialect = dialect.name(),
        streaming = %streaming,
        "POST {}",
        dialect.client_path(op)
    );

    let started = Instant::now();
    let target = match state.runtime.ensure_running(&model).await {
        Ok(target) => target,
        Err(e) => {
            error!(model = %model, "Backend unavailable: {e}");
            return runtime_rejection(dialect, streaming, &e);
        }
    };
    debug!(
        model = %model,
        port = %target.port,
        waited_ms = %started.elapsed().as_millis(),
        "Backend ready"
    );

    let canonical = dialect.translate_request(op, &inbound, &model);
    let url = target.url(op.backend_path());

    let upstream = match forward::send(&state.client, method, &url, headers, &canonical, &model).await
    {
        Ok(response) => response,
        Err(e) => {
            error!(model = %model, "{e}");
            return runtime_rejection(dialect, streaming, &e);
        }
    };

    if !upstream.status().is_success() {
        return relay_backend_error(dialect, streaming, upstream, &model).await;
    }

    if streaming {
        forward::streaming_response(upstream, dialect, model)
    } else {
        buffered_response(dialect, op, upstream, &model).await
    }
}

/// Buffer the whole backend answer and reshape it for the client.
async fn buffered_response(
    dialect: Dialect,
    op: OperationKind,
    upstream: reqwest::Response,
    model: &str,
) -> Response {
    let (status, bytes) = match forward::read_body(upstream, model).await {
        Ok(read) => read,
        Err(e) => {
            error!(model = %model, "{e}");
            return runtime_rejection(dialect, false, &e);
        }
    };

    let parsed: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            error!(model = %model, "Failed to parse backend JSON: {e}");
            return reject(
                dialect,
                false,
                StatusCode::BAD_GATEWAY,
                &format!("Invalid backend response: {e}"),
                Some("backend_error"),
            );
        }
    };

    (status, Json(dialect.translate_response(op, &parsed, model))).into_response()
}

async fn relay_backend_error(
    dialect: Dialect,
    streaming: bool,
    upstream: reqwest::Response,
    model: &str,
) -> Response {
    let status = upstream.status();
    let detail = match forward::read_body(upstream, model).await {
        Ok((_, bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => e.to_string(),
    };
    error!(model = %model, status = %status, "Backend error: {detail}");
    reject(
        dialect,
        streaming,
        status,
        &format!("Backend error {status}: {detail}"),
        Some("backend_error"),
    )
}

/// Error response in the client's dialect: one SSE frame when the client is
/// reading a stream, a JSON document otherwise.
fn reject(
    dialect: Dialect,
    streaming: bool,
    status: StatusCode,
    message: &str,
    code: Option<&str>,
) -> Response {
    if streaming {
        return Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from(error_frame(dialect, message)))
            .unwrap_or_else(|_| status.into_response());
    }
    (status, Json(dialect.error_body(message, code))).into_response()
}

/// Convert a runtime error to a response, adding `Retry-After` when the
/// error says when a retry could succeed.
fn runtime_rejection(dialect: Dialect, streaming: bool, err: &RuntimeError) -> Response {
    let status = StatusCode::from_u16(err.suggested_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = reject(dialect, streaming, status, &err.to_string(), Some(error_code(err)));
    if let Some(secs) = err.retry_after_secs() {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

const fn error_code(err: &RuntimeError) -> &'static str {
    match err {
        RuntimeError::UnknownModel(_) => "model_not_found",
        RuntimeError::UnknownRuntime { .. } => "runtime_not_found",
        RuntimeError::Launch { .. } | RuntimeError::BackendExited { .. } => "launch_failed",
        RuntimeError::StartupTimeout { .. } => "startup_timeout",
        RuntimeError::AdmissionTimeout { .. } => "capacity_exhausted",
        RuntimeError::CircuitOpen { .. } => "circuit_open",
        RuntimeError::Stopped(_) => "model_stopped",
        RuntimeError::BackendCommunication { .. } => "backend_error",
        RuntimeError::Internal(_) => "internal_error",
    }
}

// ── Listing ────────────────────────────────────────────────────────────

async fn health_check(State(state): State<ProxyState>) -> impl IntoResponse {
    let backends = state.runtime.running().await;
    let ready: Vec<_> = backends
        .iter()
        .filter(|b| b.port.is_some())
        .map(|b| b.model.clone())
        .collect();
    let outcomes = join_all(ready.iter().map(|m| state.runtime.probe_health(m))).await;
    let probes: Map<String, Value> = ready
        .into_iter()
        .zip(outcomes)
        .map(|(model, outcome)| {
            let verdict = match outcome {
                Ok(true) => "ok",
                Ok(false) => "unhealthy",
                Err(RuntimeError::CircuitOpen { .. }) => "circuit_open",
                Err(_) => "error",
            };
            (model, Value::from(verdict))
        })
        .collect();

    Json(json!({
        "status": "ok",
        "dialect": state.dialect.name(),
        "backends": backends,
        "probes": probes,
    }))
}

async fn ollama_root() -> impl IntoResponse {
    OLLAMA_ROOT_RESPONSE
}

async fn ollama_version() -> impl IntoResponse {
    Json(OllamaVersionResponse {
        version: OLLAMA_COMPAT_VERSION.to_string(),
    })
}

async fn ollama_tags(State(state): State<ProxyState>) -> impl IntoResponse {
    debug!("GET /api/tags");
    Json(OllamaTagsResponse::from_descriptors(&state.config.models()))
}

async fn ollama_show(State(state): State<ProxyState>, Json(body): Json<Value>) -> Response {
    let name = Dialect::Ollama.extract_model_name(&body).unwrap_or_default();
    debug!(model = %name, "POST /api/show");

    match state.config.model(&name) {
        Some(model) => Json(OllamaShowResponse::from_descriptor(&model)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(Dialect::Ollama.error_body(&format!("model '{name}' not found"), None)),
        )
            .into_response(),
    }
}

async fn list_models(State(state): State<ProxyState>) -> impl IntoResponse {
    debug!("GET /v1/models");
    Json(ModelsResponse::from_descriptors(&state.config.models()))
}
