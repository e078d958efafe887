//! Front door tests against an in-process mock backend.
//!
//! The runtime port is faked so each test controls when (and whether) a
//! backend becomes ready; forwarding goes over real TCP to an axum app that
//! speaks the backend's OpenAI-compatible API.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures_util::{StreamExt, stream};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceExt;

use llamarun_core::{
    ConfigSnapshot, InstancePhase, ModelConfigPort, ModelRuntimePort, RunnerSnapshot,
    RunningTarget, RuntimeError,
};
use llamarun_proxy::{Dialect, ProxyState, proxy_router};

// ── Mock backend ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Forwarded {
    path: &'static str,
    body: Value,
    headers: HeaderMap,
}

#[derive(Clone, Default)]
struct Backend {
    seen: Arc<Mutex<Vec<Forwarded>>>,
}

impl Backend {
    fn record(&self, path: &'static str, headers: HeaderMap, body: &Value) {
        self.seen.lock().unwrap().push(Forwarded {
            path,
            body: body.clone(),
            headers,
        });
    }

    fn seen(&self) -> Vec<Forwarded> {
        self.seen.lock().unwrap().clone()
    }
}

fn sse(events: &[Value]) -> Response {
    let mut text: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    text.push_str("data: [DONE]\n\n");
    ([(header::CONTENT_TYPE, "text/event-stream")], text).into_response()
}

/// Sends one chunk, then dies with the connection half-written.
fn crashing_stream() -> Response {
    let chunks = stream::iter([Ok::<_, io::Error>(Bytes::from_static(
        b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
    ))])
    .chain(stream::once(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err(io::Error::other("backend crashed"))
    }));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn completions(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record("/v1/completions", headers, &body);
    if body["stream"] == true {
        return sse(&[
            json!({"choices": [{"text": "Hel"}]}),
            json!({"choices": [{"text": "lo", "finish_reason": "stop"}]}),
        ]);
    }
    Json(json!({
        "choices": [{"text": "Hello", "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 2, "completion_tokens": 1}
    }))
    .into_response()
}

async fn chat(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record("/v1/chat/completions", headers, &body);
    let model = body["model"].as_str().unwrap_or_default().to_string();
    if model == "crashy" {
        return crashing_stream();
    }
    if body["stream"] == true {
        return sse(&[json!({"choices": [{"delta": {"content": format!("hello from {model}")}}]})]);
    }
    Json(json!({
        "choices": [{
            "message": {"role": "assistant", "content": format!("hello from {model}")},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 4}
    }))
    .into_response()
}

async fn embeddings(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record("/v1/embeddings", headers, &body);
    Json(json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
        "usage": {"prompt_tokens": 1, "total_tokens": 1}
    }))
    .into_response()
}

async fn spawn_backend() -> (u16, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/v1/completions", post(completions))
        .route("/v1/chat/completions", post(chat))
        .route("/v1/embeddings", post(embeddings))
        .with_state(backend.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (port, backend)
}

// ── Fake runtime ───────────────────────────────────────────────────────

#[derive(Debug)]
struct FakeRuntime {
    port: u16,
    config: Arc<ConfigSnapshot>,
    calls: AtomicUsize,
    ready: watch::Sender<bool>,
    failure: Option<RuntimeError>,
}

impl FakeRuntime {
    fn new(port: u16, config: Arc<ConfigSnapshot>) -> Self {
        Self {
            port,
            config,
            calls: AtomicUsize::new(0),
            ready: watch::Sender::new(true),
            failure: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRuntimePort for FakeRuntime {
    async fn ensure_running(&self, model_name: &str) -> Result<RunningTarget, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.config.model(model_name).is_none() {
            return Err(RuntimeError::UnknownModel(model_name.to_string()));
        }
        let mut rx = self.ready.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map_err(|_| RuntimeError::Internal("gate closed".into()))?;
        Ok(RunningTarget::local(self.port, model_name))
    }

    async fn stop(&self, _model_name: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn stop_all(&self) {}

    async fn is_running(&self, _model_name: &str) -> bool {
        *self.ready.borrow()
    }

    async fn port(&self, _model_name: &str) -> Option<u16> {
        Some(self.port)
    }

    async fn running(&self) -> Vec<RunnerSnapshot> {
        if !*self.ready.borrow() {
            return Vec::new();
        }
        vec![RunnerSnapshot {
            model: "m1".into(),
            phase: InstancePhase::Ready,
            port: Some(self.port),
            pid: None,
        }]
    }

    async fn probe_health(&self, _model_name: &str) -> Result<bool, RuntimeError> {
        match &self.failure {
            Some(err @ RuntimeError::CircuitOpen { .. }) => Err(err.clone()),
            _ => Ok(*self.ready.borrow()),
        }
    }
}

// ── Harness ────────────────────────────────────────────────────────────

fn config() -> Arc<ConfigSnapshot> {
    let json = json!({
        "models": {
            "m1": {"model_path": "/models/m1.gguf", "display_name": "Model One"},
            "crashy": {"model_path": "/models/crashy.gguf"}
        }
    });
    Arc::new(ConfigSnapshot::from_json(&json.to_string()).unwrap())
}

fn router(dialect: Dialect, runtime: Arc<FakeRuntime>, config: Arc<ConfigSnapshot>) -> Router {
    let state = ProxyState::new(dialect, runtime, config, Duration::from_secs(30)).unwrap();
    proxy_router(state)
}

async fn setup(dialect: Dialect) -> (Router, Arc<FakeRuntime>, Backend) {
    let (port, backend) = spawn_backend().await;
    let config = config();
    let runtime = Arc::new(FakeRuntime::new(port, Arc::clone(&config)));
    (router(dialect, Arc::clone(&runtime), config), runtime, backend)
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    text: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap()
    }

    /// Last SSE frame, without the `data: ` prefix.
    fn last_frame(&self) -> &str {
        self.text
            .trim_end()
            .rsplit("\n\n")
            .next()
            .unwrap()
            .trim_start_matches("data: ")
    }
}

async fn send(router: Router, request: Request<Body>) -> Reply {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        headers,
        text: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

async fn post_json(router: Router, path: &str, body: Value) -> Reply {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-request-id", "req-42")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn get(router: Router, path: &str) -> Reply {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(router, request).await
}

// ── Pipeline ───────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_for_cold_model_streams_backend_bytes() {
    let (router, runtime, backend) = setup(Dialect::Ollama).await;

    let reply = post_json(router, "/api/generate", json!({"model": "m1:latest", "prompt": "hi"})).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "text/event-stream");
    assert!(reply.text.contains("\"Hel\""));
    assert!(reply.text.ends_with("data: [DONE]\n\n"));
    assert_eq!(runtime.calls(), 1);

    let seen = backend.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/v1/completions");
    assert_eq!(seen[0].body["model"], "m1");
    assert_eq!(seen[0].body["prompt"], "hi");
    assert_eq!(seen[0].body["stream"], true);
}

#[tokio::test]
async fn concurrent_chats_wait_for_the_same_readiness() {
    let (port, backend) = spawn_backend().await;
    let config = config();
    let runtime = Arc::new(FakeRuntime::new(port, Arc::clone(&config)));
    runtime.ready.send_replace(false);
    let router = router(Dialect::Ollama, Arc::clone(&runtime), config);

    let body = json!({"model": "m1", "messages": [{"role": "user", "content": "hi"}]});
    let open_gate = async {
        while runtime.calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(backend.seen().is_empty(), "forwarded before the backend was ready");
        runtime.ready.send_replace(true);
    };

    let (first, second, ()) = tokio::join!(
        post_json(router.clone(), "/api/chat", body.clone()),
        post_json(router, "/api/chat", body),
        open_gate
    );

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(first.text, second.text);
    assert!(first.text.contains("hello from m1"));
    assert_eq!(backend.seen().len(), 2);
}

#[tokio::test]
async fn backend_crash_mid_stream_ends_with_error_frame() {
    let (router, _runtime, _backend) = setup(Dialect::Ollama).await;

    let reply = post_json(
        router,
        "/api/chat",
        json!({"model": "crashy", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text.contains("partial"));
    assert!(reply.text.ends_with("\n\n"));
    assert!(!reply.text.contains("[DONE]"));
    let last: Value = serde_json::from_str(reply.last_frame()).unwrap();
    assert!(
        last["error"].as_str().unwrap().contains("crashy"),
        "unexpected frame: {last}"
    );
}

#[tokio::test]
async fn missing_model_yields_single_error_frame() {
    let (router, runtime, backend) = setup(Dialect::Ollama).await;

    let reply = post_json(router, "/api/generate", json!({"prompt": "hi"})).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.text, "data: {\"error\":\"Model name not specified\"}\n\n");
    assert_eq!(runtime.calls(), 0);
    assert!(backend.seen().is_empty());
}

#[tokio::test]
async fn unknown_model_is_a_404_in_openai_shape() {
    let (router, _runtime, backend) = setup(Dialect::OpenAi).await;

    let reply = post_json(
        router,
        "/v1/chat/completions",
        json!({"model": "ghost", "messages": []}),
    )
    .await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    let body = reply.json();
    assert_eq!(body["error"]["code"], "model_not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("ghost"));
    assert!(backend.seen().is_empty());
}

#[tokio::test]
async fn health_reports_open_probe_circuit() {
    let (port, _backend) = spawn_backend().await;
    let config = config();
    let runtime = Arc::new(FakeRuntime {
        failure: Some(RuntimeError::CircuitOpen {
            circuit: "health:m1".into(),
            retry_after_secs: 30,
        }),
        ..FakeRuntime::new(port, Arc::clone(&config))
    });
    let router = router(Dialect::Ollama, runtime, config);

    let health = get(router, "/health").await.json();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["probes"]["m1"], "circuit_open");
}

#[tokio::test]
async fn queued_request_is_rejected_as_unavailable() {
    let (port, backend) = spawn_backend().await;
    let config = config();
    let runtime = Arc::new(FakeRuntime {
        failure: Some(RuntimeError::AdmissionTimeout {
            model: "m1".into(),
            waited_secs: 3,
        }),
        ..FakeRuntime::new(port, Arc::clone(&config))
    });
    let router = router(Dialect::OpenAi, runtime, config);

    let reply = post_json(
        router,
        "/v1/chat/completions",
        json!({"model": "m1", "messages": []}),
    )
    .await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.headers[header::RETRY_AFTER], "5");
    assert_eq!(reply.json()["error"]["code"], "capacity_exhausted");
    assert!(backend.seen().is_empty());
}

#[tokio::test]
async fn open_circuit_rejects_with_retry_after() {
    let (port, _backend) = spawn_backend().await;
    let config = config();
    let runtime = Arc::new(FakeRuntime {
        failure: Some(RuntimeError::CircuitOpen {
            circuit: "launch:m1".into(),
            retry_after_secs: 30,
        }),
        ..FakeRuntime::new(port, Arc::clone(&config))
    });
    let router = router(Dialect::Ollama, runtime, config);

    let reply = post_json(router, "/api/chat", json!({"model": "m1", "messages": []})).await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.headers[header::RETRY_AFTER], "30");
    assert!(reply.text.starts_with("data: {\"error\":"));
}

#[tokio::test]
async fn ollama_embeddings_are_reshaped() {
    let (router, _runtime, backend) = setup(Dialect::Ollama).await;

    let reply = post_json(
        router,
        "/api/embeddings",
        json!({"model": "m1", "prompt": "embed this"}),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"embedding": [0.1, 0.2, 0.3]}));
    let seen = backend.seen();
    assert_eq!(seen[0].path, "/v1/embeddings");
    assert_eq!(seen[0].body, json!({"model": "m1", "input": "embed this"}));
}

#[tokio::test]
async fn ollama_non_streaming_chat_is_one_object() {
    let (router, _runtime, _backend) = setup(Dialect::Ollama).await;

    let reply = post_json(
        router,
        "/api/chat",
        json!({"model": "m1", "stream": false, "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["model"], "m1");
    assert_eq!(body["message"]["content"], "hello from m1");
    assert_eq!(body["done"], true);
    assert_eq!(body["prompt_eval_count"], 3);
}

#[tokio::test]
async fn openai_requests_pass_through_with_headers() {
    let (router, _runtime, backend) = setup(Dialect::OpenAi).await;

    let reply = post_json(
        router,
        "/v1/completions",
        json!({"model": "m1", "prompt": "hi", "temperature": 0.3, "n_probs": 2}),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["choices"][0]["text"], "Hello");

    let seen = backend.seen();
    assert_eq!(seen[0].body["temperature"], 0.3);
    assert_eq!(seen[0].body["n_probs"], 2);
    assert_eq!(seen[0].headers["x-request-id"], "req-42");
}

// ── Listing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn ollama_listing_routes() {
    let (router, _runtime, _backend) = setup(Dialect::Ollama).await;

    let root = get(router.clone(), "/").await;
    assert_eq!(root.text, "Ollama is running");

    let tags = get(router.clone(), "/api/tags").await.json();
    let names: Vec<&str> = tags["models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["crashy", "m1"]);

    let show = post_json(router.clone(), "/api/show", json!({"model": "m1:latest"})).await;
    assert_eq!(show.status, StatusCode::OK);
    assert_eq!(show.json()["modelfile"], "FROM /models/m1.gguf");
    assert_eq!(show.json()["model_info"]["general.name"], "Model One");

    let missing = post_json(router.clone(), "/api/show", json!({"name": "ghost"})).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let version = get(router, "/api/version").await.json();
    assert!(version["version"].is_string());
}

#[tokio::test]
async fn openai_listing_and_health() {
    let (router, _runtime, _backend) = setup(Dialect::OpenAi).await;

    let models = get(router.clone(), "/v1/models").await.json();
    assert_eq!(models["object"], "list");
    assert_eq!(models["data"][1]["id"], "m1");
    assert_eq!(models["data"][1]["description"], "Model One");

    let health = get(router.clone(), "/health").await.json();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["dialect"], "openai");
    assert_eq!(health["backends"][0]["model"], "m1");
    assert_eq!(health["probes"]["m1"], "ok");

    // Ollama-only routes are not mounted on the OpenAI front door.
    let tags = get(router, "/api/tags").await;
    assert_eq!(tags.status, StatusCode::NOT_FOUND);
}
