use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::ChatSession;
use crate::config::{HttpServerConfig, LayoutConfig};
use crate::context::ContextSelector;
use crate::error::{MindOrbitError, Result};
use crate::graph::{ForceSimulation, GraphStats, LayoutHandle, LayoutParams, LayoutSnapshot, NodePosition, RelationGraph};
use crate::kb::{capture_item, KnowledgeBase};
use crate::llm::{KnowledgeModel, MISSING_KEY_ANSWER};
use crate::models::{ChatMessage, ItemType, KnowledgeItem};

/// Ticks run by `/api/graph/layout` when none are requested.
const DEFAULT_SETTLE_TICKS: usize = 300;
const MAX_SETTLE_TICKS: usize = 5000;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    kb: Arc<RwLock<KnowledgeBase>>,
    chat: Arc<Mutex<ChatSession>>,
    model: Arc<dyn KnowledgeModel>,
    layout: LayoutParams,
    tick_interval: Duration,
}

impl AppState {
    pub fn new(
        kb: KnowledgeBase,
        model: Arc<dyn KnowledgeModel>,
        selector: ContextSelector,
        layout: &LayoutConfig,
    ) -> Self {
        let chat = ChatSession::new(selector, kb.len());
        Self {
            kb: Arc::new(RwLock::new(kb)),
            chat: Arc::new(Mutex::new(chat)),
            model,
            layout: LayoutParams::from(layout),
            tick_interval: Duration::from_millis(layout.tick_interval_ms),
        }
    }
}

/// HTTP server wrapper
pub struct HttpServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

impl HttpServer {
    pub fn new(state: AppState, config: &HttpServerConfig) -> Self {
        Self {
            state,
            allowed_origins: config.allowed_origins.clone(),
        }
    }

    /// Run the HTTP server until it fails
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = create_router(self.state.clone(), &self.allowed_origins);

        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            MindOrbitError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Starting MindOrbit HTTP server on http://{}", addr);

        axum::serve(listener, app).await.map_err(|e| {
            MindOrbitError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }
}

/// Build the API router with CORS and request tracing.
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/items", get(handle_list_items).post(handle_create_item))
        .route("/api/items/:id", get(handle_get_item).delete(handle_delete_item))
        .route("/api/graph", get(handle_graph))
        .route("/api/graph/layout", get(handle_graph_layout))
        .route("/api/graph/stream", get(handle_graph_stream))
        .route("/api/stats", get(handle_stats))
        .route("/api/chat", get(handle_get_chat).post(handle_post_chat))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors(allowed_origins)),
        )
        .with_state(state)
}

/// Any origin when none are configured, otherwise exactly the configured list.
fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Error response carrying `{"error": ...}`.
struct ApiError(MindOrbitError);

impl From<MindOrbitError> for ApiError {
    fn from(err: MindOrbitError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            MindOrbitError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            MindOrbitError::ItemNotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            MindOrbitError::MissingCredential(var) => {
                log::warn!("Request rejected: {} is not set", var);
                (StatusCode::SERVICE_UNAVAILABLE, MISSING_KEY_ANSWER.to_string())
            }
            other => {
                log::error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(MindOrbitError::InvalidInput(format!("Invalid JSON: {}", e))))
}

#[derive(Debug, Deserialize)]
struct CreateItemRequest {
    content: String,
    #[serde(rename = "type", default)]
    item_type: Option<ItemType>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(Debug, Deserialize)]
struct LayoutQuery {
    ticks: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LayoutResponse {
    graph: RelationGraph,
    ticks: usize,
    alpha: f64,
    settled: bool,
    positions: Vec<NodePosition>,
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "mindorbit",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_list_items(State(state): State<AppState>) -> Json<Vec<KnowledgeItem>> {
    let kb = state.kb.read().await;
    Json(kb.sorted_by_created().into_iter().cloned().collect())
}

/// Analysis runs before the write lock is taken so slow model calls don't
/// block readers.
async fn handle_create_item(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<KnowledgeItem>)> {
    let request: CreateItemRequest = parse_body(&body)?;
    let item_type = request.item_type.unwrap_or(ItemType::Text);
    let item = capture_item(state.model.as_ref(), &request.content, item_type).await?;
    state.kb.write().await.add(item.clone()).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn handle_get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<KnowledgeItem>> {
    let kb = state.kb.read().await;
    let item = kb.get(&id).cloned().ok_or(MindOrbitError::ItemNotFound(id))?;
    Ok(Json(item))
}

async fn handle_delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<KnowledgeItem>> {
    let removed = state.kb.write().await.delete(&id).await?;
    Ok(Json(removed))
}

async fn handle_graph(State(state): State<AppState>) -> Json<RelationGraph> {
    Json(state.kb.read().await.graph())
}

/// Settle the layout on the blocking pool and return the final positions.
async fn handle_graph_layout(
    State(state): State<AppState>,
    query: std::result::Result<Query<LayoutQuery>, QueryRejection>,
) -> ApiResult<Json<LayoutResponse>> {
    let Query(query) = query
        .map_err(|e| ApiError(MindOrbitError::InvalidInput(e.body_text())))?;
    let graph = state.kb.read().await.graph();
    let max_ticks = query.ticks.unwrap_or(DEFAULT_SETTLE_TICKS).min(MAX_SETTLE_TICKS);
    let params = state.layout;

    let response = tokio::task::spawn_blocking(move || {
        let mut sim = ForceSimulation::new(&graph, params);
        let ticks = sim.settle(max_ticks);
        LayoutResponse {
            ticks,
            alpha: sim.alpha(),
            settled: sim.is_settled(),
            positions: sim.positions(),
            graph,
        }
    })
    .await
    .map_err(|e| MindOrbitError::Layout(format!("layout task failed: {}", e)))?;

    Ok(Json(response))
}

/// Snapshot stream that owns its layout task; dropping it stops the task.
struct LayoutStream {
    snapshots: WatchStream<LayoutSnapshot>,
    _handle: LayoutHandle,
}

impl LayoutStream {
    fn new(handle: LayoutHandle) -> Self {
        Self {
            snapshots: WatchStream::new(handle.subscribe()),
            _handle: handle,
        }
    }
}

impl Stream for LayoutStream {
    type Item = LayoutSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().snapshots).poll_next(cx)
    }
}

/// Stream the graph once, then a `tick` event per published layout snapshot.
///
/// The layout task lives inside the response stream, so it stops as soon as
/// the client disconnects.
async fn handle_graph_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let graph = state.kb.read().await.graph();
    let handle = LayoutHandle::start(&graph, state.layout, state.tick_interval);

    let graph_event = Event::default()
        .event("graph")
        .data(serde_json::to_string(&graph).unwrap_or_default());

    let ticks = LayoutStream::new(handle).map(|snapshot| {
        Ok::<Event, Infallible>(
            Event::default()
                .event("tick")
                .data(serde_json::to_string(&snapshot).unwrap_or_default()),
        )
    });

    let stream = tokio_stream::once(Ok(graph_event)).chain(ticks);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn handle_stats(State(state): State<AppState>) -> Json<GraphStats> {
    Json(state.kb.read().await.stats())
}

async fn handle_get_chat(State(state): State<AppState>) -> Json<Vec<ChatMessage>> {
    let item_count = state.kb.read().await.len();
    let mut chat = state.chat.lock().await;
    chat.refresh_welcome(item_count);
    Json(chat.messages().to_vec())
}

/// The chat lock is held across the model call so turns stay paired.
async fn handle_post_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ChatMessage>> {
    let request: ChatRequest = parse_body(&body)?;
    let items = state.kb.read().await.items().to_vec();

    let mut chat = state.chat.lock().await;
    chat.refresh_welcome(items.len());
    let reply = chat
        .ask(state.model.as_ref(), &request.question, &items)
        .await?
        .clone();
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockModel;
    use crate::store::JsonFileStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app(temp_dir: &TempDir, model: MockModel) -> Router {
        let store = Arc::new(JsonFileStore::new(temp_dir.path().join("items.json")));
        let kb = KnowledgeBase::load(store).await.unwrap();
        let state = AppState::new(kb, Arc::new(model), ContextSelector::default(), &LayoutConfig::default());
        create_router(state, &[])
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_item_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;

        let (status, created) = send(
            &app,
            "POST",
            "/api/items",
            Some(json!({"content": "https://example.com/a", "type": "URL"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["type"], "URL");
        assert_eq!(created["category"], "Science");
        let id = created["id"].as_str().unwrap().to_string();

        send(&app, "POST", "/api/items", Some(json!({"content": "second note"}))).await;

        let (_, items) = send(&app, "GET", "/api/items", None).await;
        assert_eq!(items.as_array().unwrap().len(), 2);

        let (status, item) = send(&app, "GET", &format!("/api/items/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["id"], id.as_str());

        let (_, graph) = send(&app, "GET", "/api/graph", None).await;
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(graph["edges"].as_array().unwrap().len(), 1);

        let (_, stats) = send(&app, "GET", "/api/stats", None).await;
        assert_eq!(stats, json!({"nodes": 2, "categories": 1}));

        let (status, _) = send(&app, "DELETE", &format!("/api/items/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", &format!("/api/items/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(&id));

        let (_, graph) = send(&app, "GET", "/api/graph", None).await;
        assert!(graph["edges"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_item_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;

        let (status, body) = send(&app, "POST", "/api/items", Some(json!({"content": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(&app, "POST", "/api/items", Some(json!({"text": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "DELETE", "/api/items/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_item_without_api_key() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::missing_key()).await;

        let (status, body) = send(&app, "POST", "/api/items", Some(json!({"content": "some note"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], crate::llm::MISSING_KEY_ANSWER);

        let (_, items) = send(&app, "GET", "/api/items", None).await;
        assert!(items.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_welcome_tracks_item_count() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;
        send(&app, "POST", "/api/items", Some(json!({"content": "a"}))).await;
        send(&app, "POST", "/api/items", Some(json!({"content": "b"}))).await;

        let (_, transcript) = send(&app, "GET", "/api/chat", None).await;
        assert_eq!(transcript.as_array().unwrap().len(), 1);
        assert!(transcript[0]["text"].as_str().unwrap().contains("based on the 2 knowledge nodes"));
    }

    #[tokio::test]
    async fn test_chat_endpoints() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;

        let (_, transcript) = send(&app, "GET", "/api/chat", None).await;
        assert_eq!(transcript.as_array().unwrap().len(), 1);
        assert!(transcript[0]["text"].as_str().unwrap().contains("0 knowledge nodes"));

        let (status, reply) = send(&app, "POST", "/api/chat", Some(json!({"question": "What now?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["role"], "model");
        assert_eq!(reply["text"], "Mock answer");

        let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"question": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, transcript) = send(&app, "GET", "/api/chat", None).await;
        assert_eq!(transcript.as_array().unwrap().len(), 3);
        assert_eq!(transcript[1]["role"], "user");
    }

    #[tokio::test]
    async fn test_chat_failure_returns_apology() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::failing()).await;
        let (status, reply) = send(&app, "POST", "/api/chat", Some(json!({"question": "Why?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["text"], crate::llm::APOLOGY);
    }

    #[tokio::test]
    async fn test_graph_layout() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;
        for content in ["a", "b", "c"] {
            send(&app, "POST", "/api/items", Some(json!({"content": content}))).await;
        }

        let (status, layout) = send(&app, "GET", "/api/graph/layout?ticks=50", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(layout["ticks"], 50);
        assert_eq!(layout["settled"], false);
        assert_eq!(layout["positions"].as_array().unwrap().len(), 3);
        assert_eq!(layout["graph"]["edges"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_graph_layout_rejects_bad_ticks() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;

        let (status, body) = send(&app, "GET", "/api/graph/layout?ticks=many", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, layout) = send(&app, "GET", "/api/graph/layout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(layout["positions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_graph_stream_starts_with_graph_event() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, MockModel::ok()).await;
        send(&app, "POST", "/api/items", Some(json!({"content": "a"}))).await;

        let request = Request::builder().uri("/api/graph/stream").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let mut body = response.into_body().into_data_stream();
        let first = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.starts_with("event: graph"));
        assert!(text.contains("\"nodes\""));
    }
}
