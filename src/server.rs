use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{RagweaveError, Result};
use crate::ingest::Collections;
use crate::models::{Document, Record};
use crate::store::{DocumentStore, DEFAULT_LIST_LIMIT};

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
    /// `None` disables the bearer check (authless mode)
    api_key: Option<String>,
}

/// HTTP query API over the document store
pub struct QueryServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

impl QueryServer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collections: Collections,
        api_key: Option<String>,
        allowed_origins: Vec<String>,
    ) -> Self {
        if api_key.is_none() {
            log::warn!("HTTP server running in authless mode");
        }
        Self {
            state: AppState {
                store,
                collections,
                api_key,
            },
            allowed_origins,
        }
    }

    /// Run the HTTP server until the process is stopped
    pub async fn run(&self, port: u16) -> Result<()> {
        let addr = format!("127.0.0.1:{}", port);

        if !check_port_available(port).await {
            return Err(RagweaveError::Config(format!(
                "Port {} is already in use. Use a different port by setting http_server.port in config.toml or --port",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        log::info!("Starting query API on http://{}", addr);

        axum::serve(listener, self.router()).await.map_err(|e| {
            RagweaveError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    /// Create the axum router
    pub fn router(&self) -> Router {
        // No origins configured: allow any (local use)
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handle_health))
            .route("/documents", get(handle_documents))
            .route("/search", post(handle_search))
            .route("/search/bm25", post(handle_bm25))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

fn default_k() -> usize {
    3
}

fn default_neighbors() -> usize {
    1
}

fn default_bm25_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default = "default_neighbors")]
    neighbors: usize,
}

#[derive(Debug, Deserialize)]
struct Bm25Request {
    query: String,
    /// Defaults to the chunk class
    class: Option<String>,
    /// Defaults to `["text"]`
    properties: Option<Vec<String>>,
    #[serde(default = "default_bm25_k")]
    k: usize,
}

/// Map a library error onto an HTTP status and JSON body
fn error_response(err: RagweaveError) -> Response {
    let status = match &err {
        RagweaveError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RagweaveError::ClassNotFound(_) => StatusCode::NOT_FOUND,
        RagweaveError::StoreUnavailable { .. } | RagweaveError::StoreRequest { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log::error!("Request failed: {}", err);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Handle health check endpoint
async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "ragweave",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

/// List every ingested Document (without its text)
async fn handle_documents(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }
    match state
        .store
        .list(&state.collections.documents, Document::PROPERTIES, DEFAULT_LIST_LIMIT)
        .await
    {
        Ok(documents) => Json(json!({ "count": documents.len(), "documents": documents })).into_response(),
        Err(e) => error_response(e),
    }
}

/// Semantic search over chunks with neighbor expansion
async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Response {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }
    if request.query.trim().is_empty() {
        return error_response(RagweaveError::InvalidInput("query must not be empty".to_string()));
    }
    match state
        .store
        .search_near_text(&state.collections.chunks, &request.query, request.k, request.neighbors)
        .await
    {
        Ok(results) => Json(json!({ "count": results.len(), "results": results })).into_response(),
        Err(e) => error_response(e),
    }
}

/// Keyword search over any class
async fn handle_bm25(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<Bm25Request>,
) -> Response {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }
    let class = request
        .class
        .unwrap_or_else(|| state.collections.chunks.clone());
    let properties = request.properties.unwrap_or_else(|| vec!["text".to_string()]);
    let properties: Vec<&str> = properties.iter().map(String::as_str).collect();

    match state
        .store
        .search_bm25(&class, &request.query, &properties, request.k)
        .await
    {
        Ok(results) => Json(json!({ "count": results.len(), "results": results })).into_response(),
        Err(e) => error_response(e),
    }
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> std::result::Result<(), Response> {
    match &state.api_key {
        Some(key) => validate_auth(headers, key),
        None => Ok(()),
    }
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Missing Authorization header",
                    "message": "Use 'Authorization: Bearer <api-key>' header"
                })),
            )
                .into_response()
        })?;

    let Some(provided_key) = auth_header.strip_prefix("Bearer ") else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Invalid Authorization header format",
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response());
    };

    if provided_key != expected_key {
        return Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid API key" }))).into_response());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Properties;
    use crate::store::InMemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn seeded_server(api_key: Option<&str>) -> Router {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..5 {
            let mut props = Properties::new();
            props.insert("source".into(), json!("/docs/guide.pdf"));
            props.insert("chunk_id".into(), json!(i));
            props.insert(
                "text".into(),
                json!(if i == 2 { "configure the cluster" } else { "unrelated filler" }),
            );
            store.create("DocumentChunk", props).await.unwrap();
        }
        let mut doc = Properties::new();
        doc.insert("source".into(), json!("/docs/guide.pdf"));
        doc.insert("size".into(), json!(1234));
        doc.insert("text".into(), json!("full text is never listed"));
        store.create("Document", doc).await.unwrap();

        QueryServer::new(
            store,
            Collections::default(),
            api_key.map(str::to_string),
            vec![],
        )
        .router()
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = seeded_server(Some("k")).await;
        let (status, body) = call(app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["service"], json!("ragweave"));
    }

    #[tokio::test]
    async fn test_auth_required() {
        let app = seeded_server(Some("k")).await;
        let (status, _) = call(
            app.clone(),
            post_json("/search", json!({ "query": "cluster" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(app, post_json("/search", json!({ "query": "cluster" }), Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_search_expands_neighbors() {
        let app = seeded_server(Some("k")).await;
        let (status, body) = call(
            app,
            post_json("/search", json!({ "query": "cluster", "k": 1, "neighbors": 1 }), Some("k")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<i64> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["chunk_id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(body["results"][1]["_additional"]["score"].is_number());
    }

    #[tokio::test]
    async fn test_search_with_huge_neighbor_distance() {
        let app = seeded_server(None).await;
        let (status, body) = call(
            app,
            post_json(
                "/search",
                json!({ "query": "cluster", "k": 1, "neighbors": u64::MAX }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_bm25_and_documents_authless() {
        let app = seeded_server(None).await;
        let (status, body) = call(
            app.clone(),
            post_json("/search/bm25", json!({ "query": "configure" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["results"][0]["text"], json!("configure the cluster"));

        let (status, body) = call(app.clone(), Request::get("/documents").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["documents"][0]["source"], json!("/docs/guide.pdf"));
        assert!(body["documents"][0].get("text").is_none());

        let (status, _) = call(
            app,
            post_json("/search/bm25", json!({ "query": "x", "properties": [] }), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
