use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info};

use cookoo_core::db::Database;
use cookoo_core::models::Document;
use cookoo_core::remote::{merge_fields, resolve_server_values};

const BODY_LIMIT: usize = 50 * 1024 * 1024; // 50 MB, inline images
const POLL_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Clone)]
struct AppState {
    db: Database,
    /// Bumped on every write to any collection.
    version: Arc<watch::Sender<u64>>,
    poll_timeout: Duration,
}

impl AppState {
    fn new(db: Database, poll_timeout: Duration) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            db,
            version: Arc::new(version),
            poll_timeout,
        }
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn snapshot(&self, collection: &str) -> Result<SnapshotResponse, ApiError> {
        let version = *self.version.borrow();
        let documents = self
            .db
            .list_documents(collection)
            .context("failed to list documents")?;
        Ok(SnapshotResponse { version, documents })
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CollectionPath {
    project: String,
    collection: String,
}

impl CollectionPath {
    fn key(&self) -> String {
        format!("{}/{}", self.project, self.collection)
    }
}

#[derive(Deserialize)]
struct DocumentPath {
    project: String,
    collection: String,
    id: String,
}

impl DocumentPath {
    fn key(&self) -> String {
        format!("{}/{}", self.project, self.collection)
    }
}

#[derive(Deserialize)]
struct WatchQuery {
    after: Option<u64>,
}

#[derive(Serialize)]
struct SnapshotResponse {
    version: u64,
    documents: Vec<Document>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    response
}

// --- Handlers ---

async fn list_documents(
    State(state): State<AppState>,
    Path(path): Path<CollectionPath>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    Ok(Json(state.snapshot(&path.key())?))
}

async fn create_document(
    State(state): State<AppState>,
    Path(path): Path<CollectionPath>,
    Json(mut fields): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    resolve_server_values(&mut fields, &now());
    let doc = Document {
        id: uuid::Uuid::new_v4().simple().to_string(),
        fields,
    };
    state
        .db
        .insert_document(&path.key(), &doc)
        .context("failed to insert document")?;
    state.bump();
    debug!(collection = %path.key(), id = %doc.id, "document created");
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn get_document(
    State(state): State<AppState>,
    Path(path): Path<DocumentPath>,
) -> Result<Json<Document>, ApiError> {
    let doc = state
        .db
        .get_document(&path.key(), &path.id)
        .context("failed to load document")?;
    doc.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Document '{}' not found", path.id)))
}

async fn update_document(
    State(state): State<AppState>,
    Path(path): Path<DocumentPath>,
    Json(mut patch): Json<Map<String, Value>>,
) -> Result<Json<Document>, ApiError> {
    resolve_server_values(&mut patch, &now());
    let collection = path.key();
    let doc = state
        .db
        .update_document(&collection, &path.id, |fields| merge_fields(fields, patch))
        .context("failed to update document")?
        .ok_or_else(|| ApiError::NotFound(format!("Document '{}' not found", path.id)))?;
    state.bump();
    debug!(%collection, id = %doc.id, "document updated");
    Ok(Json(doc))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(path): Path<DocumentPath>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .db
        .delete_document(&path.key(), &path.id)
        .context("failed to delete document")?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "Document '{}' not found",
            path.id
        )));
    }
    state.bump();
    debug!(collection = %path.key(), id = %path.id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Long-poll: answer as soon as the store version passes `after`, or with
/// the current snapshot once the poll timeout expires.
async fn watch_documents(
    State(state): State<AppState>,
    Path(path): Path<CollectionPath>,
    Query(query): Query<WatchQuery>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    if let Some(after) = query.after {
        let mut rx = state.version.subscribe();
        let deadline = tokio::time::Instant::now() + state.poll_timeout;
        loop {
            let current = *rx.borrow_and_update();
            if current > after {
                break;
            }
            let changed = tokio::time::timeout_at(deadline, rx.changed()).await;
            if !matches!(changed, Ok(Ok(()))) {
                break;
            }
        }
    }
    Ok(Json(state.snapshot(&path.key())?))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/projects/{project}/collections/{collection}/documents",
            get(list_documents).post(create_document),
        )
        .route(
            "/api/projects/{project}/collections/{collection}/documents/{id}",
            get(get_document)
                .patch(update_document)
                .delete(delete_document),
        )
        .route(
            "/api/projects/{project}/collections/{collection}/watch",
            get(watch_documents),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub(crate) fn router(db: Database, poll_timeout: Duration) -> Router {
    build_router(AppState::new(db, poll_timeout))
}

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let app = router(db, POLL_TIMEOUT);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can read and write your recipes."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(%bind, port, "document store listening");
    eprintln!("Listening on http://{bind}:{port}");
    eprintln!("Point clients at it with: --remote http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    const DOCS: &str = "/api/projects/demo/collections/recipes/documents";

    fn test_state(poll_timeout: Duration) -> AppState {
        AppState::new(Database::open_in_memory().unwrap(), poll_timeout)
    }

    fn test_app() -> Router {
        build_router(test_state(Duration::from_secs(5)))
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn create(app: &Router, name: &str) -> String {
        let response = app
            .clone()
            .oneshot(post_json(
                DOCS,
                &json!({ "name": name, "updatedAt": { ".sv": "timestamp" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_then_list_resolves_timestamp() {
        let app = test_app();
        let id = create(&app, "Tomato Egg Stir-fry").await;

        let response = app.oneshot(get(DOCS)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], 1);
        let docs = json["documents"].as_array().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], id.as_str());
        assert_eq!(docs[0]["fields"]["name"], "Tomato Egg Stir-fry");
        assert!(docs[0]["fields"]["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let app = test_app();
        create(&app, "Congee").await;

        let response = app
            .oneshot(get("/api/projects/other/collections/recipes/documents"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json["documents"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn patch_merges_fields() {
        let app = test_app();
        let id = create(&app, "Congee").await;

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::patch(format!("{DOCS}/{id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "isFavorite": true }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(app.oneshot(get(&format!("{DOCS}/{id}"))).await.unwrap()).await;
        assert_eq!(json["fields"]["name"], "Congee");
        assert_eq!(json["fields"]["isFavorite"], true);
    }

    fn patch_json(id: &str, body: &Value) -> axum::http::Request<Body> {
        axum::http::Request::patch(format!("{DOCS}/{id}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_patches_keep_every_field() {
        let app = test_app();
        let id = create(&app, "Congee").await;

        let patches = (0..16).map(|i| {
            let app = app.clone();
            let body = json!({ format!("field{i}"): i });
            let id = id.clone();
            tokio::spawn(async move { app.oneshot(patch_json(&id, &body)).await.unwrap().status() })
        });
        for handle in patches.collect::<Vec<_>>() {
            assert_eq!(handle.await.unwrap(), StatusCode::OK);
        }

        let json = body_json(app.oneshot(get(&format!("{DOCS}/{id}"))).await.unwrap()).await;
        let fields = json["fields"].as_object().unwrap();
        for i in 0..16 {
            assert_eq!(fields[&format!("field{i}")], i);
        }
        assert_eq!(fields["name"], "Congee");
    }

    #[tokio::test]
    async fn patch_missing_returns_404() {
        let app = test_app();
        let response = app
            .oneshot(
                axum::http::Request::patch(format!("{DOCS}/nope"))
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Document 'nope' not found");
    }

    #[tokio::test]
    async fn delete_then_delete_again() {
        let app = test_app();
        let id = create(&app, "Congee").await;

        let delete = || {
            axum::http::Request::delete(format!("{DOCS}/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn watch_returns_after_change() {
        let app = test_app();
        let watcher = tokio::spawn(
            app.clone()
                .oneshot(get("/api/projects/demo/collections/recipes/watch?after=0")),
        );
        create(&app, "Dumplings").await;

        let response = watcher.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], 1);
        assert_eq!(json["documents"][0]["fields"]["name"], "Dumplings");
    }

    #[tokio::test]
    async fn watch_times_out_with_current_snapshot() {
        let app = build_router(test_state(Duration::from_millis(20)));
        let response = app
            .oneshot(get("/api/projects/demo/collections/recipes/watch?after=5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], 0);
        assert!(json["documents"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_object_body_is_rejected() {
        let app = test_app();
        let response = app.oneshot(post_json(DOCS, &json!([1, 2]))).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn security_headers_present() {
        let response = test_app().oneshot(get(DOCS)).await.unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app();

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post(DOCS)
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/.cookoo/db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }
}
