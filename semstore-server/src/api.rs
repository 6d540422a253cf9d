//! HTTP routes over a shared [`Store`].
//!
//! Error responses carry `{"error": "...", "kind": "..."}` with the store's
//! error text verbatim. Status codes follow the error kind:
//! - `Input` → 400
//! - `NotFound` → 404
//! - `Configuration` → 422
//! - `Storage` → 500
//! - `TransientIo` → 503

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use semstore_core::{
    Error, ErrorKind, IndexInfo, IndexRequest, NewDocument, QueryBody, QueryHit, QueryRequest,
    Store,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/embed", post(embed))
        .route("/query", post(query_default))
        .route("/collections", get(list_collections))
        .route("/collections/:name", axum::routing::delete(drop_collection))
        .route("/collections/:name/documents", post(write_document))
        .route("/collections/:name/documents/batch", post(write_batch))
        .route("/collections/:name/documents/:id", get(get_document))
        .route("/collections/:name/delete", post(delete_rows))
        .route("/collections/:name/query", post(query_collection))
        .route("/collections/:name/count", get(count_rows))
        .route("/collections/:name/indexes", get(list_indices).post(create_index))
        .route("/collections/:name/flush", post(flush))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { store })
}

/// A store error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Configuration => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::TransientIo => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": format!("{:?}", kind),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct EmbedRequest {
    text: String,
}

#[derive(Serialize)]
struct EmbedResponse {
    dimension: usize,
    vector: Vec<f32>,
}

async fn embed(
    State(state): State<AppState>,
    Json(req): Json<EmbedRequest>,
) -> ApiResult<Json<EmbedResponse>> {
    let vector = state.store.embed(&req.text).await?;
    Ok(Json(EmbedResponse {
        dimension: vector.len(),
        vector,
    }))
}

async fn list_collections(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.store.list_collections().await?))
}

async fn drop_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.drop_collection(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct WriteResponse {
    id: String,
}

async fn write_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(doc): Json<NewDocument>,
) -> ApiResult<(StatusCode, Json<WriteResponse>)> {
    let id = state.store.write(&name, doc).await?;
    Ok((StatusCode::CREATED, Json(WriteResponse { id })))
}

#[derive(Deserialize)]
struct BatchRequest {
    documents: Vec<NewDocument>,
}

#[derive(Serialize)]
struct BatchResponse {
    ids: Vec<String>,
}

async fn write_batch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<(StatusCode, Json<BatchResponse>)> {
    let ids = state.store.write_batch(&name, req.documents).await?;
    Ok((StatusCode::CREATED, Json(BatchResponse { ids })))
}

async fn get_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    Ok(match state.store.get(&name, &id).await? {
        Some(hit) => Json(hit).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("document '{}' not found", id), "kind": "NotFound" })),
        )
            .into_response(),
    })
}

#[derive(Deserialize)]
struct DeleteRequest {
    predicate: String,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: usize,
}

async fn delete_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.store.delete(&name, &req.predicate).await?;
    Ok(Json(DeleteResponse { deleted }))
}

async fn query_default(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> ApiResult<Json<Vec<QueryHit>>> {
    let request = QueryRequest::try_from(body)?;
    Ok(Json(state.store.query(request).await?))
}

async fn query_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<QueryBody>,
) -> ApiResult<Json<Vec<QueryHit>>> {
    let request = QueryRequest::try_from(body)?.in_collection(name);
    Ok(Json(state.store.query(request).await?))
}

#[derive(Deserialize)]
struct CountParams {
    filter: Option<String>,
}

async fn count_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<CountParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state
        .store
        .count_rows(&name, params.filter.as_deref())
        .await?;
    Ok(Json(json!({ "count": count })))
}

async fn create_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<IndexRequest>,
) -> ApiResult<(StatusCode, Json<IndexInfo>)> {
    let info = state.store.create_index(&name, req).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_indices(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<IndexInfo>>> {
    Ok(Json(state.store.list_indices(&name).await?))
}

async fn flush(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    state.store.flush(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
