use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    engine::PortScanEngine,
    error::ScanError,
    store::NewInstance,
    types::ScanRequest,
};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<PortScanEngine>,
}

/// Error body returned by every handler: `{ "message": ... }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        let status = match &err {
            ScanError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            ScanError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rej: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request body: {}", rej.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rej: PathRejection) -> Self {
        Self::bad_request(format!("invalid id: {}", rej.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

/// Build the API router. Routes live under `/api`.
pub fn router(engine: Arc<PortScanEngine>) -> Router {
    let state = AppState { engine };

    let api = Router::new()
        .route("/port-scan", post(post_scan))
        .route("/port-scan/history", get(get_history))
        .route(
            "/memory-container-instances",
            post(create_instance).get(list_instances),
        )
        .route(
            "/memory-container-instances/{id}",
            get(get_instance).delete(delete_instance),
        )
        .route("/memory-container-instances/{id}/scan", post(scan_instance))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, engine: Arc<PortScanEngine>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("serving port-scan API on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Cancellation token that fires when the handler future is dropped, which
/// is what happens when the client goes away mid-scan.
fn request_scoped_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

async fn post_scan(
    State(app): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let (cancel, _guard) = request_scoped_token();
    let report = app.engine.scan_with_cancel(&req, cancel).await?;
    Ok((StatusCode::OK, Json(report)))
}

async fn get_history(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.engine.history()))
}

async fn create_instance(
    State(app): State<AppState>,
    payload: Result<Json<NewInstance>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(new) = payload?;
    if new.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let instance = app.engine.store().insert(new).await;
    info!(id = instance.id, name = %instance.name, "registered container instance");
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn list_instances(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.engine.store().list().await))
}

async fn get_instance(
    State(app): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let instance = app
        .engine
        .store()
        .get(id)
        .await
        .ok_or(ScanError::InstanceNotFound(id))?;
    Ok((StatusCode::OK, Json(instance)))
}

async fn delete_instance(
    State(app): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    app.engine
        .store()
        .remove(id)
        .await
        .ok_or(ScanError::InstanceNotFound(id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn scan_instance(
    State(app): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let (cancel, _guard) = request_scoped_token();
    let report = app.engine.scan_instance(id, cancel).await?;
    Ok((StatusCode::OK, Json(report)))
}
