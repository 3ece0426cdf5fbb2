use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use mtbridge_service::{ConnectRequest, HistoryRequest};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Service
        .route("/health", get(health_check))
        .route("/test", get(test_endpoint))
        // Connections
        .route("/connect", post(connect_account))
        .route("/connections", get(list_connections))
        .route("/disconnect/{id}", post(disconnect_account))
        // Account data
        .route("/account/{id}", get(account_info))
        .route("/positions/{id}", get(positions))
        .route("/history/{id}", post(history))
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Decode a JSON body. An empty body decodes as `default` when one is given.
fn parse_body<T: DeserializeOwned>(body: &Bytes, default: Option<T>) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return default.ok_or_else(|| ApiError::validation("request body is required"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::validation(e.to_string()))
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "mtbridge",
        "timestamp": chrono::Utc::now(),
        "initialized": state.service.is_initialized(),
        "terminal": state.service.terminal_name(),
        "started_at": state.started_at,
    }))
}

async fn test_endpoint() -> impl IntoResponse {
    Json(json!({
        "message": "mtbridge API service is running",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

async fn connect_account(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let request: ConnectRequest = parse_body(&body, None)?;
    let outcome = state.service.connect(request).await?;

    Ok(Json(json!({
        "success": true,
        "connection_id": outcome.connection_id,
        "account": outcome.account,
    })))
}

async fn list_connections(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connections = state.service.connections().await;
    Json(json!({
        "success": true,
        "connections": connections,
    }))
}

async fn disconnect_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    state.service.disconnect(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Disconnected successfully",
    })))
}

// ---------------------------------------------------------------------------
// Account data
// ---------------------------------------------------------------------------

async fn account_info(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let account = state.service.account(&id).await?;
    Ok(Json(json!({
        "success": true,
        "account": account,
    })))
}

async fn positions(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let positions = state.service.positions(&id).await?;
    Ok(Json(json!({
        "success": true,
        "positions": positions,
    })))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    state.service.ensure_connection(&id).await?;
    let request: HistoryRequest = parse_body(&body, Some(HistoryRequest::default()))?;
    let page = state.service.history(&id, request).await?;
    Ok(Json(json!({
        "success": true,
        "trades": page.trades,
        "count": page.count,
        "from": page.from,
        "to": page.to,
    })))
}
