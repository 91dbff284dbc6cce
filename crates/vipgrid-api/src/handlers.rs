//! REST API handlers.
//!
//! Each handler reads/writes via `NodeStore` and answers with the
//! `{ success, data, error }` envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ApiState;

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Register request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    #[serde(default = "default_attachment")]
    pub attachment: String,
}

fn default_attachment() -> String {
    "nic0".to_string()
}

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_nodes() {
        Ok(nodes) => ApiResponse::ok(nodes).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/nodes/:id
pub async fn get_node(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.get_node(&id) {
        Ok(Some(node)) => ApiResponse::ok(node).into_response(),
        Ok(None) => error_response("node not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/nodes
pub async fn register_node(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if req.id.trim().is_empty() {
        return error_response("node id must not be empty", StatusCode::BAD_REQUEST).into_response();
    }
    match state.store.register_node(&req.id, &req.attachment) {
        Ok(node) => {
            info!(node = %node.id, "node joined the group");
            (StatusCode::CREATED, ApiResponse::ok(node)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/nodes/:id
pub async fn remove_node(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.delete_node(&id) {
        Ok(true) => {
            info!(node = %id, "node left the group");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("node not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
