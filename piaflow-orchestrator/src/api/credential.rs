//! Credential API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct PutSshKeyRequest {
    pub private_key: String,
}

/// PUT /api/ssh-keys/{name}
/// Store or replace a named private key; the key is never returned
pub async fn put_ssh_key(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<PutSshKeyRequest>,
) -> ApiResult<StatusCode> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("key name is required".to_string()));
    }
    if req.private_key.trim().is_empty() {
        return Err(ApiError::BadRequest("private_key is required".to_string()));
    }

    tracing::info!("Storing ssh key: {}", name);

    state
        .credentials
        .put_private_key(name, &req.private_key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
