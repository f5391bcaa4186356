//! App API Handlers
//!
//! HTTP endpoints for the app registry and for triggering runs.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use piaflow_core::domain::app::App;
use piaflow_core::dto::app::AppSummary;
use piaflow_core::dto::run::TriggeredRun;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::run_service::ANONYMOUS;

/// Header naming who triggered a run
pub const TRIGGERED_BY_HEADER: &str = "x-triggered-by";

/// GET /api/apps
/// List all apps
pub async fn list_apps(State(state): State<AppState>) -> Json<Vec<AppSummary>> {
    tracing::debug!("Listing apps");

    let apps = state.apps.list().await;
    Json(apps.iter().map(AppSummary::from).collect())
}

/// GET /api/apps/{id}
/// Get an app by ID
pub async fn get_app(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<App>> {
    tracing::debug!("Getting app: {}", id);

    let app = state
        .apps
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("app {} not found", id)))?;

    Ok(Json(app))
}

/// POST /api/apps
/// Register a new app
pub async fn create_app(
    State(state): State<AppState>,
    Json(app): Json<App>,
) -> ApiResult<(StatusCode, Json<App>)> {
    tracing::info!("Creating app: {}", app.id);

    let app = state.apps.create(app).await?;
    Ok((StatusCode::CREATED, Json(app)))
}

/// PUT /api/apps/{id}
/// Replace an app definition
pub async fn update_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(app): Json<App>,
) -> ApiResult<Json<App>> {
    tracing::info!("Updating app: {}", id);

    let app = state.apps.update(&id, app).await?;
    Ok(Json(app))
}

/// DELETE /api/apps/{id}
/// Delete an app and its runs
pub async fn delete_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting app: {}", id);

    state.apps.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/apps/{id}/run
/// Trigger a run; it executes in the background
pub async fn trigger_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<TriggeredRun>)> {
    let triggered_by = headers
        .get(TRIGGERED_BY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(ANONYMOUS);

    tracing::info!("Triggering run of app {} for {}", id, triggered_by);

    let triggered = state.runs.trigger(&id, triggered_by).await?;
    Ok((StatusCode::ACCEPTED, Json(triggered)))
}
