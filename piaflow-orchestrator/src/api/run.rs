//! Run API Handlers
//!
//! Read-only endpoints clients poll while a run executes.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use piaflow_core::domain::run::Run;
use piaflow_core::dto::run::{ListRunsQuery, RunList};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /api/runs
/// List runs newest first
///
/// Query parameters:
/// - `app_id` (optional): only runs of this app
/// - `limit` (optional, default 15)
/// - `offset` (optional), or `page` (1-based, wins over `offset`)
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<RunList>> {
    tracing::debug!("Listing runs: {:?}", query);

    let list = state.runs.list_runs(&query).await?;
    Ok(Json(list))
}

/// GET /api/runs/{id}
/// Get a run with its log so far
pub async fn get_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    let run = state.runs.get_run(id).await?;
    Ok(Json(run))
}
