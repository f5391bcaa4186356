//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific resource.

pub mod app;
pub mod credential;
pub mod error;
pub mod run;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::service::app_service::AppRegistry;
use crate::service::run_service::RunService;
use crate::store::CredentialStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub apps: Arc<AppRegistry>,
    pub runs: RunService,
    pub credentials: Arc<dyn CredentialStore>,
}

/// GET /health
async fn health_check() -> &'static str {
    "OK"
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // App endpoints
        .route("/api/apps", get(app::list_apps).post(app::create_app))
        .route(
            "/api/apps/{id}",
            get(app::get_app).put(app::update_app).delete(app::delete_app),
        )
        .route("/api/apps/{id}/run", post(app::trigger_run))
        // Run endpoints
        .route("/api/runs", get(run::list_runs))
        .route("/api/runs/{id}", get(run::get_run))
        // Credential endpoints
        .route("/api/ssh-keys/{name}", put(credential::put_ssh_key))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
