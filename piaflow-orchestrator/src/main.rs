use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use piaflow_runner::{ClusterJobExecutor, LocalExecutor};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod store;

use config::Config;
use service::app_service::AppRegistry;
use service::run_service::RunService;
use store::{
    CredentialStore, InMemoryCredentialStore, InMemoryRunStore, PgCredentialStore, PgRunStore,
    RunStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "piaflow_orchestrator=info,piaflow_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    let runner_config = config.runner_config().context("Invalid runner configuration")?;

    tracing::info!("Starting PiaFlow Orchestrator...");
    tracing::info!("Work dir: {}", runner_config.work_dir.display());

    let (runs, credentials): (Arc<dyn RunStore>, Arc<dyn CredentialStore>) =
        match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to database...");

                let pool = db::create_pool(url)
                    .await
                    .context("Failed to create database pool")?;

                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;

                (
                    Arc::new(PgRunStore::new(pool.clone())),
                    Arc::new(PgCredentialStore::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set; runs and keys are kept in memory");
                (
                    Arc::new(InMemoryRunStore::new()),
                    Arc::new(InMemoryCredentialStore::new()),
                )
            }
        };

    let apps = match &config.apps_file {
        Some(path) => AppRegistry::load(path, runs.clone())
            .await
            .with_context(|| format!("Failed to load apps from {}", path.display()))?,
        None => AppRegistry::new(runs.clone()),
    };
    let apps = Arc::new(apps);
    tracing::info!("Loaded {} apps", apps.list().await.len());

    let run_service = RunService::new(
        apps.clone(),
        runs,
        credentials.clone(),
        LocalExecutor::new(runner_config.clone()),
        ClusterJobExecutor::from_config(&runner_config),
    );

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        apps,
        runs: run_service,
        credentials,
    });

    tracing::info!("Listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
