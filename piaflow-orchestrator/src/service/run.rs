//! Run Service
//!
//! Run lifecycle controller. A trigger checks its preconditions
//! synchronously, records a pending run and hands execution to one detached
//! task, which moves the run through `running` to a terminal status while
//! streaming the log into the run store.

use async_trait::async_trait;
use piaflow_core::domain::app::App;
use piaflow_core::domain::run::{PipelineResult, Run, RunStatus};
use piaflow_core::dto::run::{ListRunsQuery, RunList, TriggeredRun};
use piaflow_runner::{
    ClusterJobExecutor, LocalExecutor, LogObserver, RunLog, RunOptions, SshKeyFile,
};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::store::{AppSource, CredentialStore, RunStore, StoreError};

/// Who a run is attributed to when the caller does not say
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("app {0} not found")]
    AppNotFound(String),

    #[error("ssh key {0} not found")]
    MissingCredential(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persists every log update of one run
struct PersistLog {
    runs: Arc<dyn RunStore>,
    run_id: Uuid,
}

#[async_trait]
impl LogObserver for PersistLog {
    async fn log_updated(&self, log: &str) {
        if let Err(e) = self.runs.update_run_log(self.run_id, log).await {
            tracing::warn!("Failed to persist log of run {}: {}", self.run_id, e);
        }
    }
}

#[derive(Clone)]
pub struct RunService {
    apps: Arc<dyn AppSource>,
    runs: Arc<dyn RunStore>,
    credentials: Arc<dyn CredentialStore>,
    local: Arc<LocalExecutor>,
    cluster: Arc<ClusterJobExecutor>,
}

impl RunService {
    pub fn new(
        apps: Arc<dyn AppSource>,
        runs: Arc<dyn RunStore>,
        credentials: Arc<dyn CredentialStore>,
        local: LocalExecutor,
        cluster: ClusterJobExecutor,
    ) -> Self {
        Self {
            apps,
            runs,
            credentials,
            local: Arc::new(local),
            cluster: Arc::new(cluster),
        }
    }

    /// Starts a run of an app and returns without waiting for it
    pub async fn trigger(
        &self,
        app_id: &str,
        triggered_by: &str,
    ) -> Result<TriggeredRun, TriggerError> {
        let app = self
            .apps
            .get_app(app_id)
            .await
            .ok_or_else(|| TriggerError::AppNotFound(app_id.to_string()))?;

        let private_key = match app.ssh_key() {
            Some(name) => Some(
                self.credentials
                    .get_private_key(name)
                    .await?
                    .ok_or_else(|| TriggerError::MissingCredential(name.to_string()))?,
            ),
            None => None,
        };

        let triggered_by = match triggered_by.trim() {
            "" => ANONYMOUS,
            who => who,
        };
        let run = self.runs.create_run(&app.id, "", triggered_by).await?;
        tracing::info!(
            "Run {} created for app {} by {}",
            run.id,
            app.id,
            run.triggered_by
        );

        let service = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            service.execute(run_id, app, private_key).await;
        });

        Ok(TriggeredRun {
            run_id: run.id,
            status: run.status,
        })
    }

    async fn execute(&self, run_id: Uuid, app: App, private_key: Option<String>) {
        if let Err(e) = self
            .runs
            .update_run_status(run_id, RunStatus::Running, "", None)
            .await
        {
            tracing::error!("Failed to mark run {} as running: {}", run_id, e);
        }

        let observer: Arc<dyn LogObserver> = Arc::new(PersistLog {
            runs: self.runs.clone(),
            run_id,
        });
        let mut log = RunLog::with_observer(Some(observer));

        let result = if app.uses_cluster_job() {
            self.cluster
                .run(run_id, &app, private_key.as_deref(), &mut log)
                .await
        } else {
            self.run_local(&app, private_key.as_deref(), &mut log).await
        };

        let status = result.status();
        match status {
            RunStatus::Success => tracing::info!("Run {} of app {} succeeded", run_id, app.id),
            _ => tracing::error!("Run {} of app {} failed", run_id, app.id),
        }

        if let Err(e) = self
            .runs
            .update_run_status(run_id, status, &result.log, result.commit_sha.as_deref())
            .await
        {
            tracing::error!("Failed to record result of run {}: {}", run_id, e);

            // The run must still end terminal; fall back to a record that
            // carries nothing the store could reject
            let note = format!("failed to record run result: {}", e);
            if let Err(e) = self
                .runs
                .update_run_status(run_id, RunStatus::Failed, &note, None)
                .await
            {
                tracing::error!("Failed to mark run {} as failed: {}", run_id, e);
            }
        }
    }

    async fn run_local(
        &self,
        app: &App,
        private_key: Option<&str>,
        log: &mut RunLog,
    ) -> PipelineResult {
        // The key file must outlive the executor call; it is removed on drop
        let key_file = match private_key.map(SshKeyFile::write).transpose() {
            Ok(file) => file,
            Err(e) => {
                log.line(format!("ssh key: {}", e)).await;
                return PipelineResult::failed(log.as_str());
            }
        };

        let options = RunOptions {
            git_ssh_command: key_file.as_ref().map(SshKeyFile::git_ssh_command),
            step_env: Vec::new(),
        };
        self.local.run(app, &options, log).await
    }

    /// Get a run by ID
    pub async fn get_run(&self, id: Uuid) -> Result<Run, RunError> {
        self.runs.get_run(id).await?.ok_or(RunError::NotFound(id))
    }

    /// List runs newest first with the unpaged total
    pub async fn list_runs(&self, query: &ListRunsQuery) -> Result<RunList, RunError> {
        let (limit, offset) = query.window();
        let app_id = query.app_filter();

        let runs = self.runs.list_runs(app_id, limit, offset).await?;
        let total = self.runs.count_runs(app_id).await?;

        Ok(RunList { runs, total })
    }
}
