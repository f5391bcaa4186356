//! Cluster job executor
//!
//! Runs the whole pipeline as one Kubernetes batch job: the steps are
//! rendered into a shell script, the job runs it once, and the pod log is
//! polled into the run log until the job finishes or the deadline passes.

mod kubectl;
pub mod manifest;

pub use kubectl::{ClusterCli, JobState, Kubectl};

use std::sync::Arc;
use std::time::Duration;

use piaflow_core::domain::app::App;
use piaflow_core::domain::run::PipelineResult;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::error::ClusterError;
use crate::log::{self, RunLog};

/// Appended to the log when the deadline passes
pub const JOB_TIMED_OUT: &str = "k8s job timed out";

/// Objects to create for one run
struct JobPlan {
    namespace: String,
    job_name: String,
    job: Value,
    secret: Option<(String, Value)>,
}

impl JobPlan {
    fn prepare(
        run_id: Uuid,
        app: &App,
        private_key: Option<&str>,
        ttl: Duration,
    ) -> Result<Self, ClusterError> {
        manifest::check_settings(app)?;

        let private_key = private_key.filter(|key| !key.trim().is_empty());
        let namespace = app.k8s_namespace.trim().to_string();
        let job_name = manifest::job_name(run_id);
        let script = manifest::job_script(app, &app.effective_steps(), private_key.is_some())?;

        let secret = private_key.map(|key| {
            let name = manifest::secret_name(&job_name);
            let secret = manifest::secret_manifest(&namespace, &name, key);
            (name, secret)
        });
        let job = manifest::job_manifest(
            app,
            &job_name,
            &script,
            secret.as_ref().map(|(name, _)| name.as_str()),
            ttl,
        );

        Ok(Self {
            namespace,
            job_name,
            job,
            secret,
        })
    }
}

/// Runs pipelines as cluster jobs
pub struct ClusterJobExecutor {
    cli: Arc<dyn ClusterCli>,
    poll_interval: Duration,
    timeout: Duration,
    ttl: Duration,
}

impl ClusterJobExecutor {
    pub fn new(cli: Arc<dyn ClusterCli>, config: &RunnerConfig) -> Self {
        Self {
            cli,
            poll_interval: config.poll_interval,
            timeout: config.job_timeout,
            ttl: config.job_ttl_after_finished,
        }
    }

    /// Executor driving the configured `kubectl` binary
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(Arc::new(Kubectl::new(config.kubectl_bin.clone())), config)
    }

    /// Executes the app's pipeline as a job named after `run_id`
    ///
    /// Never fails: preconditions, cluster errors and the deadline all end
    /// in a failed result. The credential secret is removed on every path
    /// once it may exist; the job itself is left to the cluster's TTL.
    pub async fn run(
        &self,
        run_id: Uuid,
        app: &App,
        private_key: Option<&str>,
        log: &mut RunLog,
    ) -> PipelineResult {
        let plan = match JobPlan::prepare(run_id, app, private_key, self.ttl) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(app_id = %app.id, "cannot start k8s job: {}", e);
                log.line(format!("k8s job: {}", e)).await;
                return PipelineResult::failed(log.as_str());
            }
        };

        let succeeded = self.execute(&plan, log).await;

        if let Some((secret, _)) = &plan.secret {
            if let Err(e) = self.cli.delete(&plan.namespace, "secret", secret).await {
                warn!(secret = %secret, "failed to delete ssh secret: {}", e);
            }
        }

        let commit = log::find_commit(log.as_str());
        if succeeded {
            info!(job = %plan.job_name, "k8s job succeeded");
            PipelineResult::success(log.as_str()).with_commit(commit)
        } else {
            info!(job = %plan.job_name, "k8s job failed");
            PipelineResult::failed(log.as_str()).with_commit(commit)
        }
    }

    async fn execute(&self, plan: &JobPlan, log: &mut RunLog) -> bool {
        if let Some((name, secret)) = &plan.secret {
            if let Err(e) = self.cli.apply(&plan.namespace, secret).await {
                warn!(secret = %name, "failed to create ssh secret: {}", e);
                log.line(format!("create ssh secret: {}", e)).await;
                return false;
            }
        }

        if let Err(e) = self.cli.apply(&plan.namespace, &plan.job).await {
            warn!(job = %plan.job_name, "failed to create k8s job: {}", e);
            log.line(format!("create k8s job: {}", e)).await;
            return false;
        }
        info!(job = %plan.job_name, namespace = %plan.namespace, "k8s job created");

        let deadline = Instant::now() + self.timeout;
        loop {
            self.sync_logs(plan, log).await;

            match self.cli.job_state(&plan.namespace, &plan.job_name).await {
                Ok(state) if state.is_terminal() => {
                    // The pod may have written more since the last fetch
                    self.sync_logs(plan, log).await;
                    return state == JobState::Succeeded;
                }
                Ok(_) => {}
                Err(e) => debug!(job = %plan.job_name, "job status unavailable: {}", e),
            }

            if Instant::now() >= deadline {
                warn!(job = %plan.job_name, "k8s job timed out");
                log.block(JOB_TIMED_OUT).await;
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn sync_logs(&self, plan: &JobPlan, log: &mut RunLog) {
        match self.cli.job_logs(&plan.namespace, &plan.job_name).await {
            Ok(text) => {
                log.sync_snapshot(&text).await;
            }
            Err(e) => debug!(job = %plan.job_name, "job logs unavailable: {}", e),
        }
    }
}
