//! Cluster command surface
//!
//! The executor only talks to the cluster through [`ClusterCli`]. The
//! production implementation shells out to `kubectl`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use crate::error::ClusterError;
use crate::process::run_captured;

/// Observed state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    Succeeded,
    Failed,
}

#[derive(Debug, Default, Deserialize)]
struct JobObject {
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatus {
    #[serde(default)]
    succeeded: Option<i64>,
    #[serde(default)]
    failed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    metadata: PodMetadata,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

impl JobState {
    /// Reads the state from `kubectl get job -o json` output
    ///
    /// Any positive `succeeded` or `failed` count is terminal.
    pub fn from_job_json(json: &[u8]) -> Result<Self, serde_json::Error> {
        let job: JobObject = serde_json::from_slice(json)?;
        let state = if job.status.succeeded.unwrap_or(0) > 0 {
            JobState::Succeeded
        } else if job.status.failed.unwrap_or(0) > 0 {
            JobState::Failed
        } else {
            JobState::Active
        };
        Ok(state)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Active)
    }
}

/// Operations the cluster job executor needs
#[async_trait]
pub trait ClusterCli: Send + Sync {
    /// Creates or updates an object from a manifest
    async fn apply(&self, namespace: &str, manifest: &Value) -> Result<(), ClusterError>;

    /// Deletes an object, succeeding when it is already gone
    async fn delete(&self, namespace: &str, kind: &str, name: &str) -> Result<(), ClusterError>;

    async fn job_state(&self, namespace: &str, job: &str) -> Result<JobState, ClusterError>;

    /// Full log of the job's pod so far
    async fn job_logs(&self, namespace: &str, job: &str) -> Result<String, ClusterError>;
}

/// [`ClusterCli`] backed by the `kubectl` binary
#[derive(Debug, Clone)]
pub struct Kubectl {
    bin: String,
}

impl Kubectl {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn exec(
        &self,
        namespace: &str,
        args: &[&str],
        stdin: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ClusterError> {
        let mut command = Command::new(&self.bin);
        command.args(["-n", namespace]).args(args);

        run_captured(command, stdin)
            .await
            .map(|output| output.stdout)
            .map_err(|source| ClusterError::Kubectl {
                args: args.join(" "),
                source,
            })
    }
}

#[async_trait]
impl ClusterCli for Kubectl {
    async fn apply(&self, namespace: &str, manifest: &Value) -> Result<(), ClusterError> {
        let body = serde_json::to_vec(manifest)?;
        self.exec(namespace, &["apply", "-f", "-"], Some(body)).await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, kind: &str, name: &str) -> Result<(), ClusterError> {
        self.exec(namespace, &["delete", kind, name, "--ignore-not-found=true"], None)
            .await?;
        Ok(())
    }

    async fn job_state(&self, namespace: &str, job: &str) -> Result<JobState, ClusterError> {
        let stdout = self.exec(namespace, &["get", "job", job, "-o", "json"], None).await?;
        Ok(JobState::from_job_json(&stdout)?)
    }

    async fn job_logs(&self, namespace: &str, job: &str) -> Result<String, ClusterError> {
        let selector = format!("job-name={}", job);
        let stdout = self
            .exec(namespace, &["get", "pods", "-l", selector.as_str(), "-o", "json"], None)
            .await?;
        let pods: PodList = serde_json::from_slice(&stdout)?;
        let pod = pods.items.into_iter().next().ok_or(ClusterError::PodNotReady)?;

        let logs = self
            .exec(namespace, &["logs", pod.metadata.name.as_str(), "--tail=-1"], None)
            .await?;
        Ok(String::from_utf8_lossy(&logs).into_owned())
    }
}
