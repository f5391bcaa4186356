//! Error types for the runner
//!
//! These never escape an executor: they are rendered into the run log and
//! fold into a failed `PipelineResult`.

use std::process::ExitStatus;
use thiserror::Error;

/// A step could not be turned into something executable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("deploy_manifest_path is required for deploy_mode=kubectl")]
    MissingManifestPath,

    #[error("helm_chart is required for deploy_mode=helm")]
    MissingHelmChart,

    #[error("unsupported deploy_mode for k8s_deploy step: {0:?}")]
    UnsupportedDeployMode(String),
}

/// A subprocess did not complete successfully
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{status}")]
    Exit { status: ExitStatus },

    #[error("{status}: {stderr}")]
    ExitWithStderr { status: ExitStatus, stderr: String },
}

impl CommandError {
    /// Builds an exit error, keeping stderr only when it says something
    pub fn exit(status: ExitStatus, stderr: &str) -> Self {
        let stderr = stderr.trim();
        if stderr.is_empty() {
            CommandError::Exit { status }
        } else {
            CommandError::ExitWithStderr {
                status,
                stderr: stderr.to_string(),
            }
        }
    }
}

/// The local checkout could not be prepared
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to create work dir: {0}")]
    WorkDir(#[source] std::io::Error),

    #[error("git clone: {0}")]
    Clone(#[source] CommandError),

    #[error("git pull: {0}")]
    Pull(#[source] CommandError),
}

/// A pipeline step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// A cluster job could not be prepared or driven
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{0} is required for k8s jobs")]
    MissingSetting(&'static str),

    #[error("no steps to run")]
    NoSteps,

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("kubectl {args}: {source}")]
    Kubectl {
        args: String,
        #[source]
        source: CommandError,
    },

    #[error("pod not ready")]
    PodNotReady,

    #[error("failed to parse kubectl output: {0}")]
    Parse(#[from] serde_json::Error),
}
