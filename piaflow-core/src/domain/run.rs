//! Run domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Pipeline run record
///
/// Created once per trigger and mutated in place (status, log, end
/// timestamp) while the run executes. Clients poll it by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub app_id: String,
    pub triggered_by: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_sha: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Run status
///
/// `Pending -> Running -> {Success, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    /// Terminal statuses stamp the run's end time
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Success)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Outcome of one pipeline execution, returned by an executor
///
/// Not persisted directly: it folds into the run's terminal fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub success: bool,
    pub log: String,
    /// HEAD of the synced checkout, when it could be resolved
    pub commit_sha: Option<String>,
}

impl PipelineResult {
    pub fn success(log: impl Into<String>) -> Self {
        Self {
            success: true,
            log: log.into(),
            commit_sha: None,
        }
    }

    pub fn failed(log: impl Into<String>) -> Self {
        Self {
            success: false,
            log: log.into(),
            commit_sha: None,
        }
    }

    pub fn with_commit(mut self, commit_sha: Option<String>) -> Self {
        self.commit_sha = commit_sha;
        self
    }

    /// Terminal run status for this result
    pub fn status(&self) -> RunStatus {
        if self.success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}
