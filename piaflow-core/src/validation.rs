//! App validation
//!
//! Runs when an app is created or updated. Anything rejected here can
//! never reach an executor, so run-time code trusts the step shape.

use thiserror::Error;

use crate::domain::app::{App, DeployMode};
use crate::domain::step::{MAX_SLEEP_SEC, StepKind};

/// Reasons an app definition is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("id {0:?} must not contain path separators or start with a dot")]
    InvalidId(String),

    #[error("step {position} ({name}) must set exactly one of cmd, file, script or k8s_deploy")]
    InvalidStepMode { position: usize, name: String },

    #[error("{field} must be between 0 and {max}", max = MAX_SLEEP_SEC)]
    SleepOutOfRange { field: String },

    #[error("app defines no runnable steps")]
    NoSteps,

    #[error("deploy_mode is required for k8s_deploy steps")]
    MissingDeployMode,

    #[error("deploy_manifest_path is required for deploy_mode=kubectl")]
    MissingManifestPath,

    #[error("helm_chart is required for deploy_mode=helm")]
    MissingHelmChart,
}

/// Checks an app definition before it is stored
pub fn validate_app(app: &App) -> Result<(), ValidationError> {
    if app.id.trim().is_empty() {
        return Err(ValidationError::MissingField("id"));
    }
    check_id(app.id.trim())?;
    if app.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if app.repo.trim().is_empty() {
        return Err(ValidationError::MissingField("repo"));
    }

    let mut has_k8s_deploy = false;
    for (idx, step) in app.steps.iter().enumerate() {
        let kind = step.kind().ok_or_else(|| ValidationError::InvalidStepMode {
            position: idx + 1,
            name: step.name.trim().to_string(),
        })?;
        check_sleep(&format!("steps[{}].sleep_sec", idx), step.sleep_sec)?;
        has_k8s_deploy |= kind == StepKind::K8sDeploy;
    }

    check_sleep("test_sleep_sec", app.test_sleep_sec)?;
    check_sleep("build_sleep_sec", app.build_sleep_sec)?;
    check_sleep("deploy_sleep_sec", app.deploy_sleep_sec)?;

    if app.effective_steps().is_empty() {
        return Err(ValidationError::NoSteps);
    }

    if has_k8s_deploy {
        validate_cluster_settings(app)?;
    }

    Ok(())
}

fn validate_cluster_settings(app: &App) -> Result<(), ValidationError> {
    match app.deploy_mode {
        None => return Err(ValidationError::MissingDeployMode),
        Some(DeployMode::Kubectl) if app.deploy_manifest_path.trim().is_empty() => {
            return Err(ValidationError::MissingManifestPath);
        }
        Some(DeployMode::Helm) if app.helm_chart.trim().is_empty() => {
            return Err(ValidationError::MissingHelmChart);
        }
        Some(_) => {}
    }

    if app.k8s_namespace.trim().is_empty() {
        return Err(ValidationError::MissingField("k8s_namespace"));
    }
    if app.k8s_service_account.trim().is_empty() {
        return Err(ValidationError::MissingField("k8s_service_account"));
    }
    if app.k8s_runner_image.trim().is_empty() {
        return Err(ValidationError::MissingField("k8s_runner_image"));
    }

    Ok(())
}

/// The id names the app's checkout directory under the work dir
fn check_id(id: &str) -> Result<(), ValidationError> {
    if id.starts_with('.') || id.contains(['/', '\\']) || id.contains("..") {
        return Err(ValidationError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn check_sleep(field: &str, value: i64) -> Result<(), ValidationError> {
    if !(0..=MAX_SLEEP_SEC).contains(&value) {
        return Err(ValidationError::SleepOutOfRange {
            field: field.to_string(),
        });
    }
    Ok(())
}
