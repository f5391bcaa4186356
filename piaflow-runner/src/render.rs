//! Step renderer
//!
//! Single dispatch table for what a step does. The local executor asks for
//! an [`Invocation`] it can spawn directly; the cluster executor asks for
//! shell lines to embed in the job script. Both go through the same
//! `match` on [`StepAction`], so the two backends cannot drift apart.

use piaflow_core::domain::app::{App, DeployMode};
use piaflow_core::domain::step::{Step, StepAction};

use crate::error::RenderError;
use crate::shell::{quote_words, shell_quote, split_command};

/// Release name used by helm when the app has no ID
const FALLBACK_RELEASE: &str = "piaflow-release";

/// A program and its arguments, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Renders the invocation as one shell line
    ///
    /// The program is left bare so it resolves through `PATH`; every
    /// argument is quoted.
    pub fn to_shell_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, quote_words(&self.args))
        }
    }
}

/// Builds the app's configured deploy command
pub fn deploy_command(app: &App) -> Result<Invocation, RenderError> {
    let namespace = app.k8s_namespace.trim();

    match app.deploy_mode {
        Some(DeployMode::Kubectl) => {
            let manifest = app.deploy_manifest_path.trim();
            if manifest.is_empty() {
                return Err(RenderError::MissingManifestPath);
            }

            let mut args = Vec::new();
            if !namespace.is_empty() {
                args.extend(["-n".to_string(), namespace.to_string()]);
            }
            args.extend(["apply".to_string(), "-f".to_string(), manifest.to_string()]);
            Ok(Invocation::new("kubectl", args))
        }
        Some(DeployMode::Helm) => {
            let chart = app.helm_chart.trim();
            if chart.is_empty() {
                return Err(RenderError::MissingHelmChart);
            }

            let release = match app.id.trim() {
                "" => FALLBACK_RELEASE,
                id => id,
            };

            let mut args = vec![
                "upgrade".to_string(),
                "--install".to_string(),
                release.to_string(),
                chart.to_string(),
            ];
            if !namespace.is_empty() {
                args.extend(["-n".to_string(), namespace.to_string()]);
            }
            let values = app.helm_values_path.trim();
            if !values.is_empty() {
                args.extend(["-f".to_string(), values.to_string()]);
            }
            Ok(Invocation::new("helm", args))
        }
        None => Err(RenderError::UnsupportedDeployMode(String::new())),
    }
}

/// Renders a step for direct execution in the local checkout
///
/// Returns `None` for a command that splits into no words; such a step
/// has nothing to run and succeeds.
pub fn local_invocation(app: &App, step: &Step) -> Result<Option<Invocation>, RenderError> {
    let invocation = match &step.action {
        StepAction::Cmd(cmd) => {
            let mut parts = split_command(cmd);
            if parts.is_empty() {
                return Ok(None);
            }
            let program = parts.remove(0);
            Invocation::new(program, parts)
        }
        StepAction::File(path) => Invocation::new("sh", vec![path.clone()]),
        StepAction::Script(text) => Invocation::new("sh", vec!["-c".to_string(), text.clone()]),
        StepAction::K8sDeploy => deploy_command(app)?,
    };
    Ok(Some(invocation))
}

/// Renders a step as lines of a POSIX shell script
pub fn script_lines(app: &App, step: &Step) -> Result<Vec<String>, RenderError> {
    let line = match &step.action {
        StepAction::Cmd(cmd) => format!("sh -c {}", shell_quote(cmd)),
        StepAction::File(path) => format!("sh {}", shell_quote(path)),
        StepAction::Script(text) => format!("printf %s {} | sh", shell_quote(text)),
        StepAction::K8sDeploy => deploy_command(app)?.to_shell_line(),
    };
    Ok(vec![line])
}
