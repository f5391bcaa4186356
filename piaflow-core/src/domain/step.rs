//! Step domain types
//!
//! A step is configured loosely (`StepConfig`, four optional execution
//! modes) and normalized once into a `Step` carrying exactly one
//! `StepAction`. Executors only ever see normalized steps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest pause a step may request after it finishes, in seconds
pub const MAX_SLEEP_SEC: i64 = 3600;

/// Step as written in the app configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cmd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub k8s_deploy: bool,
    #[serde(default)]
    pub sleep_sec: i64,
}

/// Execution mode of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Cmd,
    File,
    Script,
    K8sDeploy,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Cmd => "cmd",
            StepKind::File => "file",
            StepKind::Script => "script",
            StepKind::K8sDeploy => "k8s_deploy",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StepConfig {
    /// Classifies the step by counting the execution modes that are set
    ///
    /// Blank strings do not count. Returns `None` unless exactly one mode
    /// is present.
    pub fn kind(&self) -> Option<StepKind> {
        let present = [
            (!self.cmd.trim().is_empty(), StepKind::Cmd),
            (!self.file.trim().is_empty(), StepKind::File),
            (!self.script.trim().is_empty(), StepKind::Script),
            (self.k8s_deploy, StepKind::K8sDeploy),
        ];

        let mut kinds = present.iter().filter(|(set, _)| *set).map(|(_, k)| *k);
        match (kinds.next(), kinds.next()) {
            (Some(kind), None) => Some(kind),
            _ => None,
        }
    }

    /// Normalizes this config into an executable step
    ///
    /// `position` is the 1-based index in the configured list and names
    /// the step when its own name is blank. Returns `None` for steps with
    /// zero or several modes.
    pub fn normalize(&self, position: usize) -> Option<Step> {
        let action = match self.kind()? {
            StepKind::Cmd => StepAction::Cmd(self.cmd.trim().to_string()),
            StepKind::File => StepAction::File(self.file.trim().to_string()),
            StepKind::Script => StepAction::Script(self.script.trim().to_string()),
            StepKind::K8sDeploy => StepAction::K8sDeploy,
        };

        let name = match self.name.trim() {
            "" => format!("step-{}", position),
            name => name.to_string(),
        };

        Some(Step {
            name,
            action,
            sleep_sec: u64::try_from(self.sleep_sec).unwrap_or(0),
        })
    }
}

/// What a normalized step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepAction {
    /// Command line, split on whitespace with quote toggling
    Cmd(String),
    /// Script path inside the checkout, run through `sh`
    File(String),
    /// Inline shell script text
    Script(String),
    /// The app's configured cluster deploy (kubectl apply / helm upgrade)
    K8sDeploy,
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Cmd(_) => StepKind::Cmd,
            StepAction::File(_) => StepKind::File,
            StepAction::Script(_) => StepKind::Script,
            StepAction::K8sDeploy => StepKind::K8sDeploy,
        }
    }
}

/// Normalized pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
    /// Pause after the step completes, in seconds
    pub sleep_sec: u64,
}

impl Step {
    /// Creates a command step
    pub fn cmd(name: impl Into<String>, cmd: impl Into<String>, sleep_sec: u64) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Cmd(cmd.into()),
            sleep_sec,
        }
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cmd: &str, file: &str, script: &str, k8s_deploy: bool) -> StepConfig {
        StepConfig {
            cmd: cmd.to_string(),
            file: file.to_string(),
            script: script.to_string(),
            k8s_deploy,
            ..Default::default()
        }
    }

    #[test]
    fn test_kind_single_mode() {
        assert_eq!(config("echo", "", "", false).kind(), Some(StepKind::Cmd));
        assert_eq!(config("", "run.sh", "", false).kind(), Some(StepKind::File));
        assert_eq!(config("", "", "echo a", false).kind(), Some(StepKind::Script));
        assert_eq!(config("", "", "", true).kind(), Some(StepKind::K8sDeploy));
    }

    #[test]
    fn test_kind_rejects_zero_or_many_modes() {
        assert_eq!(config("", "", "", false).kind(), None);
        assert_eq!(config("   ", "\t", "", false).kind(), None);
        assert_eq!(config("echo a", "scripts/run.sh", "", false).kind(), None);
        assert_eq!(config("echo a", "", "", true).kind(), None);
        assert_eq!(config("a", "b", "c", true).kind(), None);
    }

    #[test]
    fn test_normalize_trims_and_names() {
        let mut cfg = config("  go test ./...  ", "", "", false);
        cfg.sleep_sec = 4;

        let step = cfg.normalize(3).unwrap();
        assert_eq!(step.name, "step-3");
        assert_eq!(step.action, StepAction::Cmd("go test ./...".to_string()));
        assert_eq!(step.sleep_sec, 4);

        cfg.name = "  lint ".to_string();
        assert_eq!(cfg.normalize(3).unwrap().name, "lint");
    }

    #[test]
    fn test_normalize_negative_sleep_is_zero() {
        let mut cfg = config("", "", "", true);
        cfg.sleep_sec = -5;
        let step = cfg.normalize(1).unwrap();
        assert_eq!(step.sleep_sec, 0);
        assert_eq!(step.kind(), StepKind::K8sDeploy);
    }

    #[test]
    fn test_step_config_deserialize_defaults() {
        let cfg: StepConfig = serde_json::from_str(r#"{"name":"deploy","k8s_deploy":true}"#).unwrap();
        assert_eq!(cfg.kind(), Some(StepKind::K8sDeploy));
        assert_eq!(cfg.sleep_sec, 0);
        assert!(cfg.cmd.is_empty());
    }
}
