//! App domain types
//!
//! An app is one pipeline target: a repository, a branch and the steps to
//! run against it, plus optional cluster deploy settings.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::domain::step::{Step, StepConfig, StepKind};

/// Branch used when an app does not name one
pub const DEFAULT_BRANCH: &str = "main";

/// How a `k8s_deploy` step deploys the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// `kubectl apply -f <deploy_manifest_path>`
    Kubectl,
    /// `helm upgrade --install <app id> <helm_chart>`
    Helm,
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployMode::Kubectl => f.write_str("kubectl"),
            DeployMode::Helm => f.write_str("helm"),
        }
    }
}

/// Application definition
///
/// Owned by the configuration store. The pipeline core only ever receives a
/// cloned snapshot per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key_name: String,

    #[serde(
        default,
        deserialize_with = "deserialize_deploy_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub deploy_mode: Option<DeployMode>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub k8s_namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub k8s_service_account: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub k8s_runner_image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_manifest_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub helm_chart: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub helm_values_path: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepConfig>,

    // Legacy three-step configuration, used only when `steps` is empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test_cmd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_cmd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_cmd: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub test_sleep_sec: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub build_sleep_sec: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub deploy_sleep_sec: i64,
}

impl App {
    /// Returns the ordered steps this app actually executes
    ///
    /// An explicit step list wins; entries without exactly one execution
    /// mode are dropped. Without one, the legacy `test`/`build`/`deploy`
    /// commands become up to three `cmd` steps.
    pub fn effective_steps(&self) -> Vec<Step> {
        if !self.steps.is_empty() {
            return self
                .steps
                .iter()
                .enumerate()
                .filter_map(|(idx, cfg)| cfg.normalize(idx + 1))
                .collect();
        }

        [
            ("test", &self.test_cmd, self.test_sleep_sec),
            ("build", &self.build_cmd, self.build_sleep_sec),
            ("deploy", &self.deploy_cmd, self.deploy_sleep_sec),
        ]
        .into_iter()
        .filter(|(_, cmd, _)| !cmd.trim().is_empty())
        .map(|(name, cmd, sleep)| Step::cmd(name, cmd.trim(), u64::try_from(sleep).unwrap_or(0)))
        .collect()
    }

    /// Whether the whole pipeline must run as a cluster job
    ///
    /// True as soon as one effective step is a `k8s_deploy`.
    pub fn uses_cluster_job(&self) -> bool {
        self.effective_steps()
            .iter()
            .any(|step| step.kind() == StepKind::K8sDeploy)
    }

    /// Branch to sync, falling back to [`DEFAULT_BRANCH`]
    pub fn branch_or_default(&self) -> &str {
        match self.branch.trim() {
            "" => DEFAULT_BRANCH,
            branch => branch,
        }
    }

    /// Returns a copy with defaults filled in, as stored by the registry
    pub fn normalized(mut self) -> Self {
        self.id = self.id.trim().to_string();
        self.branch = self.branch_or_default().to_string();
        self
    }

    /// Named SSH credential, if one is configured
    pub fn ssh_key(&self) -> Option<&str> {
        match self.ssh_key_name.trim() {
            "" => None,
            name => Some(name),
        }
    }
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Accepts a missing or blank `deploy_mode` as unset
fn deserialize_deploy_mode<'de, D>(deserializer: D) -> Result<Option<DeployMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) if s == "kubectl" => Ok(Some(DeployMode::Kubectl)),
        Some(s) if s == "helm" => Ok(Some(DeployMode::Helm)),
        Some(other) => Err(serde::de::Error::unknown_variant(&other, &["kubectl", "helm"])),
    }
}
