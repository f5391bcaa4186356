//! Cluster object rendering
//!
//! Manifests are built as JSON values, which `kubectl apply -f -` accepts
//! as readily as YAML.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use piaflow_core::domain::app::App;
use piaflow_core::domain::step::Step;
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

use crate::error::ClusterError;
use crate::log;
use crate::render::script_lines;
use crate::shell::shell_quote;

/// Where the credential secret is mounted inside the job pod
pub const SSH_MOUNT_PATH: &str = "/var/run/piaflow-ssh";

/// Key of the private key inside the secret
pub const SSH_KEY_FILE: &str = "id_key";

const WORKSPACE: &str = "/workspace";

/// Name of the job created for a run
pub fn job_name(run_id: Uuid) -> String {
    format!("piaflow-run-{}", run_id)
}

/// Name of the credential secret belonging to a job
pub fn secret_name(job_name: &str) -> String {
    format!("{}-ssh", job_name)
}

/// Checks the app carries everything a cluster job needs
pub fn check_settings(app: &App) -> Result<(), ClusterError> {
    if app.k8s_namespace.trim().is_empty() {
        return Err(ClusterError::MissingSetting("k8s_namespace"));
    }
    if app.k8s_service_account.trim().is_empty() {
        return Err(ClusterError::MissingSetting("k8s_service_account"));
    }
    if app.k8s_runner_image.trim().is_empty() {
        return Err(ClusterError::MissingSetting("k8s_runner_image"));
    }
    Ok(())
}

fn echo(text: &str) -> String {
    format!("echo {}", shell_quote(text))
}

/// Renders the whole pipeline as one POSIX shell script
///
/// The script prints the same markers the local executor writes, so the
/// pod log reads like a local run log.
pub fn job_script(app: &App, steps: &[Step], with_credential: bool) -> Result<String, ClusterError> {
    if steps.is_empty() {
        return Err(ClusterError::NoSteps);
    }

    let mut lines = vec![
        "set -eu".to_string(),
        format!("mkdir -p {}", WORKSPACE),
        format!("cd {}", WORKSPACE),
    ];

    if with_credential {
        let ssh = format!(
            "ssh -i {}/{} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
            SSH_MOUNT_PATH, SSH_KEY_FILE
        );
        lines.push(format!("export GIT_SSH_COMMAND={}", shell_quote(&ssh)));
    }

    lines.push(format!(
        "git clone --branch {} --single-branch {} repo",
        shell_quote(app.branch_or_default()),
        shell_quote(app.repo.trim())
    ));
    lines.push("cd repo".to_string());
    lines.push(format!("echo \"{}$(git rev-parse HEAD)\"", log::COMMIT_PREFIX));

    for step in steps {
        lines.push(echo(&log::step_header(&step.name)));
        lines.extend(script_lines(app, step)?);
        lines.push(echo(&log::step_ok(&step.name)));
        if step.sleep_sec > 0 {
            lines.push(format!("sleep {}", step.sleep_sec));
        }
    }

    lines.push(echo(log::PIPELINE_COMPLETED));
    Ok(lines.join("\n"))
}

/// Opaque secret holding the private key
pub fn secret_manifest(namespace: &str, name: &str, private_key: &str) -> Value {
    let mut key = private_key.to_string();
    if !key.ends_with('\n') {
        key.push('\n');
    }

    let mut data = serde_json::Map::new();
    data.insert(SSH_KEY_FILE.to_string(), Value::String(STANDARD.encode(key)));

    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app.kubernetes.io/managed-by": "piaflow" },
        },
        "type": "Opaque",
        "data": data,
    })
}

/// Single-attempt batch job running `script`
pub fn job_manifest(
    app: &App,
    name: &str,
    script: &str,
    secret: Option<&str>,
    ttl: Duration,
) -> Value {
    let mut container = json!({
        "name": "runner",
        "image": app.k8s_runner_image.trim(),
        "imagePullPolicy": "IfNotPresent",
        "command": ["/bin/sh", "-c", script],
    });
    let mut pod_spec = json!({
        "serviceAccountName": app.k8s_service_account.trim(),
        "restartPolicy": "Never",
    });

    if let Some(secret) = secret {
        container["volumeMounts"] = json!([{
            "name": "ssh-key",
            "mountPath": SSH_MOUNT_PATH,
            "readOnly": true,
        }]);
        pod_spec["volumes"] = json!([{
            "name": "ssh-key",
            "secret": { "secretName": secret, "defaultMode": 0o400 },
        }]);
    }
    pod_spec["containers"] = json!([container]);

    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": name,
            "namespace": app.k8s_namespace.trim(),
            "labels": { "app.kubernetes.io/managed-by": "piaflow" },
        },
        "spec": {
            "backoffLimit": 0,
            "ttlSecondsAfterFinished": ttl.as_secs(),
            "template": {
                "metadata": { "labels": { "app.kubernetes.io/managed-by": "piaflow" } },
                "spec": pod_spec,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use piaflow_core::domain::app::DeployMode;
    use piaflow_core::domain::step::StepAction;

    fn app() -> App {
        App {
            id: "web".to_string(),
            repo: "git@example.com:org/web.git".to_string(),
            branch: "release".to_string(),
            deploy_mode: Some(DeployMode::Kubectl),
            deploy_manifest_path: "k8s/".to_string(),
            k8s_namespace: "apps".to_string(),
            k8s_service_account: "deployer".to_string(),
            k8s_runner_image: "registry/runner:1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_names() {
        let id = Uuid::nil();
        let job = job_name(id);
        assert_eq!(job, "piaflow-run-00000000-0000-0000-0000-000000000000");
        assert_eq!(secret_name(&job), format!("{}-ssh", job));
    }

    #[test]
    fn test_check_settings() {
        assert!(check_settings(&app()).is_ok());

        let mut missing = app();
        missing.k8s_service_account = " ".to_string();
        assert!(matches!(
            check_settings(&missing),
            Err(ClusterError::MissingSetting("k8s_service_account"))
        ));
    }

    #[test]
    fn test_job_script_layout() {
        let test = Step::cmd("test", "make test", 5);
        let deploy = Step {
            name: "deploy".to_string(),
            action: StepAction::K8sDeploy,
            sleep_sec: 0,
        };

        let script = job_script(&app(), &[test, deploy], true).unwrap();
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "set -eu");
        assert_eq!(lines[1], "mkdir -p /workspace");
        assert_eq!(lines[2], "cd /workspace");
        assert_eq!(
            lines[3],
            "export GIT_SSH_COMMAND='ssh -i /var/run/piaflow-ssh/id_key -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new'"
        );
        assert_eq!(
            lines[4],
            "git clone --branch 'release' --single-branch 'git@example.com:org/web.git' repo"
        );
        assert_eq!(lines[5], "cd repo");
        assert_eq!(lines[6], r#"echo "commit: $(git rev-parse HEAD)""#);
        assert_eq!(lines[7], "echo '=== Step: test ==='");
        assert_eq!(lines[8], "sh -c 'make test'");
        assert_eq!(lines[9], "echo 'test step OK'");
        assert_eq!(lines[10], "sleep 5");
        assert_eq!(lines[11], "echo '=== Step: deploy ==='");
        assert_eq!(lines[12], "kubectl '-n' 'apps' 'apply' '-f' 'k8s/'");
        assert_eq!(lines[13], "echo 'deploy step OK'");
        assert_eq!(lines[14], "echo 'pipeline completed successfully'");
        assert_eq!(lines.len(), 15);
    }

    #[test]
    fn test_job_script_without_credential() {
        let script = job_script(&app(), &[Step::cmd("test", "true", 0)], false).unwrap();
        assert!(!script.contains("GIT_SSH_COMMAND"));
    }

    #[test]
    fn test_job_script_errors() {
        assert!(matches!(job_script(&app(), &[], false), Err(ClusterError::NoSteps)));

        let mut app = app();
        app.deploy_mode = None;
        let deploy = Step {
            name: "deploy".to_string(),
            action: StepAction::K8sDeploy,
            sleep_sec: 0,
        };
        assert!(matches!(
            job_script(&app, &[deploy], false),
            Err(ClusterError::Render(_))
        ));
    }

    #[test]
    fn test_secret_manifest() {
        let secret = secret_manifest("apps", "job-ssh", "KEY");
        assert_eq!(secret["kind"], "Secret");
        assert_eq!(secret["type"], "Opaque");
        assert_eq!(secret["metadata"]["namespace"], "apps");
        assert_eq!(secret["data"]["id_key"], STANDARD.encode("KEY\n"));
    }

    #[test]
    fn test_job_manifest() {
        let job = job_manifest(
            &app(),
            "piaflow-run-x",
            "echo hi",
            Some("piaflow-run-x-ssh"),
            Duration::from_secs(3600),
        );

        assert_eq!(job["apiVersion"], "batch/v1");
        assert_eq!(job["spec"]["backoffLimit"], 0);
        assert_eq!(job["spec"]["ttlSecondsAfterFinished"], 3600);

        let pod = &job["spec"]["template"]["spec"];
        assert_eq!(pod["restartPolicy"], "Never");
        assert_eq!(pod["serviceAccountName"], "deployer");
        assert_eq!(pod["volumes"][0]["secret"]["secretName"], "piaflow-run-x-ssh");

        let container = &pod["containers"][0];
        assert_eq!(container["image"], "registry/runner:1");
        assert_eq!(container["imagePullPolicy"], "IfNotPresent");
        assert_eq!(container["command"], json!(["/bin/sh", "-c", "echo hi"]));
        assert_eq!(container["volumeMounts"][0]["mountPath"], SSH_MOUNT_PATH);
        assert_eq!(container["volumeMounts"][0]["readOnly"], true);
    }

    #[test]
    fn test_job_manifest_without_secret() {
        let job = job_manifest(&app(), "j", "true", None, Duration::from_secs(60));
        let pod = &job["spec"]["template"]["spec"];
        assert!(pod.get("volumes").is_none());
        assert!(pod["containers"][0].get("volumeMounts").is_none());
    }
}
