//! Local executor
//!
//! Syncs the app's repository into `work_dir/<app id>` and runs every
//! effective step there as a host subprocess, in order, stopping at the
//! first failure.
//!
//! Concurrent runs of one app share the checkout directory without any
//! locking.

use std::path::{Path, PathBuf};
use std::time::Duration;

use piaflow_core::domain::app::App;
use piaflow_core::domain::run::PipelineResult;
use piaflow_core::domain::step::Step;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::error::{StepError, SyncError};
use crate::log::{self, RunLog};
use crate::process::{run_captured, run_combined};
use crate::render::local_invocation;

/// Per-run settings the caller resolves before execution
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Value for `GIT_SSH_COMMAND` during clone and pull
    pub git_ssh_command: Option<String>,
    /// Extra environment for step processes, on top of the inherited one
    pub step_env: Vec<(String, String)>,
}

/// Runs pipelines against a checkout on this host
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    config: RunnerConfig,
}

impl LocalExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Checkout directory of an app
    pub fn checkout_dir(&self, app: &App) -> PathBuf {
        self.config.work_dir.join(app.id.trim())
    }

    /// Executes the app's pipeline, streaming progress into `log`
    ///
    /// Never fails: every error ends up in the log and a failed result.
    pub async fn run(&self, app: &App, options: &RunOptions, log: &mut RunLog) -> PipelineResult {
        let dir = self.checkout_dir(app);
        info!(app_id = %app.id, dir = %dir.display(), "starting local pipeline");

        if let Err(e) = self.sync(app, &dir, options).await {
            warn!(app_id = %app.id, "sync failed: {}", e);
            log.line(e.to_string()).await;
            return PipelineResult::failed(log.as_str());
        }

        let commit = self.head_commit(&dir).await;
        if let Some(sha) = &commit {
            log.line(format!("{}{}", log::COMMIT_PREFIX, sha)).await;
        }

        for step in app.effective_steps() {
            log.line(log::step_header(&step.name)).await;

            if let Err(e) = self.run_step(app, &step, &dir, options, log).await {
                warn!(app_id = %app.id, step = %step.name, "step failed: {}", e);
                log.line(log::step_failed(&step.name, &e)).await;
                return PipelineResult::failed(log.as_str()).with_commit(commit);
            }
            log.line(log::step_ok(&step.name)).await;

            if step.sleep_sec > 0 {
                log.line(format!("Sleeping {}s after {}...", step.sleep_sec, step.name))
                    .await;
                tokio::time::sleep(Duration::from_secs(step.sleep_sec)).await;
                log.flush().await;
            }
        }

        log.line(log::PIPELINE_COMPLETED).await;
        info!(app_id = %app.id, "local pipeline succeeded");
        PipelineResult::success(log.as_str()).with_commit(commit)
    }

    async fn sync(&self, app: &App, dir: &Path, options: &RunOptions) -> Result<(), SyncError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(SyncError::WorkDir)?;

        let branch = app.branch_or_default();
        let mut git = self.git(dir, options);

        if dir.join(".git").exists() {
            debug!(dir = %dir.display(), branch, "pulling");
            git.args(["pull", "origin", branch]);
            run_captured(git, None).await.map_err(SyncError::Pull)?;
        } else {
            debug!(dir = %dir.display(), branch, "cloning");
            git.args(["clone", "--branch", branch, "--single-branch", app.repo.trim(), "."]);
            run_captured(git, None).await.map_err(SyncError::Clone)?;
        }

        Ok(())
    }

    async fn head_commit(&self, dir: &Path) -> Option<String> {
        let mut git = self.git(dir, &RunOptions::default());
        git.args(["rev-parse", "HEAD"]);

        match run_captured(git, None).await {
            Ok(output) => {
                let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!sha.is_empty()).then_some(sha)
            }
            Err(e) => {
                warn!(dir = %dir.display(), "could not resolve HEAD: {}", e);
                None
            }
        }
    }

    async fn run_step(
        &self,
        app: &App,
        step: &Step,
        dir: &Path,
        options: &RunOptions,
        log: &mut RunLog,
    ) -> Result<(), StepError> {
        let Some(invocation) = local_invocation(app, step)? else {
            return Ok(());
        };

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(dir)
            .envs(options.step_env.iter().map(|(k, v)| (k, v)));

        let output = run_combined(command).await?;
        log.push_output(&output.output);
        output.check()?;
        Ok(())
    }

    fn git(&self, dir: &Path, options: &RunOptions) -> Command {
        let mut command = Command::new(&self.config.git_bin);
        command.current_dir(dir);
        if let Some(ssh) = &options.git_ssh_command {
            command.env("GIT_SSH_COMMAND", ssh);
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogObserver;
    use async_trait::async_trait;
    use piaflow_core::domain::step::StepConfig;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LogObserver for Recorder {
        async fn log_updated(&self, log: &str) {
            self.snapshots.lock().unwrap().push(log.to_string());
        }
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=piaflow", "-c", "user.email=piaflow@localhost"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {:?} failed", args);
    }

    /// Creates an upstream repository with one commit on `main`
    fn upstream() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(dir.path().join("README"), "hello\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "init"]);
        dir
    }

    fn app(repo: &Path) -> App {
        App {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            repo: repo.to_string_lossy().into_owned(),
            branch: "main".to_string(),
            ..Default::default()
        }
    }

    fn step(name: &str, cmd: &str) -> StepConfig {
        StepConfig {
            name: name.to_string(),
            cmd: cmd.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_legacy_pipeline_succeeds() {
        if !git_available() {
            return;
        }
        let origin = upstream();
        let work = TempDir::new().unwrap();
        let executor = LocalExecutor::new(RunnerConfig::new(work.path()));

        let mut app = app(origin.path());
        app.test_cmd = "echo hi".to_string();
        app.build_cmd = "echo done".to_string();

        let mut log = RunLog::new();
        let result = executor.run(&app, &RunOptions::default(), &mut log).await;

        assert!(result.success, "log:\n{}", result.log);
        let expected = [
            "=== Step: test ===",
            "hi",
            "test step OK",
            "=== Step: build ===",
            "done",
            "build step OK",
            "pipeline completed successfully",
        ];
        let mut rest = result.log.as_str();
        for marker in expected {
            let idx = rest.find(marker).unwrap_or_else(|| panic!("missing {marker:?}"));
            rest = &rest[idx + marker.len()..];
        }
        assert!(result.log.trim_end().ends_with(log::PIPELINE_COMPLETED));

        let sha = result.commit_sha.unwrap();
        assert_eq!(sha.len(), 40);
        assert!(result.log.contains(&format!("commit: {}", sha)));

        // Second run takes the pull path in the existing checkout
        let mut log = RunLog::new();
        let again = executor.run(&app, &RunOptions::default(), &mut log).await;
        assert!(again.success, "log:\n{}", again.log);
    }

    #[tokio::test]
    async fn test_clone_failure_runs_no_steps() {
        if !git_available() {
            return;
        }
        let work = TempDir::new().unwrap();
        let executor = LocalExecutor::new(RunnerConfig::new(work.path()));

        let mut app = app(&work.path().join("missing-repo"));
        app.test_cmd = "echo hi".to_string();

        let mut log = RunLog::new();
        let result = executor.run(&app, &RunOptions::default(), &mut log).await;

        assert!(!result.success);
        assert!(result.log.starts_with("git clone: "));
        assert!(!result.log.contains("=== Step:"));
        assert_eq!(result.commit_sha, None);
    }

    #[tokio::test]
    async fn test_failing_step_stops_pipeline() {
        if !git_available() {
            return;
        }
        let origin = upstream();
        let work = TempDir::new().unwrap();
        let executor = LocalExecutor::new(RunnerConfig::new(work.path()));

        let mut app = app(origin.path());
        app.steps = vec![
            step("first", "echo one"),
            step("second", "sh -c 'exit 3'"),
            step("third", "echo three"),
        ];

        let mut log = RunLog::new();
        let result = executor.run(&app, &RunOptions::default(), &mut log).await;

        assert!(!result.success);
        assert!(result.log.contains("first step OK"));
        assert!(result.log.contains("second step failed: exit status: 3"));
        assert!(!result.log.contains("=== Step: third ==="));
        assert!(!result.log.contains(log::PIPELINE_COMPLETED));
        assert!(result.commit_sha.is_some());
    }

    #[tokio::test]
    async fn test_unrunnable_step_reports_spawn_error() {
        if !git_available() {
            return;
        }
        let origin = upstream();
        let work = TempDir::new().unwrap();
        let executor = LocalExecutor::new(RunnerConfig::new(work.path()));

        let mut app = app(origin.path());
        app.steps = vec![step("broken", "piaflow-no-such-program --flag")];

        let mut log = RunLog::new();
        let result = executor.run(&app, &RunOptions::default(), &mut log).await;

        assert!(!result.success);
        assert!(result
            .log
            .contains("broken step failed: failed to start piaflow-no-such-program"));
    }

    #[tokio::test]
    async fn test_step_env_and_script_modes() {
        if !git_available() {
            return;
        }
        let origin = upstream();
        let work = TempDir::new().unwrap();
        let executor = LocalExecutor::new(RunnerConfig::new(work.path()));

        let mut app = app(origin.path());
        app.steps = vec![
            StepConfig {
                script: "echo \"value=$PIAFLOW_TEST_VALUE\"".to_string(),
                ..Default::default()
            },
            StepConfig {
                file: "README".to_string(),
                ..Default::default()
            },
        ];
        // `sh README` tries to run `hello`, which is not a command
        let options = RunOptions {
            git_ssh_command: None,
            step_env: vec![("PIAFLOW_TEST_VALUE".to_string(), "42".to_string())],
        };

        let mut log = RunLog::new();
        let result = executor.run(&app, &options, &mut log).await;

        assert!(result.log.contains("=== Step: step-1 ==="));
        assert!(result.log.contains("value=42"));
        assert!(result.log.contains("step-1 step OK"));
        assert!(result.log.contains("step-2 step failed:"));
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_sleep_notifies_before_and_after() {
        if !git_available() {
            return;
        }
        let origin = upstream();
        let work = TempDir::new().unwrap();
        let executor = LocalExecutor::new(RunnerConfig::new(work.path()));

        let mut app = app(origin.path());
        app.test_cmd = "true".to_string();
        app.test_sleep_sec = 1;

        let recorder = Arc::new(Recorder::default());
        let mut log = RunLog::with_observer(Some(recorder.clone()));
        let result = executor.run(&app, &RunOptions::default(), &mut log).await;
        assert!(result.success, "log:\n{}", result.log);

        let snapshots = recorder.snapshots.lock().unwrap();
        let sleeping = snapshots
            .iter()
            .position(|s| s.ends_with("Sleeping 1s after test...\n"))
            .expect("no sleeping snapshot");
        assert_eq!(snapshots[sleeping + 1], snapshots[sleeping]);
        assert_eq!(snapshots.last().unwrap(), &result.log);
    }
}
