//! Orchestrator configuration
//!
//! Command-line flags with environment fallbacks. Executor tuning (poll
//! interval, job deadline, binaries) comes from the runner's own
//! environment variables.

use clap::Parser;
use piaflow_runner::RunnerConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "piaflow-orchestrator")]
#[command(about = "PiaFlow pipeline orchestrator", long_about = None)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "PIAFLOW_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// Postgres URL; runs and keys stay in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// JSON file holding the app list, rewritten on every change
    #[arg(long = "apps", env = "PIAFLOW_APPS_FILE")]
    pub apps_file: Option<PathBuf>,

    /// Base directory for local checkouts
    #[arg(long, env = "PIAFLOW_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

impl Config {
    /// Runner settings from the environment, with flag overrides applied
    pub fn runner_config(&self) -> anyhow::Result<RunnerConfig> {
        let mut runner = RunnerConfig::from_env()?;
        if let Some(dir) = &self.work_dir {
            runner = runner.with_work_dir(dir);
        }
        runner.validate()?;
        Ok(runner)
    }
}
