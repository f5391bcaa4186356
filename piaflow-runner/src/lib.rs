//! PiaFlow Runner
//!
//! Executes an app's pipeline and reports a success/failure verdict.
//!
//! Architecture:
//! - Renderer: one dispatch table turning a step into a process invocation
//!   (local) or shell script lines (cluster)
//! - Local executor: syncs a per-app checkout and runs steps as subprocesses
//! - Cluster executor: runs the whole pipeline as a batch job through kubectl
//! - Run log: append-only buffer that notifies an observer on every state change

pub mod cluster;
pub mod config;
pub mod credentials;
pub mod error;
pub mod local;
pub mod log;
pub mod process;
pub mod render;
pub mod shell;

pub use cluster::{ClusterCli, ClusterJobExecutor, JobState, Kubectl};
pub use config::RunnerConfig;
pub use credentials::SshKeyFile;
pub use local::{LocalExecutor, RunOptions};
pub use log::{LogObserver, RunLog};
