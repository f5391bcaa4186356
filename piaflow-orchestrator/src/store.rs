//! Store abstractions
//!
//! The lifecycle controller only sees these traits. Postgres-backed
//! implementations wrap the repository functions; in-memory ones serve
//! database-less deployments and tests.

use async_trait::async_trait;
use piaflow_core::domain::app::App;
use piaflow_core::domain::run::{Run, RunStatus};
use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{credential_repository, run_repository};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("run {0} not found")]
    RunNotFound(Uuid),
}

/// Persistence of run records
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts a pending run
    async fn create_run(
        &self,
        app_id: &str,
        commit_sha: &str,
        triggered_by: &str,
    ) -> Result<Run, StoreError>;

    /// Sets status and log; terminal statuses also stamp `ended_at`
    ///
    /// A `None` commit keeps the stored one.
    async fn update_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        log: &str,
        commit_sha: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Overwrites the stored log
    async fn update_run_log(&self, id: Uuid, log: &str) -> Result<(), StoreError>;

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError>;

    /// Newest first
    async fn list_runs(
        &self,
        app_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>, StoreError>;

    async fn count_runs(&self, app_id: Option<&str>) -> Result<i64, StoreError>;

    async fn delete_runs_for_app(&self, app_id: &str) -> Result<u64, StoreError>;
}

/// Named private keys
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_private_key(&self, name: &str) -> Result<Option<String>, StoreError>;

    async fn put_private_key(&self, name: &str, key: &str) -> Result<(), StoreError>;
}

/// Source of app snapshots
#[async_trait]
pub trait AppSource: Send + Sync {
    /// Returns an owned copy of the app
    async fn get_app(&self, id: &str) -> Option<App>;
}

// =============================================================================
// Postgres
// =============================================================================

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(
        &self,
        app_id: &str,
        commit_sha: &str,
        triggered_by: &str,
    ) -> Result<Run, StoreError> {
        Ok(run_repository::create(&self.pool, app_id, commit_sha, triggered_by).await?)
    }

    async fn update_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        log: &str,
        commit_sha: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(run_repository::update_status(&self.pool, id, status, log, commit_sha).await?)
    }

    async fn update_run_log(&self, id: Uuid, log: &str) -> Result<(), StoreError> {
        Ok(run_repository::update_log(&self.pool, id, log).await?)
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError> {
        Ok(run_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_runs(
        &self,
        app_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>, StoreError> {
        Ok(run_repository::list(&self.pool, app_id, limit, offset).await?)
    }

    async fn count_runs(&self, app_id: Option<&str>) -> Result<i64, StoreError> {
        Ok(run_repository::count(&self.pool, app_id).await?)
    }

    async fn delete_runs_for_app(&self, app_id: &str) -> Result<u64, StoreError> {
        Ok(run_repository::delete_by_app(&self.pool, app_id).await?)
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_private_key(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(credential_repository::find_private_key(&self.pool, name).await?)
    }

    async fn put_private_key(&self, name: &str, key: &str) -> Result<(), StoreError> {
        Ok(credential_repository::upsert_private_key(&self.pool, name, key).await?)
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<Vec<Run>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_app(run: &Run, app_id: Option<&str>) -> bool {
    app_id.is_none_or(|id| run.app_id == id)
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(
        &self,
        app_id: &str,
        commit_sha: &str,
        triggered_by: &str,
    ) -> Result<Run, StoreError> {
        let run = Run {
            id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            triggered_by: triggered_by.to_string(),
            status: RunStatus::Pending,
            commit_sha: commit_sha.to_string(),
            log: String::new(),
            started_at: chrono::Utc::now(),
            ended_at: None,
        };
        self.runs.write().await.push(run.clone());
        Ok(run)
    }

    async fn update_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        log: &str,
        commit_sha: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::RunNotFound(id))?;

        if !run.status.can_transition_to(status) {
            tracing::warn!("Run {} moved from {} to {}", id, run.status, status);
        }
        run.status = status;
        run.log = log.to_string();
        if let Some(sha) = commit_sha {
            run.commit_sha = sha.to_string();
        }
        if status.is_terminal() {
            run.ended_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn update_run_log(&self, id: Uuid, log: &str) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::RunNotFound(id))?;
        run.log = log.to_string();
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list_runs(
        &self,
        app_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>, StoreError> {
        let runs = self.runs.read().await;
        // Insertion order is creation order, so newest first is reverse order
        Ok(runs
            .iter()
            .rev()
            .filter(|r| matches_app(r, app_id))
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn count_runs(&self, app_id: Option<&str>) -> Result<i64, StoreError> {
        let runs = self.runs.read().await;
        let total = runs.iter().filter(|r| matches_app(r, app_id)).count();
        Ok(total as i64)
    }

    async fn delete_runs_for_app(&self, app_id: &str) -> Result<u64, StoreError> {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|r| r.app_id != app_id);
        Ok((before - runs.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    keys: RwLock<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_private_key(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.keys.read().await.get(name).cloned())
    }

    async fn put_private_key(&self, name: &str, key: &str) -> Result<(), StoreError> {
        self.keys
            .write()
            .await
            .insert(name.to_string(), key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_lifecycle_fields() {
        let store = InMemoryRunStore::new();
        let run = store.create_run("web", "", "alice").await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.ended_at.is_none());

        store
            .update_run_status(run.id, RunStatus::Running, "", None)
            .await
            .unwrap();
        store.update_run_log(run.id, "working\n").await.unwrap();
        let running = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(running.status, RunStatus::Running);
        assert_eq!(running.log, "working\n");
        assert!(running.ended_at.is_none());

        store
            .update_run_status(run.id, RunStatus::Success, "done\n", Some("abc"))
            .await
            .unwrap();
        let done = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Success);
        assert_eq!(done.log, "done\n");
        assert_eq!(done.commit_sha, "abc");
        assert!(done.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_run() {
        let store = InMemoryRunStore::new();
        let err = store.update_run_log(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, StoreError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_and_count_runs() {
        let store = InMemoryRunStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let app = if i % 2 == 0 { "web" } else { "api" };
            ids.push(store.create_run(app, "", "ci").await.unwrap().id);
        }

        assert_eq!(store.count_runs(None).await.unwrap(), 5);
        assert_eq!(store.count_runs(Some("web")).await.unwrap(), 3);

        let page = store.list_runs(None, 2, 0).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);

        let web = store.list_runs(Some("web"), 10, 1).await.unwrap();
        assert_eq!(web.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[2], ids[0]]);
    }

    #[tokio::test]
    async fn test_delete_runs_for_app() {
        let store = InMemoryRunStore::new();
        store.create_run("web", "", "ci").await.unwrap();
        store.create_run("web", "", "ci").await.unwrap();
        store.create_run("api", "", "ci").await.unwrap();

        assert_eq!(store.delete_runs_for_app("web").await.unwrap(), 2);
        assert_eq!(store.count_runs(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_credentials() {
        let store = InMemoryCredentialStore::new();
        assert_eq!(store.get_private_key("deploy").await.unwrap(), None);

        store.put_private_key("deploy", "KEY").await.unwrap();
        assert_eq!(
            store.get_private_key("deploy").await.unwrap(),
            Some("KEY".to_string())
        );
    }
}
