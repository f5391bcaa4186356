//! App Service
//!
//! In-memory app registry behind a read-write lock. Readers get cloned
//! snapshots; writers hold the lock exclusively and, when a backing file is
//! configured, rewrite it in full before releasing it.

use async_trait::async_trait;
use piaflow_core::domain::app::App;
use piaflow_core::validation::{ValidationError, validate_app};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::store::{AppSource, RunStore, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("app {0} not found")]
    NotFound(String),

    #[error("app {0} already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to persist apps: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid apps file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AppRegistry {
    apps: RwLock<Vec<App>>,
    file: Option<PathBuf>,
    runs: Arc<dyn RunStore>,
}

impl AppRegistry {
    /// Creates a registry that lives only in memory
    pub fn new(runs: Arc<dyn RunStore>) -> Self {
        Self {
            apps: RwLock::new(Vec::new()),
            file: None,
            runs,
        }
    }

    /// Loads apps from a JSON file, which later writes rewrite
    ///
    /// A missing file starts an empty registry. Every loaded app must pass
    /// validation.
    pub async fn load(path: impl AsRef<Path>, runs: Arc<dyn RunStore>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        let apps = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let apps: Vec<App> = serde_json::from_slice(&bytes)?;
                apps.into_iter()
                    .map(|app| -> Result<App, AppError> {
                        let app = app.normalized();
                        validate_app(&app)?;
                        Ok(app)
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Apps file {} not found, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Loaded {} apps from {}", apps.len(), path.display());

        Ok(Self {
            apps: RwLock::new(apps),
            file: Some(path),
            runs,
        })
    }

    pub async fn list(&self) -> Vec<App> {
        self.apps.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<App> {
        self.apps.read().await.iter().find(|a| a.id == id).cloned()
    }

    /// Validates and adds a new app
    pub async fn create(&self, app: App) -> Result<App, AppError> {
        let app = app.normalized();
        validate_app(&app)?;

        let mut apps = self.apps.write().await;
        if apps.iter().any(|a| a.id == app.id) {
            return Err(AppError::AlreadyExists(app.id));
        }
        let mut next = apps.clone();
        next.push(app.clone());
        self.persist(&next).await?;
        *apps = next;

        tracing::info!("App created: {}", app.id);
        Ok(app)
    }

    /// Replaces an app; the ID always comes from `id`
    pub async fn update(&self, id: &str, mut app: App) -> Result<App, AppError> {
        app.id = id.to_string();
        let app = app.normalized();
        validate_app(&app)?;

        let mut apps = self.apps.write().await;
        let mut next = apps.clone();
        let slot = next
            .iter_mut()
            .find(|a| a.id == app.id)
            .ok_or_else(|| AppError::NotFound(app.id.clone()))?;
        *slot = app.clone();
        self.persist(&next).await?;
        *apps = next;

        tracing::info!("App updated: {}", app.id);
        Ok(app)
    }

    /// Removes an app together with its runs
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let mut apps = self.apps.write().await;
        let next: Vec<App> = apps.iter().filter(|a| a.id != id).cloned().collect();
        if next.len() == apps.len() {
            return Err(AppError::NotFound(id.to_string()));
        }
        self.persist(&next).await?;
        *apps = next;

        let removed = self.runs.delete_runs_for_app(id).await?;
        tracing::info!("App deleted: {} ({} runs removed)", id, removed);
        Ok(())
    }

    /// Writes the full list; callers swap it in only once this succeeds
    async fn persist(&self, apps: &[App]) -> Result<(), AppError> {
        if let Some(path) = &self.file {
            let bytes = serde_json::to_vec_pretty(apps)?;
            tokio::fs::write(path, bytes).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AppSource for AppRegistry {
    async fn get_app(&self, id: &str) -> Option<App> {
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRunStore;

    fn app(id: &str) -> App {
        App {
            id: id.to_string(),
            name: id.to_uppercase(),
            repo: format!("https://example.com/{}.git", id),
            test_cmd: "make test".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_fills_branch_and_rejects_duplicates() {
        let registry = AppRegistry::new(Arc::new(InMemoryRunStore::new()));

        let created = registry.create(app("web")).await.unwrap();
        assert_eq!(created.branch, "main");
        assert_eq!(registry.get("web").await, Some(created));

        let err = registry.create(app("web")).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(id) if id == "web"));
    }

    #[tokio::test]
    async fn test_create_validates() {
        let registry = AppRegistry::new(Arc::new(InMemoryRunStore::new()));
        let mut invalid = app("web");
        invalid.test_cmd.clear();

        let err = registry.create(invalid).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(ValidationError::NoSteps)));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_takes_id_from_path() {
        let registry = AppRegistry::new(Arc::new(InMemoryRunStore::new()));
        registry.create(app("web")).await.unwrap();

        let mut changed = app("ignored");
        changed.build_cmd = "make".to_string();
        let updated = registry.update("web", changed).await.unwrap();
        assert_eq!(updated.id, "web");
        assert_eq!(registry.get("web").await.unwrap().build_cmd, "make");
        assert!(registry.get("ignored").await.is_none());

        let err = registry.update("api", app("api")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_runs() {
        let runs = Arc::new(InMemoryRunStore::new());
        let registry = AppRegistry::new(runs.clone());
        registry.create(app("web")).await.unwrap();
        runs.create_run("web", "", "ci").await.unwrap();
        runs.create_run("api", "", "ci").await.unwrap();

        registry.delete("web").await.unwrap();
        assert!(registry.get("web").await.is_none());
        assert_eq!(runs.count_runs(Some("web")).await.unwrap(), 0);
        assert_eq!(runs.count_runs(None).await.unwrap(), 1);

        assert!(matches!(
            registry.delete("web").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_is_rewritten_and_reloaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("apps.json");
        let runs: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());

        let registry = AppRegistry::load(&path, runs.clone()).await.unwrap();
        assert!(registry.list().await.is_empty());
        registry.create(app("web")).await.unwrap();
        registry.create(app("api")).await.unwrap();
        registry.delete("api").await.unwrap();

        let reloaded = AppRegistry::load(&path, runs).await.unwrap();
        let ids: Vec<String> = reloaded.list().await.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["web"]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_registry_unchanged() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("apps.json");
        let registry = AppRegistry::load(&path, Arc::new(InMemoryRunStore::new()))
            .await
            .unwrap();
        registry.create(app("web")).await.unwrap();

        // Writes fail once the file's directory is gone
        dir.close().unwrap();

        let err = registry.create(app("api")).await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert!(registry.get("api").await.is_none());

        let mut changed = app("web");
        changed.build_cmd = "make".to_string();
        assert!(registry.update("web", changed).await.is_err());
        assert_eq!(registry.get("web").await.unwrap().build_cmd, "");

        assert!(registry.delete("web").await.is_err());
        assert!(registry.get("web").await.is_some());
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_apps() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("apps.json");
        std::fs::write(&path, r#"[{"id": "web", "name": "Web"}]"#).unwrap();

        let result = AppRegistry::load(&path, Arc::new(InMemoryRunStore::new())).await;
        assert!(matches!(result, Err(AppError::Invalid(_))));
    }
}
