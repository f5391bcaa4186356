//! Run Repository
//!
//! Handles all database operations related to runs.

use piaflow_core::domain::run::{Run, RunStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a new pending run
pub async fn create(
    pool: &PgPool,
    app_id: &str,
    commit_sha: &str,
    triggered_by: &str,
) -> Result<Run, sqlx::Error> {
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

    sqlx::query(
        r#"
        INSERT INTO runs (id, app_id, triggered_by, status, commit_sha, log, started_at)
        VALUES ($1, $2, $3, $4, $5, '', $6)
        "#,
    )
    .bind(run.id)
    .bind(&run.app_id)
    .bind(&run.triggered_by)
    .bind(run.status.as_str())
    .bind(&run.commit_sha)
    .bind(run.started_at)
    .execute(pool)
    .await?;

    Ok(run)
}

/// Update status and log, stamping `ended_at` on terminal statuses
///
/// A `None` commit keeps whatever is stored.
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    log: &str,
    commit_sha: Option<&str>,
) -> Result<(), sqlx::Error> {
    let ended_at = status.is_terminal().then(chrono::Utc::now);

    sqlx::query(
        r#"
        UPDATE runs
        SET status = $1, log = $2, commit_sha = COALESCE($3, commit_sha),
            ended_at = COALESCE($4, ended_at)
        WHERE id = $5
        "#,
    )
    .bind(status.as_str())
    .bind(log)
    .bind(commit_sha)
    .bind(ended_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the stored log
pub async fn update_log(pool: &PgPool, id: Uuid, log: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE runs SET log = $1 WHERE id = $2")
        .bind(log)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Find a run by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Run>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, app_id, triggered_by, status, commit_sha, log, started_at, ended_at
        FROM runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List runs newest first, optionally for one app
pub async fn list(
    pool: &PgPool,
    app_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, app_id, triggered_by, status, commit_sha, log, started_at, ended_at
        FROM runs
        WHERE ($1::VARCHAR IS NULL OR app_id = $1)
        ORDER BY started_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(app_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Count runs, optionally for one app
pub async fn count(pool: &PgPool, app_id: Option<&str>) -> Result<i64, sqlx::Error> {
    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM runs WHERE ($1::VARCHAR IS NULL OR app_id = $1)")
            .bind(app_id)
            .fetch_one(pool)
            .await?;

    Ok(total)
}

/// Delete every run of an app
pub async fn delete_by_app(pool: &PgPool, app_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM runs WHERE app_id = $1")
        .bind(app_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    app_id: String,
    triggered_by: String,
    status: String,
    commit_sha: String,
    log: String,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!("run {} has {}, treating it as failed", row.id, e);
            RunStatus::Failed
        });

        Run {
            id: row.id,
            app_id: row.app_id,
            triggered_by: row.triggered_by,
            status,
            commit_sha: row.commit_sha,
            log: row.log,
            started_at: row.started_at,
            ended_at: row.ended_at,
        }
    }
}
