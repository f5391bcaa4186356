use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

// Runs reference apps by ID only; apps live in the registry, not here.
// Caller-supplied text columns are unbounded.
const CREATE_RUNS: &str = r#"
    CREATE TABLE IF NOT EXISTS runs (
        id UUID PRIMARY KEY,
        app_id TEXT NOT NULL,
        triggered_by TEXT NOT NULL,
        status VARCHAR(20) NOT NULL,
        commit_sha VARCHAR(64) NOT NULL DEFAULT '',
        log TEXT NOT NULL DEFAULT '',
        started_at TIMESTAMPTZ NOT NULL,
        ended_at TIMESTAMPTZ
    )
"#;

// Tables created before the columns were widened
const WIDEN_RUNS: &str = r#"
    ALTER TABLE runs
        ALTER COLUMN app_id TYPE TEXT,
        ALTER COLUMN triggered_by TYPE TEXT
"#;

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_RUNS).execute(pool).await?;
    sqlx::query(WIDEN_RUNS).execute(pool).await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_app_id ON runs(app_id, started_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ssh_keys (
            name TEXT PRIMARY KEY,
            private_key TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_text_columns_are_unbounded() {
        for column in ["app_id", "triggered_by"] {
            assert!(CREATE_RUNS.contains(&format!("{} TEXT NOT NULL", column)));
            assert!(WIDEN_RUNS.contains(&format!("ALTER COLUMN {} TYPE TEXT", column)));
        }
    }
}
