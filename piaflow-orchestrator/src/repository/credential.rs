//! Credential Repository
//!
//! Named SSH private keys used to clone app repositories.

use sqlx::PgPool;

/// Find a private key by name
pub async fn find_private_key(pool: &PgPool, name: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT private_key FROM ssh_keys WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(key,)| key))
}

/// Insert or replace a private key
pub async fn upsert_private_key(pool: &PgPool, name: &str, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ssh_keys (name, private_key, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE
        SET private_key = EXCLUDED.private_key, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(name)
    .bind(key)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
