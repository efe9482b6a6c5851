//! Database pool and schema

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Schema statements, applied in order on every start
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "kv_entries",
        r#"
        CREATE TABLE IF NOT EXISTS kv_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "blobs",
        r#"
        CREATE TABLE IF NOT EXISTS blobs (
            hash TEXT PRIMARY KEY,
            content BYTEA NOT NULL,
            size BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "idx_kv_entries_updated_at",
        "CREATE INDEX IF NOT EXISTS idx_kv_entries_updated_at ON kv_entries(updated_at)",
    ),
];

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    for (name, statement) in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
        tracing::debug!("Applied schema step {}", name);
    }

    tracing::info!("Database schema is up to date ({} steps)", MIGRATIONS.len());
    Ok(())
}
