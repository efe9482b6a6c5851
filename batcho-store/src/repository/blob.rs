//! Blob Repository
//!
//! Handles all database operations on content-addressed blobs.

use sqlx::PgPool;

/// Store a blob under its hash (no-op if already present)
pub async fn insert(pool: &PgPool, hash: &str, content: &[u8]) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO blobs (hash, content, size, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (hash) DO NOTHING
        "#,
    )
    .bind(hash)
    .bind(content)
    .bind(content.len() as i64)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a blob's content by hash
pub async fn find_by_hash(pool: &PgPool, hash: &str) -> Result<Option<Vec<u8>>, sqlx::Error> {
    let row = sqlx::query_as::<_, (Vec<u8>,)>("SELECT content FROM blobs WHERE hash = $1")
        .bind(hash)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(content,)| content))
}
