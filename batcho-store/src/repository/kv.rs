//! Key/Value Repository
//!
//! Handles all database operations on key/value entries. Conditional writes
//! are expressed as single statements so Postgres arbitrates concurrent
//! writers.

use sqlx::PgPool;

/// Find the value stored under a key
pub async fn find_value(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String,)>("SELECT value FROM kv_entries WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(value,)| value))
}

/// Insert or replace the value under a key
pub async fn upsert(pool: &PgPool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO kv_entries (key, value, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (key) DO UPDATE SET
            value = EXCLUDED.value,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a value only if the key is absent
///
/// Returns true if this call created the entry
pub async fn insert_if_absent(pool: &PgPool, key: &str, value: &str) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO kv_entries (key, value, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace a value only if it currently equals `expected`
pub async fn update_if_equal(
    pool: &PgPool,
    key: &str,
    expected: &str,
    value: &str,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE kv_entries
        SET value = $1, updated_at = $2
        WHERE key = $3 AND value = $4
        "#,
    )
    .bind(value)
    .bind(now)
    .bind(key)
    .bind(expected)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a key
pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM kv_entries WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a key only if it currently equals `expected`
pub async fn delete_if_equal(pool: &PgPool, key: &str, expected: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM kv_entries WHERE key = $1 AND value = $2")
        .bind(key)
        .bind(expected)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Check whether a key exists
pub async fn exists(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
    let (exists,) =
        sqlx::query_as::<_, (bool,)>("SELECT EXISTS(SELECT 1 FROM kv_entries WHERE key = $1)")
            .bind(key)
            .fetch_one(pool)
            .await?;

    Ok(exists)
}
