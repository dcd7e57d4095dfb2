//! Database operations for the sync_state key/value table.

use sqlx::{Row, SqlitePool};

/// Read a value. `None` when the key is absent or holds NULL.
pub async fn get_state(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT value FROM sync_state WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => row.try_get("value"),
        None => Ok(None),
    }
}

/// Write a value, replacing any previous one.
pub async fn set_state(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_state (key, value) VALUES (?1, ?2)
        ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a key.
pub async fn delete_state(pool: &SqlitePool, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sync_state WHERE key = ?1")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(())
}
