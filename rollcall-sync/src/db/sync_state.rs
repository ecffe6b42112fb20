//! Key-value sync cursors

use super::timestamp_text;
use chrono::{DateTime, Utc};
use rollcall_common::Result;
use sqlx::SqliteConnection;

/// Stored value for a key, if any
pub async fn get_sync_state(conn: &mut SqliteConnection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(value)
}

/// Insert or replace a value
pub async fn set_sync_state(conn: &mut SqliteConnection, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_state (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(timestamp_text(now))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_get_missing_key() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(get_sync_state(&mut conn, "last_behaviour_sync").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_replace() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        set_sync_state(&mut conn, "k", "2024-05-01T00:00:00Z", Utc::now()).await.unwrap();
        set_sync_state(&mut conn, "k", "2024-06-01T00:00:00Z", Utc::now()).await.unwrap();

        assert_eq!(
            get_sync_state(&mut conn, "k").await.unwrap().as_deref(),
            Some("2024-06-01T00:00:00Z")
        );
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_state")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }
}
