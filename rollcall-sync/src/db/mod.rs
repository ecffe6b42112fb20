//! Merge layer
//!
//! Sole writer of the local store. Every write is an
//! `INSERT ... ON CONFLICT(<identity>) DO UPDATE` on a caller-supplied
//! connection, so the orchestrator decides the transaction boundaries and
//! re-running a phase never duplicates rows.

pub mod observations;
pub mod snapshots;
pub mod students;
pub mod sync_state;

pub use observations::{recent_observations, upsert_observation};
pub use snapshots::{snapshots_for_student, upsert_snapshot};
pub use students::{list_students, upsert_student};
pub use sync_state::{get_sync_state, set_sync_state};

use chrono::{DateTime, SecondsFormat, Utc};

/// Storage format for timestamps
pub(crate) fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// In-memory store with the full schema (single connection so every
/// checkout sees the same database)
#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    rollcall_common::db::create_schema(&pool).await.unwrap();
    pool
}
