//! Behaviour and attendance observations

use super::timestamp_text;
use chrono::{DateTime, SecondsFormat, Utc};
use rollcall_common::db::{Observation, ObservationKind};
use rollcall_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Insert or refresh an observation keyed by (kind, external id)
///
/// `created_at` is written once; `updated_at` moves to `now` on every merge.
pub async fn upsert_observation(conn: &mut SqliteConnection, observation: &Observation, now: DateTime<Utc>) -> Result<()> {
    let now = timestamp_text(now);
    let date_time = observation
        .date_time
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true));

    sqlx::query(
        r#"
        INSERT INTO observations (
            kind, external_id, student_id, date_time, category, content, source,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(kind, external_id) DO UPDATE SET
            student_id = excluded.student_id,
            date_time = excluded.date_time,
            category = excluded.category,
            content = excluded.content,
            source = excluded.source,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(observation.kind.as_str())
    .bind(&observation.external_id)
    .bind(observation.student_id)
    .bind(date_time)
    .bind(&observation.category)
    .bind(&observation.content)
    .bind(&observation.source)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Most recent observations of one kind for a student (undated ones last)
pub async fn recent_observations(
    pool: &SqlitePool,
    student_id: i64,
    kind: ObservationKind,
    limit: u32,
) -> Result<Vec<Observation>> {
    let rows = sqlx::query(
        r#"
        SELECT external_id, student_id, date_time, category, content, source
        FROM observations
        WHERE student_id = ? AND kind = ?
        ORDER BY date_time IS NULL, date_time DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(student_id)
    .bind(kind.as_str())
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let date_time: Option<String> = row.get("date_time");
            Observation {
                kind,
                external_id: row.get("external_id"),
                student_id: row.get("student_id"),
                date_time: date_time.as_deref().and_then(rollcall_common::time::parse_timestamp),
                category: row.get::<Option<String>, _>("category").unwrap_or_default(),
                content: row.get::<Option<String>, _>("content").unwrap_or_default(),
                source: row.get::<Option<String>, _>("source").unwrap_or_default(),
            }
        })
        .collect())
}
