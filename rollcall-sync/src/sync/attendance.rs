//! Term attendance sync (single pass, no cursor)

use crate::db::upsert_observation;
use crate::error::SyncError;
use crate::sis::fields::{int_field, text_field};
use crate::sis::SisApi;
use chrono::Utc;
use rollcall_common::db::{Observation, ObservationKind};
use rollcall_common::time::parse_timestamp;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

/// Build an observation from an attendance row; `None` without id or student id
pub fn attendance_observation(row: &Value, default_source: &str) -> Option<Observation> {
    let external_id = text_field(row, &["id"])?;
    let student_id = int_field(row, &["student_id"])?;

    Some(Observation {
        kind: ObservationKind::Attendance,
        external_id,
        student_id,
        date_time: text_field(row, &["date", "recorded_at"])
            .as_deref()
            .and_then(parse_timestamp),
        category: text_field(row, &["status", "type"]).unwrap_or_else(|| "attendance".to_string()),
        content: text_field(row, &["summary", "notes"]).unwrap_or_default(),
        source: text_field(row, &["recorded_by"]).unwrap_or_else(|| default_source.to_string()),
    })
}

/// Fetch the term's attendance and merge it; returns the number merged
///
/// A 400 or 404 means the tenant does not expose attendance this way and is
/// treated as an empty result.
pub async fn sync_attendance(
    api: &dyn SisApi,
    conn: &mut SqliteConnection,
    term_id: &str,
    student_ids: &[i64],
    homeroom_id: Option<i64>,
    default_source: &str,
) -> Result<usize, SyncError> {
    let rows = match api.term_attendance(term_id, student_ids, homeroom_id).await {
        Ok(rows) => rows,
        Err(e) if matches!(e.status(), Some(400) | Some(404)) => {
            warn!(
                status = e.status(),
                error = %e,
                "Attendance endpoint unavailable for this tenant, skipping attendance"
            );
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let now = Utc::now();
    let mut merged = 0;
    for row in &rows {
        let Some(observation) = attendance_observation(row, default_source) else {
            debug!(row = %row, "Dropping attendance row without id or student_id");
            continue;
        };
        upsert_observation(conn, &observation, now).await?;
        merged += 1;
    }

    info!(fetched = rows.len(), merged, "Attendance synced");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{recent_observations, test_pool};
    use crate::sync::testing::FakeSis;
    use serde_json::json;

    #[tokio::test]
    async fn test_rows_merged_with_field_fallbacks() {
        let mut fake = FakeSis::default();
        fake.attendance = Some(Ok(vec![
            json!({"id": 1, "student_id": 5, "date": "2024-09-02", "status": "Late", "summary": "Bus delay"}),
            json!({"id": 2, "student_id": 5, "recorded_at": "2024-09-03T08:10:00+08:00", "type": "Absent",
                   "notes": "Sick", "recorded_by": "Office"}),
            json!({"id": 3}),
        ]));

        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let merged = sync_attendance(&fake, &mut conn, "T1", &[5], Some(77), "SIS").await.unwrap();
        drop(conn);

        assert_eq!(merged, 2);
        assert_eq!(fake.calls(), vec!["term_attendance:Some(77)".to_string()]);

        let stored = recent_observations(&pool, 5, ObservationKind::Attendance, 20).await.unwrap();
        assert_eq!(stored.len(), 2);
        let absent = stored.iter().find(|o| o.external_id == "2").unwrap();
        assert_eq!(absent.category, "Absent");
        assert_eq!(absent.content, "Sick");
        assert_eq!(absent.source, "Office");
        let late = stored.iter().find(|o| o.external_id == "1").unwrap();
        assert_eq!(late.source, "SIS");
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_empty() {
        for code in [400, 404] {
            let mut fake = FakeSis::default();
            fake.attendance = Some(Err(code));
            let pool = test_pool().await;
            let mut conn = pool.acquire().await.unwrap();
            assert_eq!(sync_attendance(&fake, &mut conn, "T1", &[5], None, "SIS").await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_other_errors_abort() {
        let mut fake = FakeSis::default();
        fake.attendance = Some(Err(401));
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(sync_attendance(&fake, &mut conn, "T1", &[5], None, "SIS").await.is_err());
    }
}
