//! Daily overall-grade snapshots

use chrono::NaiveDate;
use rollcall_common::db::{GradeValue, OverallSnapshot};
use rollcall_common::{Error, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Insert or overwrite the snapshot for (date, student, course)
pub async fn upsert_snapshot(conn: &mut SqliteConnection, snapshot: &OverallSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO overall_snapshots (
            snapshot_date, student_id, course_id, course_name, overall_value, overall_text
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(snapshot_date, student_id, course_id) DO UPDATE SET
            course_name = excluded.course_name,
            overall_value = excluded.overall_value,
            overall_text = excluded.overall_text
        "#,
    )
    .bind(snapshot.snapshot_date.format(DATE_FORMAT).to_string())
    .bind(snapshot.student_id)
    .bind(snapshot.course_id)
    .bind(&snapshot.course_name)
    .bind(snapshot.overall_value())
    .bind(snapshot.overall_text())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// All snapshots of one student, oldest first
pub async fn snapshots_for_student(pool: &SqlitePool, student_id: i64) -> Result<Vec<OverallSnapshot>> {
    let rows = sqlx::query(
        r#"
        SELECT snapshot_date, student_id, course_id, course_name, overall_value, overall_text
        FROM overall_snapshots
        WHERE student_id = ?
        ORDER BY snapshot_date, course_name, course_id
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let date: String = row.get("snapshot_date");
            let snapshot_date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
                .map_err(|e| Error::Internal(format!("Bad snapshot_date '{}': {}", date, e)))?;

            let value: Option<f64> = row.get("overall_value");
            let text: Option<String> = row.get("overall_text");
            let overall = match (value, text) {
                (Some(v), _) => Some(GradeValue::Numeric(v)),
                (None, Some(t)) => Some(GradeValue::Text(t)),
                (None, None) => None,
            };

            Ok(OverallSnapshot {
                snapshot_date,
                student_id: row.get("student_id"),
                course_id: row.get("course_id"),
                course_name: row.get("course_name"),
                overall,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn snapshot(date: (i32, u32, u32), course_id: i64, overall: Option<GradeValue>) -> OverallSnapshot {
        OverallSnapshot {
            snapshot_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            student_id: 1,
            course_id,
            course_name: "Biology".to_string(),
            overall,
        }
    }

    #[tokio::test]
    async fn test_same_day_overwrites() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_snapshot(&mut conn, &snapshot((2024, 9, 1), 10, Some(GradeValue::Numeric(5.0))))
            .await
            .unwrap();
        upsert_snapshot(&mut conn, &snapshot((2024, 9, 1), 10, Some(GradeValue::Text("A".into()))))
            .await
            .unwrap();
        drop(conn);

        let stored = snapshots_for_student(&pool, 1).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].overall, Some(GradeValue::Text("A".to_string())));
    }

    #[tokio::test]
    async fn test_earlier_dates_untouched() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_snapshot(&mut conn, &snapshot((2024, 9, 1), 10, Some(GradeValue::Numeric(5.0))))
            .await
            .unwrap();
        upsert_snapshot(&mut conn, &snapshot((2024, 9, 2), 10, Some(GradeValue::Numeric(6.0))))
            .await
            .unwrap();
        upsert_snapshot(&mut conn, &snapshot((2024, 9, 2), 11, None)).await.unwrap();
        drop(conn);

        let stored = snapshots_for_student(&pool, 1).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].overall_value(), Some(5.0));
        assert_eq!(stored[0].snapshot_date, NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        assert_eq!(stored[2].overall, None);
    }
}
