//! Student persistence

use super::timestamp_text;
use chrono::{DateTime, Utc};
use rollcall_common::db::Student;
use rollcall_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Insert or refresh a student; name and email are overwritten on every sighting
pub async fn upsert_student(conn: &mut SqliteConnection, student: &Student, seen_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO students (student_id, full_name, email, last_seen_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(student_id) DO UPDATE SET
            full_name = excluded.full_name,
            email = excluded.email,
            last_seen_at = excluded.last_seen_at
        "#,
    )
    .bind(student.student_id)
    .bind(&student.full_name)
    .bind(&student.email)
    .bind(timestamp_text(seen_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Every stored student, ordered by name
pub async fn list_students(pool: &SqlitePool) -> Result<Vec<Student>> {
    let rows = sqlx::query("SELECT student_id, full_name, email FROM students ORDER BY full_name, student_id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| Student {
            student_id: row.get("student_id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn student(id: i64, name: &str, email: Option<&str>) -> Student {
        Student {
            student_id: id,
            full_name: name.to_string(),
            email: email.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_and_overwrites() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_student(&mut conn, &student(1, "Ana Li", None), Utc::now()).await.unwrap();
        upsert_student(&mut conn, &student(1, "Ana Li", None), Utc::now()).await.unwrap();
        upsert_student(&mut conn, &student(1, "Ana Lee", Some("ana@example.org")), Utc::now())
            .await
            .unwrap();
        drop(conn);

        let students = list_students(&pool).await.unwrap();
        assert_eq!(students, vec![student(1, "Ana Lee", Some("ana@example.org"))]);
    }

    #[tokio::test]
    async fn test_last_seen_advances() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let first = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let second = "2024-02-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        upsert_student(&mut conn, &student(7, "Bo", None), first).await.unwrap();
        upsert_student(&mut conn, &student(7, "Bo", None), second).await.unwrap();

        let seen: String = sqlx::query_scalar("SELECT last_seen_at FROM students WHERE student_id = 7")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(seen, "2024-02-01T00:00:00.000Z");
    }
}
