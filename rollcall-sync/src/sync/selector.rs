//! Student selection
//!
//! Fetches the configured scope, keeps only active students of the target
//! cohort and normalizes them into [`Student`] records.

use crate::sis::fields::{flag, has_value, int_field, text_field};
use crate::sis::{collect_pages, PageRequest, SisApi, SisError};
use rollcall_common::db::Student;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// Where the roster comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentScope {
    /// Students filtered by homeroom advisor (paginated)
    Advisor(i64),
    /// Students of one year group (single call)
    Homeroom(i64),
}

impl StudentScope {
    pub fn homeroom_id(&self) -> Option<i64> {
        match self {
            StudentScope::Homeroom(id) => Some(*id),
            StudentScope::Advisor(_) => None,
        }
    }
}

impl fmt::Display for StudentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentScope::Advisor(id) => write!(f, "advisor {}", id),
            StudentScope::Homeroom(id) => write!(f, "homeroom {}", id),
        }
    }
}

/// True for active students of the target cohort
///
/// Records without a parseable `graduating_year` are rejected.
pub fn is_eligible(record: &Value, target_cohort_year: i32) -> bool {
    let cohort_matches = int_field(record, &["graduating_year"]) == Some(i64::from(target_cohort_year));
    cohort_matches && !flag(record, "archived") && !has_value(record, &["graduated_on", "graduation_date"])
}

/// Map a raw record to a [`Student`]; `None` when it carries no usable id
pub fn normalize_student(record: &Value) -> Option<Student> {
    let student_id = int_field(record, &["id", "student_id"])?;

    let full_name = text_field(record, &["full_name"])
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| {
            let joined = [text_field(record, &["first_name"]), text_field(record, &["last_name"])]
                .into_iter()
                .flatten()
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        })
        .unwrap_or_else(|| format!("Student {}", student_id));

    Some(Student {
        student_id,
        full_name,
        email: text_field(record, &["email"]),
    })
}

/// Apply the eligibility filter, normalize, and drop repeat ids (first sighting wins)
pub fn filter_students(records: &[Value], target_cohort_year: i32) -> Vec<Student> {
    let mut seen = HashSet::new();
    let mut students = Vec::new();

    for record in records {
        if !is_eligible(record, target_cohort_year) {
            continue;
        }
        let Some(student) = normalize_student(record) else {
            debug!(record = %record, "Dropping student record without id");
            continue;
        };
        if seen.insert(student.student_id) {
            students.push(student);
        }
    }

    students
}

/// Fetch the scope and return its eligible students in order of first sighting
pub async fn select_students(
    api: &dyn SisApi,
    scope: StudentScope,
    target_cohort_year: i32,
    per_page: u32,
) -> Result<Vec<Student>, SisError> {
    let records = match scope {
        StudentScope::Advisor(advisor_id) => {
            collect_pages(PageRequest::new(per_page), move |page| {
                api.advisor_students(advisor_id, page, per_page)
            })
            .await?
        }
        StudentScope::Homeroom(homeroom_id) => api.year_group_students(homeroom_id).await?,
    };

    let students = filter_students(&records, target_cohort_year);
    info!(
        scope = %scope,
        fetched = records.len(),
        eligible = students.len(),
        cohort_year = target_cohort_year,
        "Selected students"
    );

    Ok(students)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeSis;
    use serde_json::json;

    #[test]
    fn test_cohort_filter_example() {
        let records = vec![
            json!({"id": 1, "graduating_year": 2028}),
            json!({"id": 2, "graduating_year": "2028", "archived": false}),
            json!({"id": 3, "graduating_year": 2027}),
        ];
        let ids: Vec<i64> = filter_students(&records, 2028).iter().map(|s| s.student_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_archived_and_graduated_skipped() {
        let records = vec![
            json!({"id": 1, "graduating_year": 2028, "archived": true}),
            json!({"id": 2, "graduating_year": 2028, "graduated_on": "2024-06-01"}),
            json!({"id": 3, "graduating_year": 2028, "graduation_date": "2024-06-01"}),
            json!({"id": 4, "graduating_year": 2028, "graduated_on": ""}),
            json!({"id": 5, "graduating_year": 2028, "graduated_on": null}),
            json!({"id": 6}),
            json!({"id": 7, "graduating_year": "next year"}),
        ];
        let ids: Vec<i64> = filter_students(&records, 2028).iter().map(|s| s.student_id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn test_dedup_keeps_first_sighting() {
        let records = vec![
            json!({"id": 5, "graduating_year": 2028, "full_name": "First"}),
            json!({"id": 6, "graduating_year": 2028}),
            json!({"student_id": "5", "graduating_year": 2028, "full_name": "Second"}),
        ];
        let students = filter_students(&records, 2028);
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].full_name, "First");
        assert_eq!(students[1].student_id, 6);
    }

    #[test]
    fn test_name_fallbacks() {
        let joined = normalize_student(&json!({"id": 1, "first_name": " Ana ", "last_name": "Li"})).unwrap();
        assert_eq!(joined.full_name, "Ana Li");

        let first_only = normalize_student(&json!({"id": 2, "full_name": "", "first_name": "Bo"})).unwrap();
        assert_eq!(first_only.full_name, "Bo");

        let placeholder = normalize_student(&json!({"id": 3, "email": "c@example.org"})).unwrap();
        assert_eq!(placeholder.full_name, "Student 3");
        assert_eq!(placeholder.email.as_deref(), Some("c@example.org"));

        assert!(normalize_student(&json!({"full_name": "No Id"})).is_none());
    }

    #[test]
    fn test_records_without_id_dropped() {
        let records = vec![
            json!({"graduating_year": 2028, "full_name": "Ghost"}),
            json!({"id": "abc", "graduating_year": 2028}),
            json!({"id": 9, "graduating_year": 2028}),
        ];
        let ids: Vec<i64> = filter_students(&records, 2028).iter().map(|s| s.student_id).collect();
        assert_eq!(ids, vec![9]);
    }

    #[tokio::test]
    async fn test_advisor_pages_deduplicated_across_pages() {
        let mut fake = FakeSis::default();
        fake.advisor_pages = vec![
            vec![
                json!({"id": 1, "graduating_year": 2028, "full_name": "Ana Li"}),
                json!({"id": 2, "graduating_year": 2028, "full_name": "Bo Chen"}),
            ],
            vec![json!({"id": 2, "graduating_year": 2028, "full_name": "Bo Renamed"})],
            vec![json!({"id": 3, "graduating_year": 2028})],
        ];

        let students = select_students(&fake, StudentScope::Advisor(4), 2028, 2).await.unwrap();

        assert_eq!(
            fake.calls(),
            vec!["advisor_students:4:1".to_string(), "advisor_students:4:2".to_string()]
        );
        let ids: Vec<i64> = students.iter().map(|s| s.student_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(students[1].full_name, "Bo Chen");
    }
}
