//! Grade fetch strategy
//!
//! Grades are fetched per student first. Tenants without that endpoint answer
//! 404, which flips the fetcher to the per-class flow for the rest of the run:
//! list classes, fetch each class's term grades and keep only selected students.
//! Snapshots merged before the switch are kept.

use crate::db::upsert_snapshot;
use crate::error::SyncError;
use crate::sis::fields::{int_field, text_field};
use crate::sis::{collect_pages, PageRequest, SisApi};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use rollcall_common::db::{GradeValue, OverallSnapshot, Student};
use serde_json::Value;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use tracing::{debug, info};

const UNKNOWN_COURSE: &str = "Unknown Course";

/// Which endpoint family supplies grades
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeMode {
    PerStudent,
    PerClass,
}

/// Map an upstream `overall` value onto the snapshot columns
///
/// Numbers are numeric grades; any other non-null value is kept as text
/// (strings verbatim, anything else JSON-encoded).
pub fn normalize_overall(overall: Option<&Value>) -> Option<GradeValue> {
    match overall? {
        Value::Null => None,
        Value::Number(n) => n.as_f64().map(GradeValue::Numeric),
        Value::String(s) => Some(GradeValue::Text(s.clone())),
        other => Some(GradeValue::Text(other.to_string())),
    }
}

/// Fetches term grades and merges them as today's snapshots
pub struct GradeFetcher<'a> {
    api: &'a dyn SisApi,
    term_id: &'a str,
    snapshot_date: NaiveDate,
    per_page: u32,
    concurrency: usize,
    mode: GradeMode,
}

impl<'a> GradeFetcher<'a> {
    pub fn new(api: &'a dyn SisApi, term_id: &'a str, snapshot_date: NaiveDate) -> Self {
        Self {
            api,
            term_id,
            snapshot_date,
            per_page: 100,
            concurrency: 1,
            mode: GradeMode::PerStudent,
        }
    }

    /// Page size for the class listing
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Class grade requests kept in flight at once (per-class mode)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn mode(&self) -> GradeMode {
        self.mode
    }

    /// Fetch and merge grades for `students`; returns the number of snapshots merged
    pub async fn sync(&mut self, conn: &mut SqliteConnection, students: &[Student]) -> Result<usize, SyncError> {
        let mut merged = 0;

        if self.mode == GradeMode::PerStudent {
            merged += self.sync_per_student(conn, students).await?;
        }
        if self.mode == GradeMode::PerClass {
            merged += self.sync_per_class(conn, students).await?;
        }

        Ok(merged)
    }

    async fn sync_per_student(&mut self, conn: &mut SqliteConnection, students: &[Student]) -> Result<usize, SyncError> {
        let mut merged = 0;

        for student in students {
            let rows = match self.api.student_term_grades(student.student_id, self.term_id).await {
                Ok(rows) => rows,
                Err(e) if e.is_not_found() => {
                    info!(
                        student_id = student.student_id,
                        merged_before_switch = merged,
                        "Student term grades endpoint returned 404, falling back to class term grades"
                    );
                    self.mode = GradeMode::PerClass;
                    return Ok(merged);
                }
                Err(e) => return Err(e.into()),
            };

            for row in &rows {
                let Some(course_id) = int_field(row, &["class_id", "course_id"]) else {
                    debug!(student_id = student.student_id, row = %row, "Dropping grade row without course id");
                    continue;
                };
                let snapshot = OverallSnapshot {
                    snapshot_date: self.snapshot_date,
                    student_id: student.student_id,
                    course_id,
                    course_name: text_field(row, &["class_name", "course_name"])
                        .unwrap_or_else(|| UNKNOWN_COURSE.to_string()),
                    overall: normalize_overall(row.get("overall")),
                };
                upsert_snapshot(conn, &snapshot).await?;
                merged += 1;
            }
        }

        Ok(merged)
    }

    async fn sync_per_class(&self, conn: &mut SqliteConnection, students: &[Student]) -> Result<usize, SyncError> {
        let api = self.api;
        let term_id = self.term_id;
        let per_page = self.per_page;

        let classes = collect_pages(PageRequest::new(per_page), move |page| api.classes(page, per_page)).await?;
        let class_list: Vec<(i64, Option<String>)> = classes
            .iter()
            .filter_map(|class| {
                let id = int_field(class, &["id"]).filter(|id| *id != 0)?;
                Some((id, text_field(class, &["name"])))
            })
            .collect();

        let selected: HashSet<i64> = students.iter().map(|s| s.student_id).collect();
        info!(
            classes = class_list.len(),
            concurrency = self.concurrency,
            "Fetching class term grades"
        );

        let fetches = stream::iter(class_list.into_iter().map(move |(class_id, class_name)| async move {
            api.class_term_grades(class_id, term_id)
                .await
                .map(|rows| (class_id, class_name, rows))
        }))
        .buffered(self.concurrency);
        futures::pin_mut!(fetches);

        let mut merged = 0;
        while let Some(result) = fetches.next().await {
            let (class_id, class_name, rows) = result?;

            for row in &rows {
                let Some(student_id) = int_field(row, &["student_id"]).filter(|id| selected.contains(id)) else {
                    continue;
                };
                let course_name = text_field(row, &["class_name"])
                    .or_else(|| class_name.clone())
                    .or_else(|| text_field(row, &["course_name"]))
                    .unwrap_or_else(|| UNKNOWN_COURSE.to_string());

                let snapshot = OverallSnapshot {
                    snapshot_date: self.snapshot_date,
                    student_id,
                    course_id: int_field(row, &["class_id", "course_id"]).unwrap_or(class_id),
                    course_name,
                    overall: normalize_overall(row.get("overall")),
                };
                upsert_snapshot(conn, &snapshot).await?;
                merged += 1;
            }
        }

        Ok(merged)
    }
}
