//! Sync orchestration
//!
//! Phases run strictly in order, each merging inside its own transaction:
//!
//! 1. select students (no writes)
//! 2. merge students
//! 3. grades (per student, falling back to per class)
//! 4. behaviour notes and the cursor
//! 5. attendance
//! 6. reports, read from the store
//!
//! A failing phase aborts the run; phases already committed stay committed.

pub mod attendance;
pub mod behaviour;
pub mod grades;
pub mod homeroom;
pub mod selector;

#[cfg(test)]
pub(crate) mod testing;

pub use attendance::sync_attendance;
pub use behaviour::{sync_behaviour, BehaviourOutcome, BEHAVIOUR_CURSOR_KEY};
pub use grades::{GradeFetcher, GradeMode};
pub use homeroom::resolve_homeroom_id;
pub use selector::{select_students, StudentScope};

use crate::db::upsert_student;
use crate::error::SyncError;
use crate::report::ReportGenerator;
use crate::sis::SisApi;
use chrono::{FixedOffset, Utc};
use rollcall_common::config::{ScopeSetting, Settings};
use rollcall_common::time::local_today;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-run inputs
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub scope: StudentScope,
    pub cohort_year: i32,
    pub term_id: String,
    pub utc_offset: FixedOffset,
    pub per_page: u32,
    pub grade_fetch_concurrency: usize,
    pub default_source: String,
    pub fail_on_empty_roster: bool,
}

impl SyncOptions {
    /// Options for a resolved scope; the term id must be configured
    pub fn from_settings(settings: &Settings, scope: StudentScope) -> Result<Self, SyncError> {
        let term_id = settings.term_id.clone().ok_or_else(|| {
            rollcall_common::Error::Config("Missing sync.term_id / ROLLCALL_TERM_ID".to_string())
        })?;

        Ok(Self {
            scope,
            cohort_year: settings.cohort_year,
            term_id,
            utc_offset: settings.utc_offset,
            per_page: settings.per_page,
            grade_fetch_concurrency: settings.grade_fetch_concurrency,
            default_source: settings.default_source.clone(),
            fail_on_empty_roster: settings.fail_on_empty_roster,
        })
    }
}

/// Resolve the configured scope, looking up the homeroom id by name if needed
pub async fn resolve_scope(api: &dyn SisApi, setting: &ScopeSetting) -> Result<StudentScope, SyncError> {
    match setting {
        ScopeSetting::Advisor(id) => Ok(StudentScope::Advisor(*id)),
        ScopeSetting::Homeroom { id, name } => resolve_homeroom_id(api, *id, name.as_deref())
            .await
            .map(StudentScope::Homeroom),
    }
}

/// Records merged per phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub students: usize,
    pub snapshots: usize,
    pub behaviour: usize,
    pub attendance: usize,
    pub reports: usize,
}

/// Runs one full sync against a store
pub struct SyncOrchestrator {
    pool: SqlitePool,
    api: Arc<dyn SisApi>,
    options: SyncOptions,
    reports: Option<ReportGenerator>,
}

impl SyncOrchestrator {
    pub fn new(pool: SqlitePool, api: Arc<dyn SisApi>, options: SyncOptions) -> Self {
        Self {
            pool,
            api,
            options,
            reports: None,
        }
    }

    /// Regenerate reports at the end of every run
    pub fn with_reports(mut self, reports: ReportGenerator) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Execute every phase; on failure the counts collected so far are logged
    pub async fn run(&self) -> Result<SyncCounts, SyncError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, scope = %self.options.scope);

        async {
            let mut counts = SyncCounts::default();
            info!(
                cohort_year = self.options.cohort_year,
                term_id = %self.options.term_id,
                "Sync started"
            );

            match self.run_phases(&mut counts).await {
                Ok(()) => {
                    info!(
                        students = counts.students,
                        snapshots = counts.snapshots,
                        behaviour = counts.behaviour,
                        attendance = counts.attendance,
                        reports = counts.reports,
                        "Sync complete"
                    );
                    Ok(counts)
                }
                Err(e) => {
                    error!(
                        error = %e,
                        students = counts.students,
                        snapshots = counts.snapshots,
                        behaviour = counts.behaviour,
                        attendance = counts.attendance,
                        reports = counts.reports,
                        "Sync aborted"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_phases(&self, counts: &mut SyncCounts) -> Result<(), SyncError> {
        let api = self.api.as_ref();
        let options = &self.options;

        let students = select_students(api, options.scope, options.cohort_year, options.per_page).await?;

        if students.is_empty() {
            if options.fail_on_empty_roster {
                return Err(SyncError::NoEligibleStudents {
                    scope: options.scope.to_string(),
                    cohort_year: options.cohort_year,
                });
            }
            warn!(
                cohort_year = options.cohort_year,
                "No eligible students, skipping fetch phases"
            );
        } else {
            let seen_at = Utc::now();
            let mut tx = self.pool.begin().await?;
            for student in &students {
                upsert_student(&mut tx, student, seen_at).await?;
            }
            tx.commit().await?;
            counts.students = students.len();
            info!(students = counts.students, "Students merged");

            let mut tx = self.pool.begin().await?;
            let mut grades = GradeFetcher::new(api, &options.term_id, local_today(options.utc_offset))
                .with_per_page(options.per_page)
                .with_concurrency(options.grade_fetch_concurrency);
            counts.snapshots = grades.sync(&mut tx, &students).await?;
            tx.commit().await?;
            info!(snapshots = counts.snapshots, mode = ?grades.mode(), "Grades merged");

            let student_ids: Vec<i64> = students.iter().map(|s| s.student_id).collect();

            let mut tx = self.pool.begin().await?;
            let outcome =
                sync_behaviour(api, &mut tx, &student_ids, options.per_page, &options.default_source).await?;
            tx.commit().await?;
            counts.behaviour = outcome.merged;

            let mut tx = self.pool.begin().await?;
            counts.attendance = sync_attendance(
                api,
                &mut tx,
                &options.term_id,
                &student_ids,
                options.scope.homeroom_id(),
                &options.default_source,
            )
            .await?;
            tx.commit().await?;
        }

        if let Some(reports) = &self.reports {
            counts.reports = reports.generate_all(&self.pool).await?;
        }

        Ok(())
    }
}
