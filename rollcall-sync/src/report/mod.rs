//! Per-student reports
//!
//! Reads the local store only: one trend chart and one HTML page per stored
//! student. Rendering sits behind [`ChartRenderer`] and [`ReportRenderer`] so
//! the output format can change without touching the sync.

pub mod chart;
pub mod html;

pub use chart::SvgTrendChart;
pub use html::HtmlReportWriter;

use crate::db::{list_students, recent_observations, snapshots_for_student};
use crate::error::SyncError;
use chrono::{FixedOffset, NaiveDate};
use rollcall_common::db::{Observation, ObservationKind, Student};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Observations of each kind shown per report
pub const RECENT_OBSERVATIONS: u32 = 20;

/// One point of a course's grade trend
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub course: String,
    /// `None` for text grades; those are not plotted
    pub value: Option<f64>,
}

/// Renders a student's grade trend; returns the written file
pub trait ChartRenderer: Send + Sync {
    fn render_trend(&self, student: &Student, points: &[TrendPoint]) -> Result<PathBuf, SyncError>;
}

/// Renders a student's report page; returns the written file
pub trait ReportRenderer: Send + Sync {
    fn render(
        &self,
        student: &Student,
        chart: &Path,
        behaviour: &[Observation],
        attendance: &[Observation],
    ) -> Result<PathBuf, SyncError>;
}

/// Drives chart and page rendering for every stored student
pub struct ReportGenerator {
    chart: Box<dyn ChartRenderer>,
    page: Box<dyn ReportRenderer>,
}

impl ReportGenerator {
    /// SVG charts and HTML pages under `output_dir`
    pub fn new(output_dir: &Path, utc_offset: FixedOffset) -> Self {
        Self::with_renderers(
            Box::new(SvgTrendChart::new(output_dir)),
            Box::new(HtmlReportWriter::new(output_dir, utc_offset)),
        )
    }

    pub fn with_renderers(chart: Box<dyn ChartRenderer>, page: Box<dyn ReportRenderer>) -> Self {
        Self { chart, page }
    }

    /// Render every stored student; returns the number of pages written
    pub async fn generate_all(&self, pool: &SqlitePool) -> Result<usize, SyncError> {
        let students = list_students(pool).await?;
        let mut written = 0;

        for student in &students {
            let points: Vec<TrendPoint> = snapshots_for_student(pool, student.student_id)
                .await?
                .into_iter()
                .map(|s| TrendPoint {
                    date: s.snapshot_date,
                    value: s.overall_value(),
                    course: s.course_name,
                })
                .collect();
            let behaviour =
                recent_observations(pool, student.student_id, ObservationKind::Behaviour, RECENT_OBSERVATIONS).await?;
            let attendance =
                recent_observations(pool, student.student_id, ObservationKind::Attendance, RECENT_OBSERVATIONS).await?;

            let chart = self.chart.render_trend(student, &points)?;
            let page = self.page.render(student, &chart, &behaviour, &attendance)?;
            debug!(student_id = student.student_id, page = %page.display(), "Report written");
            written += 1;
        }

        info!(reports = written, "Reports generated");
        Ok(written)
    }
}
