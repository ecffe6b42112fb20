//! HTML report page

use super::chart::escape_xml as escape;
use super::ReportRenderer;
use crate::error::SyncError;
use chrono::{FixedOffset, Utc};
use rollcall_common::db::{Observation, Student};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Writes `student_<id>.html` next to the chart
pub struct HtmlReportWriter {
    output_dir: PathBuf,
    utc_offset: FixedOffset,
}

impl HtmlReportWriter {
    /// Observation times are shown in `utc_offset`
    pub fn new(output_dir: &Path, utc_offset: FixedOffset) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            utc_offset,
        }
    }

    fn observation_table(&self, title: &str, observations: &[Observation]) -> String {
        let mut html = String::new();
        let _ = writeln!(html, "<h2>{}</h2>", escape(title));

        if observations.is_empty() {
            html.push_str("<p class=\"empty\">No records.</p>\n");
            return html;
        }

        html.push_str("<table>\n<tr><th>Date</th><th>Category</th><th>Content</th><th>Source</th></tr>\n");
        for observation in observations {
            let when = observation
                .date_time
                .map(|dt| dt.with_timezone(&self.utc_offset).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&when),
                escape(&observation.category),
                escape(&observation.content),
                escape(&observation.source)
            );
        }
        html.push_str("</table>\n");
        html
    }
}

impl ReportRenderer for HtmlReportWriter {
    fn render(
        &self,
        student: &Student,
        chart: &Path,
        behaviour: &[Observation],
        attendance: &[Observation],
    ) -> Result<PathBuf, SyncError> {
        // Pages sit beside their charts, so link by file name
        let chart_src = chart
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| SyncError::Render(format!("chart path has no file name: {}", chart.display())))?;

        let name = escape(&student.full_name);
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        let _ = writeln!(html, "<title>{} - Student Report</title>", name);
        html.push_str(
            "<style>body{font-family:sans-serif;margin:2em}table{border-collapse:collapse}\
             td,th{border:1px solid #ccc;padding:4px 8px;text-align:left}</style>\n</head>\n<body>\n",
        );
        let _ = writeln!(html, "<h1>{}</h1>", name);
        let _ = writeln!(
            html,
            "<p>Generated at {}</p>",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        );
        let _ = writeln!(html, "<img src=\"{}\" alt=\"Overall trend\">", escape(&chart_src));
        html.push_str(&self.observation_table("Recent behaviour", behaviour));
        html.push_str(&self.observation_table("Recent attendance", attendance));
        html.push_str("</body>\n</html>\n");

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("student_{}.html", student.student_id));
        std::fs::write(&path, html)?;
        Ok(path)
    }
}
