//! SVG grade trend chart

use super::{ChartRenderer, TrendPoint};
use crate::error::SyncError;
use chrono::NaiveDate;
use rollcall_common::db::Student;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 400.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 180.0;
const MARGIN_Y: f64 = 50.0;

const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
];

/// Writes `student_<id>_trend.svg`, one polyline per course
pub struct SvgTrendChart {
    output_dir: PathBuf,
}

impl SvgTrendChart {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn file_name(student_id: i64) -> String {
        format!("student_{}_trend.svg", student_id)
    }
}

impl ChartRenderer for SvgTrendChart {
    fn render_trend(&self, student: &Student, points: &[TrendPoint]) -> Result<PathBuf, SyncError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(Self::file_name(student.student_id));
        std::fs::write(&path, render_svg(&student.full_name, points))?;
        Ok(path)
    }
}

/// Build the SVG document
pub fn render_svg(title: &str, points: &[TrendPoint]) -> String {
    let mut series: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for point in points {
        if let Some(value) = point.value {
            series.entry(point.course.as_str()).or_default().push((point.date, value));
        }
    }

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
        w = WIDTH,
        h = HEIGHT
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="24" text-anchor="middle" font-size="16">Overall trend - {}</text>"#,
        WIDTH / 2.0,
        escape_xml(title)
    );

    if series.is_empty() {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">No numeric grade data available</text>"#,
            WIDTH / 2.0,
            HEIGHT / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    }

    let mut dates: Vec<NaiveDate> = series.values().flatten().map(|(d, _)| *d).collect();
    dates.sort();
    dates.dedup();

    let values = series.values().flatten().map(|(_, v)| *v);
    let (mut min, mut max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if (max - min).abs() < f64::EPSILON {
        min -= 1.0;
        max += 1.0;
    }

    let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = HEIGHT - 2.0 * MARGIN_Y;
    let x_of = |date: NaiveDate| {
        let index = dates.iter().position(|d| *d == date).unwrap_or(0) as f64;
        let span = (dates.len().max(2) - 1) as f64;
        MARGIN_LEFT + plot_width * index / span
    };
    let y_of = |value: f64| MARGIN_Y + plot_height * (1.0 - (value - min) / (max - min));

    // Axes
    let _ = writeln!(
        svg,
        r##"<polyline points="{l},{t} {l},{b} {r},{b}" fill="none" stroke="#333"/>"##,
        l = MARGIN_LEFT,
        t = MARGIN_Y,
        b = HEIGHT - MARGIN_Y,
        r = WIDTH - MARGIN_RIGHT
    );
    for value in [max, min] {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.1}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 6.0,
            y_of(value) + 4.0,
            format_value(value)
        );
    }
    for date in [dates.first(), dates.last()].into_iter().flatten() {
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{}" text-anchor="middle">{}</text>"#,
            x_of(*date),
            HEIGHT - MARGIN_Y + 18.0,
            date
        );
    }

    for (index, (course, mut values)) in series.into_iter().enumerate() {
        values.sort_by_key(|(date, _)| *date);
        let colour = PALETTE[index % PALETTE.len()];
        let coords: Vec<String> = values
            .iter()
            .map(|(date, value)| format!("{:.1},{:.1}", x_of(*date), y_of(*value)))
            .collect();

        let _ = writeln!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            coords.join(" "),
            colour
        );
        for (date, value) in &values {
            let _ = writeln!(
                svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="{}"/>"#,
                x_of(*date),
                y_of(*value),
                colour
            );
        }

        let legend_y = MARGIN_Y + 18.0 * index as f64;
        let _ = writeln!(
            svg,
            r#"<rect x="{}" y="{:.1}" width="10" height="10" fill="{}"/><text x="{}" y="{:.1}">{}</text>"#,
            WIDTH - MARGIN_RIGHT + 16.0,
            legend_y,
            colour,
            WIDTH - MARGIN_RIGHT + 32.0,
            legend_y + 9.0,
            escape_xml(course)
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
