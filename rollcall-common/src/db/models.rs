//! Database models

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A student as stored locally; identity is the upstream id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub student_id: i64,
    pub full_name: String,
    pub email: Option<String>,
}

/// Course grade as reported upstream: numeric or a free-form label, never both
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GradeValue {
    Numeric(f64),
    Text(String),
}

/// One day's overall grade for one student in one course
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallSnapshot {
    pub snapshot_date: NaiveDate,
    pub student_id: i64,
    pub course_id: i64,
    pub course_name: String,
    pub overall: Option<GradeValue>,
}

impl OverallSnapshot {
    pub fn overall_value(&self) -> Option<f64> {
        match self.overall {
            Some(GradeValue::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    pub fn overall_text(&self) -> Option<&str> {
        match &self.overall {
            Some(GradeValue::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }
}

/// Observation stream; external ids are unique per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObservationKind {
    Behaviour,
    Attendance,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Behaviour => "behaviour",
            ObservationKind::Attendance => "attendance",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "behaviour" => Ok(ObservationKind::Behaviour),
            "attendance" => Ok(ObservationKind::Attendance),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown observation kind: {}",
                other
            ))),
        }
    }
}

/// A behaviour or attendance event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub kind: ObservationKind,
    pub external_id: String,
    pub student_id: i64,
    /// Absent when upstream omits a timestamp
    pub date_time: Option<DateTime<FixedOffset>>,
    pub category: String,
    pub content: String,
    pub source: String,
}
