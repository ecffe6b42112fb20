//! Error types for rollcall-sync

use crate::sis::SisError;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that abort a sync run or a CLI command
#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream request failed
    #[error(transparent)]
    Sis(#[from] SisError),

    /// rollcall-common error (config, database)
    #[error("Common error: {0}")]
    Common(#[from] rollcall_common::Error),

    /// Transaction begin/commit failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Scope resolved to nobody for the target cohort
    #[error("No eligible students in {scope} for cohort year {cohort_year}")]
    NoEligibleStudents { scope: String, cohort_year: i32 },

    /// No year group matched the configured homeroom name
    #[error("Homeroom not found: {0}")]
    HomeroomNotFound(String),

    /// Chart or report could not be rendered
    #[error("Render error: {0}")]
    Render(String),
}
