//! rollcall-sync: incremental SIS to SQLite synchronization
//!
//! Pulls students, grades, behaviour notes and attendance from the upstream
//! SIS REST API, merges them idempotently into the local store and renders
//! per-student reports.

pub mod db;
pub mod error;
pub mod report;
pub mod sis;
pub mod sync;

pub use crate::error::{Result, SyncError};
pub use crate::report::ReportGenerator;
pub use crate::sis::{SisApi, SisClient, SisError, SisService};
pub use crate::sync::{SyncCounts, SyncOptions, SyncOrchestrator};
