//! Upstream SIS access: HTTP client, envelope extraction, pagination

pub mod client;
pub mod extract;
pub mod fields;
pub mod paginate;
pub mod service;

pub use client::{RetryPolicy, SisClient, SisError};
pub use extract::extract_records;
pub use paginate::{collect_pages, paginate, PageRequest};
pub use service::{SisApi, SisService};
