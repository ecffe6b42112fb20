//! # rollcall common library
//!
//! Shared code for the rollcall crates:
//! - Error type
//! - Configuration loading (TOML bootstrap + environment overrides)
//! - Upstream endpoint table
//! - Timestamp parsing helpers
//! - Database initialization and row models

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
