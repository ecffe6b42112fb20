//! Incremental behaviour note sync
//!
//! Uses a high-water mark: the largest `updated_at` seen is stored under
//! [`BEHAVIOUR_CURSOR_KEY`] and sent back as `modified_since` on the next run.
//! The cursor only ever moves forward.

use crate::db::{get_sync_state, set_sync_state, upsert_observation};
use crate::error::SyncError;
use crate::sis::fields::{int_field, text_field};
use crate::sis::{paginate, PageRequest, SisApi};
use chrono::{DateTime, FixedOffset, Utc};
use futures::TryStreamExt;
use rollcall_common::db::{Observation, ObservationKind};
use rollcall_common::time::parse_timestamp;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{debug, info};

pub const BEHAVIOUR_CURSOR_KEY: &str = "last_behaviour_sync";

/// Result of one behaviour pass
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourOutcome {
    pub merged: usize,
    /// Cursor in effect after the pass (stored value if it did not advance)
    pub cursor: Option<String>,
    pub cursor_advanced: bool,
}

/// Build an observation from a behaviour note; `None` without id or student id
pub fn behaviour_observation(note: &Value, default_source: &str) -> Option<Observation> {
    let external_id = text_field(note, &["id"])?;
    let student_id = int_field(note, &["student_id"])?;

    Some(Observation {
        kind: ObservationKind::Behaviour,
        external_id,
        student_id,
        date_time: text_field(note, &["incident_time", "created_at"])
            .as_deref()
            .and_then(parse_timestamp),
        category: text_field(note, &["behavior_type"]).unwrap_or_else(|| "behaviour".to_string()),
        content: text_field(note, &["notes"]).unwrap_or_default(),
        source: text_field(note, &["reported_by"]).unwrap_or_else(|| default_source.to_string()),
    })
}

/// Fetch notes modified since the stored cursor, merge them, and advance the cursor
pub async fn sync_behaviour(
    api: &dyn SisApi,
    conn: &mut SqliteConnection,
    student_ids: &[i64],
    per_page: u32,
    default_source: &str,
) -> Result<BehaviourOutcome, SyncError> {
    let stored = get_sync_state(conn, BEHAVIOUR_CURSOR_KEY).await?;
    let stored_cursor = stored.as_deref().and_then(parse_timestamp);
    info!(
        modified_since = stored.as_deref().unwrap_or("<full history>"),
        students = student_ids.len(),
        "Syncing behaviour notes"
    );

    let now = Utc::now();
    let mut merged = 0;
    let mut max_updated: Option<DateTime<FixedOffset>> = None;

    {
        let since = stored.as_deref();
        let notes = paginate(PageRequest::new(per_page), move |page| {
            api.behaviour_notes(student_ids, since, page, per_page)
        });
        futures::pin_mut!(notes);

        while let Some(note) = notes.try_next().await? {
            let Some(observation) = behaviour_observation(&note, default_source) else {
                debug!(note = %note, "Dropping behaviour note without id or student_id");
                continue;
            };

            if let Some(updated) = text_field(&note, &["updated_at"]).as_deref().and_then(parse_timestamp) {
                if max_updated.map_or(true, |max| updated > max) {
                    max_updated = Some(updated);
                }
            }

            upsert_observation(conn, &observation, now).await?;
            merged += 1;
        }
    }

    let advanced = match (max_updated, stored_cursor) {
        (Some(max), Some(current)) => max > current,
        (Some(_), None) => true,
        (None, _) => false,
    };

    let cursor = match max_updated {
        Some(max) if advanced => {
            let value = max.to_rfc3339();
            set_sync_state(conn, BEHAVIOUR_CURSOR_KEY, &value, now).await?;
            Some(value)
        }
        _ => stored,
    };

    info!(merged, cursor = ?cursor, advanced, "Behaviour notes synced");

    Ok(BehaviourOutcome {
        merged,
        cursor,
        cursor_advanced: advanced,
    })
}
