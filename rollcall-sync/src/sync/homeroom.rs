//! Homeroom (year group) id resolution by name

use crate::error::SyncError;
use crate::sis::fields::{int_field, text_field};
use crate::sis::{collect_pages, PageRequest, SisApi};
use serde_json::Value;
use tracing::{info, warn};

const YEAR_GROUP_PAGE_SIZE: u32 = 200;

/// A year group that matched the requested name
#[derive(Debug, Clone, PartialEq)]
pub struct HomeroomCandidate {
    pub id: i64,
    pub name: String,
    /// Normalized Levenshtein similarity to the requested name (1.0 = identical)
    pub similarity: f64,
}

/// Rank year groups against `name`
///
/// A unique exact (trimmed) match is returned alone. Otherwise every exact or
/// case-insensitive substring match is returned, best similarity first.
pub fn rank_homerooms(name: &str, year_groups: &[Value]) -> Vec<HomeroomCandidate> {
    let wanted = name.trim();
    let wanted_lower = wanted.to_lowercase();

    let groups: Vec<(i64, String)> = year_groups
        .iter()
        .filter_map(|group| {
            let id = int_field(group, &["id"])?;
            let group_name = text_field(group, &["name"]).unwrap_or_default().trim().to_string();
            Some((id, group_name))
        })
        .collect();

    let score = |group_name: &str| strsim::normalized_levenshtein(&wanted_lower, &group_name.to_lowercase());

    let exact: Vec<&(i64, String)> = groups.iter().filter(|(_, n)| n == wanted).collect();
    if let [(id, group_name)] = exact.as_slice() {
        return vec![HomeroomCandidate {
            id: *id,
            name: group_name.clone(),
            similarity: 1.0,
        }];
    }

    let mut candidates: Vec<HomeroomCandidate> = groups
        .iter()
        .filter(|(_, n)| n == wanted || n.to_lowercase().contains(&wanted_lower))
        .map(|(id, group_name)| HomeroomCandidate {
            id: *id,
            name: group_name.clone(),
            similarity: score(group_name),
        })
        .collect();

    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    candidates
}

/// Resolve the homeroom id: an explicit id wins, otherwise match by name
pub async fn resolve_homeroom_id(
    api: &dyn SisApi,
    homeroom_id: Option<i64>,
    homeroom_name: Option<&str>,
) -> Result<i64, SyncError> {
    if let Some(id) = homeroom_id {
        return Ok(id);
    }
    let name = homeroom_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| SyncError::HomeroomNotFound("no homeroom id or name configured".to_string()))?;

    let year_groups = collect_pages(PageRequest::new(YEAR_GROUP_PAGE_SIZE), |page| {
        api.year_groups(page, YEAR_GROUP_PAGE_SIZE)
    })
    .await?;
    if year_groups.is_empty() {
        return Err(SyncError::HomeroomNotFound(format!(
            "no year groups returned while looking for '{}'; set sync.homeroom_id explicitly",
            name
        )));
    }

    let candidates = rank_homerooms(name, &year_groups);
    let Some(best) = candidates.first() else {
        return Err(SyncError::HomeroomNotFound(format!(
            "'{}' (set sync.homeroom_id or adjust sync.homeroom_name)",
            name
        )));
    };

    if candidates.len() > 1 {
        let preview: Vec<String> = candidates
            .iter()
            .take(5)
            .map(|c| format!("{}({})", c.name, c.id))
            .collect();
        warn!(
            requested = name,
            candidates = %preview.join(", "),
            "Multiple homeroom candidates found, selected best match"
        );
    }

    info!(homeroom_id = best.id, homeroom = %best.name, "Resolved homeroom");
    Ok(best.id)
}
