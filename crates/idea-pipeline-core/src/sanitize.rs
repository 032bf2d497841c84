//! Viewer-dependent redaction of idea records.
//!
//! The owner of an idea sees everything. Anyone else, including anonymous
//! visitors, gets the public projection: no owner id, no content
//! fingerprint (which would reveal duplicate submissions), and no raw
//! analysis payload.

use serde::Serialize;

use crate::models::IdeaRecord;

/// Render a Unix timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// An idea as returned by the read endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct IdeaView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idea_hash: Option<String>,
    pub visibility: String,
    pub status: String,
    pub score: Option<i64>,
    pub analysis_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_raw: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// `true` whenever the viewer is not the owner.
    pub owner_anon: bool,
}

/// Project an idea for `viewer_id` (`None` when unauthenticated).
pub fn sanitize_idea(idea: &IdeaRecord, viewer_id: Option<&str>) -> IdeaView {
    let is_owner = viewer_id.is_some_and(|v| v == idea.owner_id);

    IdeaView {
        id: idea.id.clone(),
        owner_id: is_owner.then(|| idea.owner_id.clone()),
        title: idea.title.clone(),
        description: idea.description.clone(),
        idea_hash: is_owner.then(|| idea.idea_hash.clone()),
        visibility: idea.visibility.as_str().to_string(),
        status: idea.status.as_str().to_string(),
        score: idea.score,
        analysis_summary: idea.analysis_summary.clone(),
        analysis_raw: if is_owner {
            idea.analysis_raw.clone()
        } else {
            None
        },
        created_at: format_ts_iso(idea.created_at),
        updated_at: format_ts_iso(idea.updated_at),
        owner_anon: !is_owner,
    }
}

/// A leaderboard or best-of-day row. Owners are never exposed here.
#[derive(Debug, Clone, Serialize)]
pub struct RankedIdea {
    pub id: String,
    pub title: String,
    pub score: Option<i64>,
    pub analysis_summary: Option<String>,
    pub created_at: String,
    pub owner_anon: bool,
}

impl From<&IdeaRecord> for RankedIdea {
    fn from(idea: &IdeaRecord) -> Self {
        Self {
            id: idea.id.clone(),
            title: idea.title.clone(),
            score: idea.score,
            analysis_summary: idea.analysis_summary.clone(),
            created_at: format_ts_iso(idea.created_at),
            owner_anon: true,
        }
    }
}
