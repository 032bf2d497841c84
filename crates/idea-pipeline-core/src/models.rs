//! Core data models used throughout Idea Pipeline.
//!
//! These types represent the ideas, cache entries, queue jobs, and analysis
//! reports that flow through the intake-and-scoring pipeline.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a submitted idea.
///
/// ```text
/// queued ──▶ analyzing ──▶ scored
///                     └──▶ failed
/// ```
///
/// `scored` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    Queued,
    Analyzing,
    Scored,
    Failed,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::Queued => "queued",
            IdeaStatus::Analyzing => "analyzing",
            IdeaStatus::Scored => "scored",
            IdeaStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IdeaStatus::Scored | IdeaStatus::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// `queued → failed` is allowed so a record whose job could never be
    /// enqueued does not stay `queued` forever.
    pub fn can_transition_to(&self, next: IdeaStatus) -> bool {
        matches!(
            (self, next),
            (IdeaStatus::Queued, IdeaStatus::Analyzing)
                | (IdeaStatus::Queued, IdeaStatus::Failed)
                | (IdeaStatus::Analyzing, IdeaStatus::Scored)
                | (IdeaStatus::Analyzing, IdeaStatus::Failed)
        )
    }
}

impl fmt::Display for IdeaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdeaStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "queued" => Ok(IdeaStatus::Queued),
            "analyzing" => Ok(IdeaStatus::Analyzing),
            "scored" => Ok(IdeaStatus::Scored),
            "failed" => Ok(IdeaStatus::Failed),
            other => bail!("unknown idea status: '{}'", other),
        }
    }
}

/// Whether an idea appears on public read paths (leaderboard, best of day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => bail!("unknown visibility: '{}'", other),
        }
    }
}

/// A submitted idea and its scoring state.
///
/// `score`, `analysis_summary`, and `analysis_raw` are populated only once
/// the idea is `scored`. A `failed` idea carries the error message in
/// `analysis_summary` and no score.
#[derive(Debug, Clone, PartialEq)]
pub struct IdeaRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    /// Content fingerprint of the normalized title + description.
    pub idea_hash: String,
    pub visibility: Visibility,
    pub status: IdeaStatus,
    pub score: Option<i64>,
    pub analysis_summary: Option<String>,
    pub analysis_raw: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl IdeaRecord {
    /// A fresh record waiting for the worker.
    pub fn queued(
        id: String,
        owner_id: String,
        title: String,
        description: String,
        idea_hash: String,
        now: i64,
    ) -> Self {
        Self {
            id,
            owner_id,
            title,
            description,
            idea_hash,
            visibility: Visibility::Public,
            status: IdeaStatus::Queued,
            score: None,
            analysis_summary: None,
            analysis_raw: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record created directly in the `scored` state from a cache hit.
    pub fn scored_from_cache(
        id: String,
        owner_id: String,
        title: String,
        description: String,
        cached: &CacheEntry,
        now: i64,
    ) -> Self {
        Self {
            id,
            owner_id,
            title,
            description,
            idea_hash: cached.idea_hash.clone(),
            visibility: Visibility::Public,
            status: IdeaStatus::Scored,
            score: Some(cached.score),
            analysis_summary: Some(cached.analysis_summary.clone()),
            analysis_raw: Some(cached.analysis_raw.clone()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A status change applied by the worker.
///
/// Each variant fully determines the analysis columns of the target state,
/// so applying a transition always leaves the record consistent.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Analyzing,
    Scored {
        score: i64,
        summary: String,
        raw: String,
    },
    Failed {
        message: String,
    },
}

impl Transition {
    pub fn target(&self) -> IdeaStatus {
        match self {
            Transition::Analyzing => IdeaStatus::Analyzing,
            Transition::Scored { .. } => IdeaStatus::Scored,
            Transition::Failed { .. } => IdeaStatus::Failed,
        }
    }

    /// Build a `Scored` transition that copies a cached analysis.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        Transition::Scored {
            score: entry.score,
            summary: entry.analysis_summary.clone(),
            raw: entry.analysis_raw.clone(),
        }
    }
}

/// A previously computed analysis, keyed by content fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub idea_hash: String,
    pub analysis_raw: String,
    pub analysis_summary: String,
    pub score: i64,
    pub cached_at: i64,
}

/// Trimmed, lower-cased idea text. This is what gets fingerprinted and
/// what the analysis service sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub title: String,
    pub description: String,
}

impl NormalizedText {
    /// The idea text as sent to the analysis service.
    pub fn prompt_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.description)
    }
}

/// Queue payload produced by the dispatcher for one queued idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaJob {
    #[serde(rename = "ideaId")]
    pub idea_id: String,
    pub idea_hash: String,
    #[serde(rename = "normalizedText")]
    pub normalized_text: NormalizedText,
}

/// The five rubric dimensions returned by the analysis service, each
/// expected in `[0, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricInputs {
    pub market_size: i64,
    pub competition_intensity: i64,
    pub novelty: i64,
    pub execution_complexity: i64,
    pub monetization_clarity: i64,
}

impl RubricInputs {
    pub fn in_range(&self) -> bool {
        [
            self.market_size,
            self.competition_intensity,
            self.novelty,
            self.execution_complexity,
            self.monetization_clarity,
        ]
        .iter()
        .all(|v| (0..=5).contains(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    pub brief_note: String,
}

/// Structured assessment of an idea, as decoded from the analysis service.
///
/// Every field is required; a payload missing any of them does not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub one_sentence: String,
    pub market_signals: Vec<String>,
    pub competitors: Vec<Competitor>,
    pub moat_risks: Vec<String>,
    pub go_to_market: Vec<String>,
    pub monetization: Vec<String>,
    pub feasibility_factors: Vec<String>,
    pub rubric_inputs: RubricInputs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for s in ["queued", "analyzing", "scored", "failed"] {
            let status: IdeaStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!("draft".parse::<IdeaStatus>().is_err());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let all = [
            IdeaStatus::Queued,
            IdeaStatus::Analyzing,
            IdeaStatus::Scored,
            IdeaStatus::Failed,
        ];
        for from in [IdeaStatus::Scored, IdeaStatus::Failed] {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(IdeaStatus::Queued.can_transition_to(IdeaStatus::Analyzing));
        assert!(IdeaStatus::Analyzing.can_transition_to(IdeaStatus::Scored));
        assert!(IdeaStatus::Analyzing.can_transition_to(IdeaStatus::Failed));
        assert!(!IdeaStatus::Queued.can_transition_to(IdeaStatus::Scored));
        assert!(!IdeaStatus::Analyzing.can_transition_to(IdeaStatus::Queued));
    }

    #[test]
    fn test_job_wire_format() {
        let job = IdeaJob {
            idea_id: "abc".to_string(),
            idea_hash: "f00".to_string(),
            normalized_text: NormalizedText {
                title: "t".to_string(),
                description: "d".to_string(),
            },
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["ideaId"], "abc");
        assert_eq!(value["idea_hash"], "f00");
        assert_eq!(value["normalizedText"]["title"], "t");
    }

    #[test]
    fn test_report_requires_rubric_inputs() {
        let json = r#"{
            "one_sentence": "x",
            "market_signals": [],
            "competitors": [],
            "moat_risks": [],
            "go_to_market": [],
            "monetization": [],
            "feasibility_factors": []
        }"#;
        assert!(serde_json::from_str::<AnalysisReport>(json).is_err());
    }

    #[test]
    fn test_rubric_range_check() {
        let mut r = RubricInputs {
            market_size: 5,
            competition_intensity: 0,
            novelty: 3,
            execution_complexity: 2,
            monetization_clarity: 1,
        };
        assert!(r.in_range());
        r.novelty = 7;
        assert!(!r.in_range());
        r.novelty = -1;
        assert!(!r.in_range());
    }
}
