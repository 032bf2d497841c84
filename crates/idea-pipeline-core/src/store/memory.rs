//! In-memory [`Store`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Guarded
//! transitions check and write under a single write lock, so they behave
//! like the SQLite `UPDATE ... WHERE status = ?`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{CacheEntry, IdeaRecord, IdeaStatus, Transition, Visibility};

use super::Store;

struct Submission {
    owner_id: String,
    created_at: i64,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    ideas: RwLock<HashMap<String, IdeaRecord>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    submissions: RwLock<Vec<Submission>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            ideas: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            submissions: RwLock::new(Vec::new()),
        }
    }

    /// Number of rows in the submission ledger, for assertions.
    pub fn submission_count(&self) -> usize {
        self.submissions.read().unwrap().len()
    }

    /// Number of ideas stored, for assertions.
    pub fn idea_count(&self) -> usize {
        self.ideas.read().unwrap().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(idea: &mut IdeaRecord, transition: &Transition, now: i64) {
    idea.status = transition.target();
    idea.updated_at = now;
    match transition {
        Transition::Analyzing => {}
        Transition::Scored {
            score,
            summary,
            raw,
        } => {
            idea.score = Some(*score);
            idea.analysis_summary = Some(summary.clone());
            idea.analysis_raw = Some(raw.clone());
        }
        Transition::Failed { message } => {
            idea.score = None;
            idea.analysis_summary = Some(message.clone());
            idea.analysis_raw = None;
        }
    }
}

fn is_ranked(idea: &IdeaRecord) -> bool {
    idea.score.is_some() && idea.visibility == Visibility::Public
}

fn rank_order(a: &IdeaRecord, b: &IdeaRecord) -> std::cmp::Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_idea(&self, idea: &IdeaRecord) -> Result<()> {
        let mut ideas = self.ideas.write().unwrap();
        if ideas.contains_key(&idea.id) {
            bail!("idea already exists: {}", idea.id);
        }
        ideas.insert(idea.id.clone(), idea.clone());
        Ok(())
    }

    async fn get_idea(&self, id: &str) -> Result<Option<IdeaRecord>> {
        Ok(self.ideas.read().unwrap().get(id).cloned())
    }

    async fn transition_idea(
        &self,
        id: &str,
        from: IdeaStatus,
        transition: &Transition,
        now: i64,
    ) -> Result<bool> {
        let mut ideas = self.ideas.write().unwrap();
        match ideas.get_mut(id) {
            Some(idea) if idea.status == from => {
                apply(idea, transition, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_cache_entry(
        &self,
        idea_hash: &str,
        fresh_since: i64,
    ) -> Result<Option<CacheEntry>> {
        Ok(self
            .cache
            .read()
            .unwrap()
            .get(idea_hash)
            .filter(|e| e.cached_at >= fresh_since)
            .cloned())
    }

    async fn upsert_cache_entry(&self, entry: &CacheEntry) -> Result<()> {
        self.cache
            .write()
            .unwrap()
            .insert(entry.idea_hash.clone(), entry.clone());
        Ok(())
    }

    async fn count_submissions_since(&self, owner_id: &str, since: i64) -> Result<i64> {
        let subs = self.submissions.read().unwrap();
        Ok(subs
            .iter()
            .filter(|s| s.owner_id == owner_id && s.created_at >= since)
            .count() as i64)
    }

    async fn record_submission(&self, owner_id: &str, at: i64) -> Result<()> {
        self.submissions.write().unwrap().push(Submission {
            owner_id: owner_id.to_string(),
            created_at: at,
        });
        Ok(())
    }

    async fn list_ideas_by_owner(&self, owner_id: &str) -> Result<Vec<IdeaRecord>> {
        let ideas = self.ideas.read().unwrap();
        let mut owned: Vec<IdeaRecord> = ideas
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn top_scored_ideas(&self, limit: i64) -> Result<Vec<IdeaRecord>> {
        let ideas = self.ideas.read().unwrap();
        let mut ranked: Vec<IdeaRecord> = ideas.values().filter(|i| is_ranked(i)).cloned().collect();
        ranked.sort_by(rank_order);
        ranked.truncate(limit.max(0) as usize);
        Ok(ranked)
    }

    async fn best_scored_between(&self, start: i64, end: i64) -> Result<Option<IdeaRecord>> {
        let ideas = self.ideas.read().unwrap();
        Ok(ideas
            .values()
            .filter(|i| is_ranked(i) && i.created_at >= start && i.created_at <= end)
            .min_by(|a, b| rank_order(a, b))
            .cloned())
    }
}
