//! Storage abstraction for Idea Pipeline.
//!
//! The [`Store`] trait covers the three logical tables the pipeline owns
//! (`ideas`, `idea_cache`, `submissions`) plus the read queries behind the
//! public endpoints. Backends: SQLite in the application crate, and
//! [`memory::InMemoryStore`] for tests.
//!
//! Every mutation is a single keyed write. Status changes go through
//! [`Store::transition_idea`], which only applies when the row is still in
//! the expected state; that guard is what makes duplicate or stale queue
//! deliveries harmless.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CacheEntry, IdeaRecord, IdeaStatus, Transition};

/// Abstract storage backend for the idea pipeline.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_idea`](Store::insert_idea) | Create a new idea record |
/// | [`get_idea`](Store::get_idea) | Load an idea by id |
/// | [`transition_idea`](Store::transition_idea) | Guarded status change |
/// | [`get_cache_entry`](Store::get_cache_entry) | Cache read with freshness cutoff |
/// | [`upsert_cache_entry`](Store::upsert_cache_entry) | Insert or overwrite a cache entry |
/// | [`count_submissions_since`](Store::count_submissions_since) | Rate-limit window count |
/// | [`record_submission`](Store::record_submission) | Append to the submission ledger |
/// | [`list_ideas_by_owner`](Store::list_ideas_by_owner) | Profile listing |
/// | [`top_scored_ideas`](Store::top_scored_ideas) | Leaderboard |
/// | [`best_scored_between`](Store::best_scored_between) | Best of day |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new idea. Fails if the id already exists.
    async fn insert_idea(&self, idea: &IdeaRecord) -> Result<()>;

    async fn get_idea(&self, id: &str) -> Result<Option<IdeaRecord>>;

    /// Apply `transition` if the idea is currently in `from`.
    ///
    /// Returns `true` when the row changed, `false` when the idea is
    /// missing or no longer in `from`.
    async fn transition_idea(
        &self,
        id: &str,
        from: IdeaStatus,
        transition: &Transition,
        now: i64,
    ) -> Result<bool>;

    /// Return the entry for `idea_hash` if it was cached at or after
    /// `fresh_since`. Older rows are treated as absent.
    async fn get_cache_entry(&self, idea_hash: &str, fresh_since: i64)
        -> Result<Option<CacheEntry>>;

    /// Insert or overwrite the entry keyed by `entry.idea_hash`.
    async fn upsert_cache_entry(&self, entry: &CacheEntry) -> Result<()>;

    /// Number of submissions by `owner_id` created at or after `since`.
    async fn count_submissions_since(&self, owner_id: &str, since: i64) -> Result<i64>;

    async fn record_submission(&self, owner_id: &str, at: i64) -> Result<()>;

    /// All ideas owned by `owner_id`, newest first.
    async fn list_ideas_by_owner(&self, owner_id: &str) -> Result<Vec<IdeaRecord>>;

    /// Public scored ideas ordered by score (desc), then age (oldest first).
    async fn top_scored_ideas(&self, limit: i64) -> Result<Vec<IdeaRecord>>;

    /// Highest-scored public idea created within `[start, end]`.
    async fn best_scored_between(&self, start: i64, end: i64) -> Result<Option<IdeaRecord>>;
}
