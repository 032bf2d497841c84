//! Content-addressed analysis cache.
//!
//! Entries older than [`CACHE_FRESHNESS_SECS`] are treated as absent at read
//! time and overwritten by the next successful analysis of the same
//! fingerprint. Nothing deletes them.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use idea_pipeline_core::models::CacheEntry;
use idea_pipeline_core::store::Store;

/// 72 hours.
pub const CACHE_FRESHNESS_SECS: i64 = 72 * 3600;

#[derive(Clone)]
pub struct ContentCache {
    store: Arc<dyn Store>,
}

impl ContentCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Live entry for `fingerprint`, if any.
    pub async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        self.lookup_at(fingerprint, Utc::now().timestamp()).await
    }

    /// Like [`lookup`](Self::lookup) with an explicit clock.
    pub async fn lookup_at(&self, fingerprint: &str, now: i64) -> Result<Option<CacheEntry>> {
        self.store
            .get_cache_entry(fingerprint, now - CACHE_FRESHNESS_SECS)
            .await
    }

    /// Insert or overwrite the entry for `fingerprint`, stamped with now.
    pub async fn upsert(
        &self,
        fingerprint: &str,
        raw: &str,
        summary: &str,
        score: i64,
    ) -> Result<CacheEntry> {
        self.upsert_at(fingerprint, raw, summary, score, Utc::now().timestamp())
            .await
    }

    pub async fn upsert_at(
        &self,
        fingerprint: &str,
        raw: &str,
        summary: &str,
        score: i64,
        now: i64,
    ) -> Result<CacheEntry> {
        let entry = CacheEntry {
            idea_hash: fingerprint.to_string(),
            analysis_raw: raw.to_string(),
            analysis_summary: summary.to_string(),
            score,
            cached_at: now,
        };
        self.store.upsert_cache_entry(&entry).await?;
        Ok(entry)
    }
}
