//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation to parameterized statements against the
//! schema created by [`crate::migrate`]. Guarded transitions are a single
//! `UPDATE ... WHERE id = ? AND status = ?`; the affected-row count tells
//! the caller whether its precondition still held.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use idea_pipeline_core::models::{CacheEntry, IdeaRecord, IdeaStatus, Transition};
use idea_pipeline_core::store::Store;

const IDEA_COLUMNS: &str = "id, owner_id, title, description, idea_hash, visibility, status, \
     score, analysis_summary, analysis_raw, created_at, updated_at";

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_idea(row: &SqliteRow) -> Result<IdeaRecord> {
    let status: String = row.try_get("status")?;
    let visibility: String = row.try_get("visibility")?;
    Ok(IdeaRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        idea_hash: row.try_get("idea_hash")?,
        visibility: visibility.parse()?,
        status: status.parse()?,
        score: row.try_get("score")?,
        analysis_summary: row.try_get("analysis_summary")?,
        analysis_raw: row.try_get("analysis_raw")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_idea(&self, idea: &IdeaRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ideas (id, owner_id, title, description, idea_hash, visibility,
                               status, score, analysis_summary, analysis_raw,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&idea.id)
        .bind(&idea.owner_id)
        .bind(&idea.title)
        .bind(&idea.description)
        .bind(&idea.idea_hash)
        .bind(idea.visibility.as_str())
        .bind(idea.status.as_str())
        .bind(idea.score)
        .bind(&idea.analysis_summary)
        .bind(&idea.analysis_raw)
        .bind(idea.created_at)
        .bind(idea.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert idea {}", idea.id))?;

        Ok(())
    }

    async fn get_idea(&self, id: &str) -> Result<Option<IdeaRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM ideas WHERE id = ?", IDEA_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_idea).transpose()
    }

    async fn transition_idea(
        &self,
        id: &str,
        from: IdeaStatus,
        transition: &Transition,
        now: i64,
    ) -> Result<bool> {
        let target = transition.target().as_str();
        let result = match transition {
            Transition::Analyzing => {
                sqlx::query(
                    "UPDATE ideas SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(target)
                .bind(now)
                .bind(id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?
            }
            Transition::Scored {
                score,
                summary,
                raw,
            } => {
                sqlx::query(
                    r#"
                    UPDATE ideas
                    SET status = ?, score = ?, analysis_summary = ?, analysis_raw = ?, updated_at = ?
                    WHERE id = ? AND status = ?
                    "#,
                )
                .bind(target)
                .bind(score)
                .bind(summary)
                .bind(raw)
                .bind(now)
                .bind(id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?
            }
            Transition::Failed { message } => {
                sqlx::query(
                    r#"
                    UPDATE ideas
                    SET status = ?, score = NULL, analysis_summary = ?, analysis_raw = NULL, updated_at = ?
                    WHERE id = ? AND status = ?
                    "#,
                )
                .bind(target)
                .bind(message)
                .bind(now)
                .bind(id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn get_cache_entry(
        &self,
        idea_hash: &str,
        fresh_since: i64,
    ) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            r#"
            SELECT idea_hash, analysis_raw, analysis_summary, score, cached_at
            FROM idea_cache
            WHERE idea_hash = ? AND cached_at >= ?
            "#,
        )
        .bind(idea_hash)
        .bind(fresh_since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CacheEntry {
            idea_hash: r.get("idea_hash"),
            analysis_raw: r.get("analysis_raw"),
            analysis_summary: r.get("analysis_summary"),
            score: r.get("score"),
            cached_at: r.get("cached_at"),
        }))
    }

    async fn upsert_cache_entry(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idea_cache (idea_hash, analysis_raw, analysis_summary, score, cached_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(idea_hash) DO UPDATE SET
                analysis_raw = excluded.analysis_raw,
                analysis_summary = excluded.analysis_summary,
                score = excluded.score,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(&entry.idea_hash)
        .bind(&entry.analysis_raw)
        .bind(&entry.analysis_summary)
        .bind(entry.score)
        .bind(entry.cached_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_submissions_since(&self, owner_id: &str, since: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM submissions WHERE owner_id = ? AND created_at >= ?",
        )
        .bind(owner_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn record_submission(&self, owner_id: &str, at: i64) -> Result<()> {
        sqlx::query("INSERT INTO submissions (owner_id, created_at) VALUES (?, ?)")
            .bind(owner_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_ideas_by_owner(&self, owner_id: &str) -> Result<Vec<IdeaRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ideas WHERE owner_id = ? ORDER BY created_at DESC",
            IDEA_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_idea).collect()
    }

    async fn top_scored_ideas(&self, limit: i64) -> Result<Vec<IdeaRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM ideas
            WHERE score IS NOT NULL AND visibility = 'public'
            ORDER BY score DESC, created_at ASC
            LIMIT ?
            "#,
            IDEA_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_idea).collect()
    }

    async fn best_scored_between(&self, start: i64, end: i64) -> Result<Option<IdeaRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM ideas
            WHERE score IS NOT NULL AND visibility = 'public'
              AND created_at BETWEEN ? AND ?
            ORDER BY score DESC, created_at ASC
            LIMIT 1
            "#,
            IDEA_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_idea).transpose()
    }
}
