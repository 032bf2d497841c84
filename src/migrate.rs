//! Database schema migrations.
//!
//! Every statement is `IF NOT EXISTS`, so running `ideas init` repeatedly
//! is safe.
//!
//! | Table | Key | Written by |
//! |-------|-----|-----------|
//! | `ideas` | `id` | dispatcher (insert), worker (status) |
//! | `idea_cache` | `idea_hash` | worker (upsert) |
//! | `submissions` | autoincrement | dispatcher (append) |
//! | `idea_jobs` | autoincrement | queue |
//! | `sessions` | `id` | external auth (read-only here) |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an existing pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ideas (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            idea_hash TEXT NOT NULL,
            visibility TEXT NOT NULL DEFAULT 'public',
            status TEXT NOT NULL,
            score INTEGER,
            analysis_summary TEXT,
            analysis_raw TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS idea_cache (
            idea_hash TEXT PRIMARY KEY,
            analysis_raw TEXT NOT NULL,
            analysis_summary TEXT NOT NULL,
            score INTEGER NOT NULL,
            cached_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS idea_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL,
            visible_at INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ideas_owner_id ON ideas(owner_id, created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ideas_score ON ideas(score DESC, created_at ASC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ideas_created_at ON ideas(created_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_submissions_owner ON submissions(owner_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_idea_jobs_visible ON idea_jobs(visible_at, id)")
        .execute(pool)
        .await?;

    Ok(())
}
