//! Read paths: idea detail, profile listing, leaderboard, best of day.
//!
//! These are shared by the HTTP handlers in [`crate::server`] and the
//! `ideas get` / `ideas leaderboard` commands. Redaction always goes
//! through [`sanitize_idea`] or [`RankedIdea`], never ad hoc.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};

use idea_pipeline_core::sanitize::{sanitize_idea, IdeaView, RankedIdea};
use idea_pipeline_core::store::Store;

use crate::config::{Config, MAX_UTC_OFFSET_MINUTES};
use crate::db;
use crate::sqlite_store::SqliteStore;

pub const LEADERBOARD_MAX: i64 = 100;

/// Requested leaderboard size, defaulting to and capped at
/// [`LEADERBOARD_MAX`]. Values below 1 become 1.
pub fn leaderboard_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(LEADERBOARD_MAX).clamp(1, LEADERBOARD_MAX)
}

pub async fn idea_view(
    store: &dyn Store,
    id: &str,
    viewer_id: Option<&str>,
) -> Result<Option<IdeaView>> {
    Ok(store
        .get_idea(id)
        .await?
        .map(|idea| sanitize_idea(&idea, viewer_id)))
}

/// Every idea `owner_id` submitted, newest first, as the owner sees them.
pub async fn my_ideas(store: &dyn Store, owner_id: &str) -> Result<Vec<IdeaView>> {
    let ideas = store.list_ideas_by_owner(owner_id).await?;
    Ok(ideas
        .iter()
        .map(|idea| sanitize_idea(idea, Some(owner_id)))
        .collect())
}

pub async fn leaderboard(store: &dyn Store, limit: Option<i64>) -> Result<Vec<RankedIdea>> {
    let ideas = store.top_scored_ideas(leaderboard_limit(limit)).await?;
    Ok(ideas.iter().map(RankedIdea::from).collect())
}

/// Unix-second bounds `[start, end]` of the local calendar day containing
/// `now`, for a fixed offset from UTC.
pub fn day_window(now: DateTime<Utc>, utc_offset_minutes: i32) -> Result<(i64, i64)> {
    if utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        anyhow::bail!(
            "utc_offset_minutes must be within ±{}",
            MAX_UTC_OFFSET_MINUTES
        );
    }
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
        .with_context(|| format!("invalid utc offset: {}", utc_offset_minutes))?;

    let local = now.with_timezone(&offset);
    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .context("midnight does not exist")?
        .and_local_timezone(offset)
        .single()
        .context("ambiguous local midnight")?;

    let start = midnight.timestamp();
    Ok((start, start + 24 * 3600 - 1))
}

/// Highest-scored public idea created during the local day containing
/// `now`.
pub async fn best_of_day(
    store: &dyn Store,
    now: DateTime<Utc>,
    utc_offset_minutes: i32,
) -> Result<Option<RankedIdea>> {
    let (start, end) = day_window(now, utc_offset_minutes)?;
    Ok(store
        .best_scored_between(start, end)
        .await?
        .as_ref()
        .map(RankedIdea::from))
}

// ============ CLI ============

/// `ideas get <id>`: print one idea with every field.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let idea = store.get_idea(id).await?;
    pool.close().await;

    let Some(idea) = idea else {
        anyhow::bail!("idea not found: {}", id);
    };
    let view = sanitize_idea(&idea, Some(idea.owner_id.as_str()));

    println!("--- Idea ---");
    println!("id:           {}", view.id);
    println!("title:        {}", view.title);
    println!("owner_id:     {}", view.owner_id.as_deref().unwrap_or("-"));
    println!("idea_hash:    {}", view.idea_hash.as_deref().unwrap_or("-"));
    println!("visibility:   {}", view.visibility);
    println!("status:       {}", view.status);
    match view.score {
        Some(score) => println!("score:        {}", score),
        None => println!("score:        -"),
    }
    println!("created_at:   {}", view.created_at);
    println!("updated_at:   {}", view.updated_at);
    println!();

    println!("--- Description ---");
    println!("{}", view.description);
    println!();

    if let Some(summary) = &view.analysis_summary {
        println!("--- Summary ---");
        println!("{}", summary);
        println!();
    }
    if let Some(raw) = &view.analysis_raw {
        println!("--- Analysis ---");
        println!("{}", raw);
        println!();
    }

    Ok(())
}

/// `ideas leaderboard`: print the ranked table.
pub async fn run_leaderboard(config: &Config, limit: Option<i64>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let rows = leaderboard(&store, limit).await?;
    pool.close().await;

    if rows.is_empty() {
        println!("No scored ideas yet.");
        return Ok(());
    }

    println!("  {:>4} {:>5}   {:<40} {}", "RANK", "SCORE", "TITLE", "CREATED");
    println!("  {}", "-".repeat(76));
    for (i, row) in rows.iter().enumerate() {
        let score = row.score.map(|s| s.to_string()).unwrap_or_default();
        println!(
            "  {:>4} {:>5}   {:<40} {}",
            i + 1,
            score,
            truncate(&row.title, 40),
            row.created_at
        );
    }
    println!();

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars - 1).collect();
        out.push('…');
        out
    }
}
