//! At-least-once job queue between the dispatcher and the worker.
//!
//! A received job stays invisible to other consumers until it is
//! acknowledged or its visibility timeout runs out, after which it is
//! delivered again. Consumers must therefore tolerate duplicates; the
//! worker does so through guarded status transitions.
//!
//! - [`SqliteQueue`] stores jobs in the `idea_jobs` table and survives
//!   restarts.
//! - [`MemoryQueue`] keeps jobs in process, for tests and single-process
//!   setups.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use idea_pipeline_core::models::IdeaJob;

/// One received job. Pass it back to [`JobQueue::ack`] once handled.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: i64,
    /// 1 on first delivery, incremented on each redelivery.
    pub attempts: i64,
    pub job: IdeaJob,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &IdeaJob) -> Result<()>;

    /// Claim up to `max` visible jobs.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Remove a handled job. Acknowledging twice is a no-op.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

// ============ SQLite ============

#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    visibility_timeout_secs: i64,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool, visibility_timeout_secs: i64) -> Self {
        Self {
            pool,
            visibility_timeout_secs,
        }
    }

    /// [`JobQueue::receive`] with an explicit clock.
    pub async fn receive_at(&self, max: usize, now: i64) -> Result<Vec<Delivery>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, visible_at, attempts
            FROM idea_jobs
            WHERE visible_at <= ?
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let payload: String = row.get("payload");
            let visible_at: i64 = row.get("visible_at");
            let attempts: i64 = row.get("attempts");

            // Lose the race quietly if another consumer claimed it first.
            let claimed = sqlx::query(
                r#"
                UPDATE idea_jobs
                SET visible_at = ?, attempts = attempts + 1
                WHERE id = ? AND visible_at = ?
                "#,
            )
            .bind(now + self.visibility_timeout_secs)
            .bind(id)
            .bind(visible_at)
            .execute(&self.pool)
            .await?
            .rows_affected()
                == 1;
            if !claimed {
                debug!(job_id = id, "job claimed by another consumer");
                continue;
            }

            match serde_json::from_str::<IdeaJob>(&payload) {
                Ok(job) => deliveries.push(Delivery {
                    id,
                    attempts: attempts + 1,
                    job,
                }),
                Err(e) => {
                    warn!(job_id = id, error = %e, "dropping malformed job payload");
                    self.delete(id).await?;
                }
            }
        }

        Ok(deliveries)
    }

    /// Jobs not yet acknowledged, visible or not.
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM idea_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM idea_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue(&self, job: &IdeaJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let now = Utc::now().timestamp();
        sqlx::query("INSERT INTO idea_jobs (payload, enqueued_at, visible_at) VALUES (?, ?, ?)")
            .bind(payload)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to enqueue job for idea {}", job.idea_id))?;
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        self.receive_at(max, Utc::now().timestamp()).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.delete(delivery.id).await
    }
}

// ============ In-memory ============

#[derive(Default)]
struct MemoryQueueState {
    next_id: i64,
    pending: VecDeque<Delivery>,
    in_flight: HashMap<i64, Delivery>,
}

/// In-process queue. Unacknowledged jobs come back only through
/// [`MemoryQueue::redeliver_unacked`].
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting to be received.
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    /// Put every received but unacknowledged job back at the front.
    pub fn redeliver_unacked(&self) {
        let mut state = self.state.lock().unwrap();
        let mut returned: Vec<Delivery> = state.in_flight.drain().map(|(_, d)| d).collect();
        returned.sort_by_key(|d| std::cmp::Reverse(d.id));
        for delivery in returned {
            state.pending.push_front(delivery);
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &IdeaJob) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push_back(Delivery {
            id,
            attempts: 0,
            job: job.clone(),
        });
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut state = self.state.lock().unwrap();
        let take = max.min(state.pending.len());
        let mut out = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some(mut delivery) = state.pending.pop_front() {
                delivery.attempts += 1;
                state.in_flight.insert(delivery.id, delivery.clone());
                out.push(delivery);
            }
        }
        Ok(out)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.state.lock().unwrap().in_flight.remove(&delivery.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use idea_pipeline_core::models::NormalizedText;
    use sqlx::sqlite::SqlitePoolOptions;

    fn job(id: &str) -> IdeaJob {
        IdeaJob {
            idea_id: id.to_string(),
            idea_hash: format!("hash-{}", id),
            normalized_text: NormalizedText {
                title: "t".to_string(),
                description: "d".to_string(),
            },
        }
    }

    async fn sqlite_queue() -> SqliteQueue {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        SqliteQueue::new(pool, 120)
    }

    #[tokio::test]
    async fn test_sqlite_receive_hides_until_timeout() {
        let queue = sqlite_queue().await;
        queue.enqueue(&job("a")).await.unwrap();
        let now = Utc::now().timestamp();

        let first = queue.receive_at(10, now).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].job, job("a"));
        assert_eq!(first[0].attempts, 1);

        assert!(queue.receive_at(10, now + 1).await.unwrap().is_empty());

        let again = queue.receive_at(10, now + 121).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attempts, 2);

        queue.ack(&again[0]).await.unwrap();
        assert!(queue.is_empty().await.unwrap());
        assert!(queue.receive_at(10, now + 1_000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_respects_max_and_order() {
        let queue = sqlite_queue().await;
        for id in ["a", "b", "c"] {
            queue.enqueue(&job(id)).await.unwrap();
        }
        let now = Utc::now().timestamp();
        let batch = queue.receive_at(2, now).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|d| d.job.idea_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(queue.receive_at(2, now).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_drops_malformed_payload() {
        let queue = sqlite_queue().await;
        let now = Utc::now().timestamp();
        sqlx::query("INSERT INTO idea_jobs (payload, enqueued_at, visible_at) VALUES (?, ?, ?)")
            .bind("{not json")
            .bind(now)
            .bind(now)
            .execute(&queue.pool)
            .await
            .unwrap();
        queue.enqueue(&job("ok")).await.unwrap();

        let batch = queue.receive_at(10, now).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].job.idea_id, "ok");
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_queue_redelivery() {
        let queue = MemoryQueue::new();
        queue.enqueue(&job("a")).await.unwrap();
        queue.enqueue(&job("b")).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.pending_len(), 0);

        queue.ack(&batch[1]).await.unwrap();
        queue.redeliver_unacked();

        let again = queue.receive(10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].job.idea_id, "a");
        assert_eq!(again[0].attempts, 2);
    }
}
