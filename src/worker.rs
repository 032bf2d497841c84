//! Queue consumer: turns `queued` ideas into `scored` or `failed` ones.
//!
//! Per job:
//!
//! 1. Load the idea; skip unless it is still `queued`.
//! 2. Claim it with a guarded `queued → analyzing` transition.
//! 3. Re-check the content cache and copy a live hit without calling out.
//! 4. Otherwise analyze, score, summarize, upsert the cache and move to
//!    `scored`; any analysis failure moves to `failed` with the message.
//!
//! The job is acknowledged in every case except a store error before the
//! claim, which leaves it for redelivery. Within a batch, jobs for distinct
//! fingerprints run concurrently and jobs sharing a fingerprint run one
//! after another, so the second one finds the first one's cache entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use idea_pipeline_core::models::{IdeaJob, IdeaStatus, Transition};
use idea_pipeline_core::scoring::compute_score;
use idea_pipeline_core::store::Store;
use idea_pipeline_core::summary::build_summary;

use crate::analysis::{create_analyzer, IdeaAnalyzer};
use crate::cache::ContentCache;
use crate::config::{Config, WorkerConfig};
use crate::db;
use crate::migrate::apply_schema;
use crate::queue::{Delivery, JobQueue, SqliteQueue};
use crate::sqlite_store::SqliteStore;

/// What happened to one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Missing idea, or not `queued` any more (duplicate or stale delivery).
    Skipped,
    /// Scored by copying a live cache entry.
    ScoredFromCache { score: i64 },
    /// Scored from a fresh analysis.
    Scored { score: i64 },
    Failed { message: String },
}

pub struct Worker {
    store: Arc<dyn Store>,
    cache: ContentCache,
    queue: Arc<dyn JobQueue>,
    analyzer: Arc<dyn IdeaAnalyzer>,
    batch_size: usize,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        analyzer: Arc<dyn IdeaAnalyzer>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            cache: ContentCache::new(store.clone()),
            store,
            queue,
            analyzer,
            batch_size: config.batch_size,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Process one job. `Err` means the idea was never claimed and the job
    /// should be redelivered.
    pub async fn process(&self, job: &IdeaJob) -> Result<JobOutcome> {
        let Some(idea) = self.store.get_idea(&job.idea_id).await? else {
            debug!(idea_id = %job.idea_id, "job for unknown idea");
            return Ok(JobOutcome::Skipped);
        };
        if idea.status != IdeaStatus::Queued {
            debug!(idea_id = %job.idea_id, status = %idea.status, "idea no longer queued");
            return Ok(JobOutcome::Skipped);
        }

        let claimed = self
            .store
            .transition_idea(
                &job.idea_id,
                IdeaStatus::Queued,
                &Transition::Analyzing,
                Utc::now().timestamp(),
            )
            .await?;
        if !claimed {
            debug!(idea_id = %job.idea_id, "idea claimed by another delivery");
            return Ok(JobOutcome::Skipped);
        }

        match self.finish_claimed(job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(idea_id = %job.idea_id, error = %e, "store error after claim");
                let message = format!("internal error: {}", e);
                self.store
                    .transition_idea(
                        &job.idea_id,
                        IdeaStatus::Analyzing,
                        &Transition::Failed {
                            message: message.clone(),
                        },
                        Utc::now().timestamp(),
                    )
                    .await?;
                Ok(JobOutcome::Failed { message })
            }
        }
    }

    async fn finish_claimed(&self, job: &IdeaJob) -> Result<JobOutcome> {
        if let Some(cached) = self.cache.lookup(&job.idea_hash).await? {
            let transition = Transition::from_cache(&cached);
            self.apply(&job.idea_id, &transition).await?;
            info!(idea_id = %job.idea_id, fingerprint = %job.idea_hash, score = cached.score, "scored from cache");
            return Ok(JobOutcome::ScoredFromCache {
                score: cached.score,
            });
        }

        let report = match self
            .analyzer
            .analyze(&job.normalized_text.prompt_text())
            .await
        {
            Ok(report) => report,
            Err(e) => {
                let message = e.to_string();
                warn!(idea_id = %job.idea_id, error = %message, "analysis failed");
                self.apply(
                    &job.idea_id,
                    &Transition::Failed {
                        message: message.clone(),
                    },
                )
                .await?;
                return Ok(JobOutcome::Failed { message });
            }
        };

        if !report.rubric_inputs.in_range() {
            warn!(idea_id = %job.idea_id, rubric = ?report.rubric_inputs, "rubric inputs outside 0-5");
        }
        let score = compute_score(&report.rubric_inputs);
        let summary = build_summary(&report);
        let raw = serde_json::to_string(&report)?;

        self.cache
            .upsert(&job.idea_hash, &raw, &summary, score)
            .await?;
        self.apply(
            &job.idea_id,
            &Transition::Scored {
                score,
                summary,
                raw,
            },
        )
        .await?;

        info!(idea_id = %job.idea_id, fingerprint = %job.idea_hash, score, "scored");
        Ok(JobOutcome::Scored { score })
    }

    async fn apply(&self, idea_id: &str, transition: &Transition) -> Result<()> {
        let applied = self
            .store
            .transition_idea(
                idea_id,
                IdeaStatus::Analyzing,
                transition,
                Utc::now().timestamp(),
            )
            .await?;
        if !applied {
            warn!(idea_id, target = %transition.target(), "idea left analyzing before the worker finished");
        }
        Ok(())
    }

    /// Process and acknowledge one delivery. Returns `None` when the job
    /// was left for redelivery.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Option<JobOutcome> {
        match self.process(&delivery.job).await {
            Ok(outcome) => {
                if let Err(e) = self.queue.ack(delivery).await {
                    warn!(job_id = delivery.id, error = %e, "ack failed; job will be redelivered");
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(
                    job_id = delivery.id,
                    idea_id = %delivery.job.idea_id,
                    attempts = delivery.attempts,
                    error = %e,
                    "job left for redelivery"
                );
                None
            }
        }
    }

    /// Process a batch. Returns the outcomes of acknowledged jobs.
    pub async fn run_batch(self: &Arc<Self>, deliveries: Vec<Delivery>) -> Vec<JobOutcome> {
        let mut groups: Vec<Vec<Delivery>> = Vec::new();
        let mut by_fingerprint: HashMap<String, usize> = HashMap::new();
        for delivery in deliveries {
            match by_fingerprint.get(&delivery.job.idea_hash) {
                Some(&idx) => groups[idx].push(delivery),
                None => {
                    by_fingerprint.insert(delivery.job.idea_hash.clone(), groups.len());
                    groups.push(vec![delivery]);
                }
            }
        }

        let mut set = JoinSet::new();
        for group in groups {
            let worker = Arc::clone(self);
            set.spawn(async move {
                let mut outcomes = Vec::with_capacity(group.len());
                for delivery in &group {
                    if let Some(outcome) = worker.handle_delivery(delivery).await {
                        outcomes.push(outcome);
                    }
                }
                outcomes
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(group_outcomes) => outcomes.extend(group_outcomes),
                Err(e) => error!(error = %e, "worker task panicked"),
            }
        }
        outcomes
    }

    /// Receive one batch and process it. Returns the number of deliveries
    /// received.
    pub async fn run_once(self: &Arc<Self>) -> Result<usize> {
        let batch = self.queue.receive(self.batch_size).await?;
        let received = batch.len();
        if received > 0 {
            debug!(received, "processing batch");
            self.run_batch(batch).await;
        }
        Ok(received)
    }

    /// Poll the queue until `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(batch_size = self.batch_size, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = match self.run_once().await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "queue receive failed");
                    0
                }
            };

            if received == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        info!("worker stopped");
        Ok(())
    }
}

/// `ideas worker`: run a standalone consumer against the configured
/// database until Ctrl-C.
pub async fn run_worker(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(SqliteQueue::new(
        pool.clone(),
        config.worker.visibility_timeout_secs,
    ));
    let analyzer: Arc<dyn IdeaAnalyzer> = Arc::from(create_analyzer(&config.analysis)?);
    let worker = Arc::new(Worker::new(store, queue, analyzer, &config.worker));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));
    println!("Worker running (batch size {}). Press Ctrl-C to stop.", config.worker.batch_size);

    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(true);
    handle.await??;
    pool.close().await;
    Ok(())
}
