//! Submission intake.
//!
//! [`Dispatcher::submit`] runs synchronously inside the request. It either
//! answers from the content cache (a new record born `scored`) or records a
//! `queued` idea and hands a job to the queue without waiting for it.
//!
//! ```text
//! auth ─▶ validate ─▶ verify token ─▶ fingerprint ─▶ cache hit? ──yes──▶ scored (201)
//!                                                        │
//!                                                        no
//!                                                        ▼
//!                                               gate ─▶ queued + job (202)
//! ```
//!
//! A cache hit skips the rate limit but still appends to the submission
//! ledger.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use idea_pipeline_core::models::{IdeaJob, IdeaRecord, IdeaStatus, Transition};
use idea_pipeline_core::normalize::normalize_idea;
use idea_pipeline_core::store::Store;

use crate::cache::ContentCache;
use crate::error::SubmitError;
use crate::gate::{GateDecision, SubmissionGate};
use crate::queue::JobQueue;
use crate::verify::Verifier;

pub const TITLE_MAX_CHARS: usize = 120;
pub const DESCRIPTION_MIN_CHARS: usize = 20;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;
pub const TOKEN_MIN_CHARS: usize = 10;

/// Body of `POST /api/ideas`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub title: String,
    pub description: String,
    #[serde(alias = "turnstileToken")]
    pub verification_token: String,
}

/// Result of an accepted submission. `status` is `scored` or `queued`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub id: String,
    pub status: IdeaStatus,
}

/// Shape and length checks. Lengths are counted in characters on the
/// input as given.
pub fn validate_request(req: &SubmitRequest) -> Result<(), SubmitError> {
    let title_len = req.title.chars().count();
    if title_len == 0 || title_len > TITLE_MAX_CHARS {
        return Err(SubmitError::InvalidInput(format!(
            "title must be 1-{} characters",
            TITLE_MAX_CHARS
        )));
    }

    let desc_len = req.description.chars().count();
    if !(DESCRIPTION_MIN_CHARS..=DESCRIPTION_MAX_CHARS).contains(&desc_len) {
        return Err(SubmitError::InvalidInput(format!(
            "description must be {}-{} characters",
            DESCRIPTION_MIN_CHARS, DESCRIPTION_MAX_CHARS
        )));
    }

    if req.verification_token.chars().count() < TOKEN_MIN_CHARS {
        return Err(SubmitError::InvalidInput(
            "verification token is missing or too short".to_string(),
        ));
    }

    Ok(())
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    cache: ContentCache,
    gate: SubmissionGate,
    queue: Arc<dyn JobQueue>,
    verifier: Arc<dyn Verifier>,
    daily_limit: i64,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        verifier: Arc<dyn Verifier>,
        daily_limit: i64,
    ) -> Self {
        Self {
            cache: ContentCache::new(store.clone()),
            gate: SubmissionGate::new(store.clone()),
            store,
            queue,
            verifier,
            daily_limit,
        }
    }

    pub async fn submit(
        &self,
        owner_id: Option<&str>,
        req: &SubmitRequest,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submit_at(owner_id, req, Utc::now().timestamp()).await
    }

    /// [`submit`](Self::submit) with an explicit clock.
    pub async fn submit_at(
        &self,
        owner_id: Option<&str>,
        req: &SubmitRequest,
        now: i64,
    ) -> Result<SubmitOutcome, SubmitError> {
        let owner_id = owner_id.ok_or(SubmitError::Unauthorized)?;
        validate_request(req)?;

        match self.verifier.verify(&req.verification_token).await {
            Ok(true) => {}
            Ok(false) => return Err(SubmitError::VerificationFailed),
            Err(e) => {
                warn!(owner_id, error = %e, "verification service unavailable");
                return Err(SubmitError::VerificationFailed);
            }
        }

        let (normalized, fingerprint) = normalize_idea(&req.title, &req.description);
        let id = uuid::Uuid::new_v4().to_string();

        if let Some(cached) = self.cache.lookup_at(&fingerprint, now).await? {
            let idea = IdeaRecord::scored_from_cache(
                id.clone(),
                owner_id.to_string(),
                req.title.clone(),
                req.description.clone(),
                &cached,
                now,
            );
            self.store.insert_idea(&idea).await?;
            self.gate.record(owner_id, now).await?;
            info!(idea_id = %id, owner_id, fingerprint = %fingerprint, "served submission from cache");
            return Ok(SubmitOutcome {
                id,
                status: IdeaStatus::Scored,
            });
        }

        if self.gate.check(owner_id, self.daily_limit, now).await? == GateDecision::Denied {
            info!(owner_id, "submission rate limited");
            return Err(SubmitError::RateLimited);
        }

        let idea = IdeaRecord::queued(
            id.clone(),
            owner_id.to_string(),
            req.title.clone(),
            req.description.clone(),
            fingerprint.clone(),
            now,
        );
        self.store.insert_idea(&idea).await?;

        let job = IdeaJob {
            idea_id: id.clone(),
            idea_hash: fingerprint.clone(),
            normalized_text: normalized,
        };
        if let Err(e) = self.record_and_enqueue(owner_id, &job, now).await {
            let failed = Transition::Failed {
                message: format!("{:#}", e),
            };
            if let Err(mark_err) = self
                .store
                .transition_idea(&id, IdeaStatus::Queued, &failed, now)
                .await
            {
                warn!(idea_id = %id, error = %mark_err, "could not mark unqueued idea failed");
            }
            return Err(SubmitError::Internal(e));
        }

        info!(idea_id = %id, owner_id, fingerprint = %fingerprint, "queued submission");
        Ok(SubmitOutcome {
            id,
            status: IdeaStatus::Queued,
        })
    }

    /// Ledger append and enqueue for an idea already stored as `queued`.
    /// Any error here leaves the record for the caller to mark failed.
    async fn record_and_enqueue(
        &self,
        owner_id: &str,
        job: &IdeaJob,
        now: i64,
    ) -> anyhow::Result<()> {
        self.gate
            .record(owner_id, now)
            .await
            .context("could not record submission")?;
        self.queue
            .enqueue(job)
            .await
            .context("could not queue analysis")?;
        Ok(())
    }
}
