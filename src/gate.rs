//! Per-owner rolling-window submission quota.
//!
//! The check and the ledger append are separate writes, so concurrent
//! submissions from one owner can overshoot the limit slightly.

use std::sync::Arc;

use anyhow::Result;

use idea_pipeline_core::store::Store;

/// Rolling window length: 24 hours.
pub const SUBMISSION_WINDOW_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied,
}

#[derive(Clone)]
pub struct SubmissionGate {
    store: Arc<dyn Store>,
}

impl SubmissionGate {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Denied when `owner_id` already has `daily_limit` submissions in the
    /// window ending at `now`. Nothing is recorded on denial.
    pub async fn check(&self, owner_id: &str, daily_limit: i64, now: i64) -> Result<GateDecision> {
        let count = self
            .store
            .count_submissions_since(owner_id, now - SUBMISSION_WINDOW_SECS)
            .await?;
        if count >= daily_limit {
            Ok(GateDecision::Denied)
        } else {
            Ok(GateDecision::Allowed)
        }
    }

    /// Append a ledger row for `owner_id`.
    pub async fn record(&self, owner_id: &str, now: i64) -> Result<()> {
        self.store.record_submission(owner_id, now).await
    }

    /// [`check`](Self::check), then [`record`](Self::record) when allowed.
    pub async fn check_and_record(
        &self,
        owner_id: &str,
        daily_limit: i64,
        now: i64,
    ) -> Result<GateDecision> {
        let decision = self.check(owner_id, daily_limit, now).await?;
        if decision == GateDecision::Allowed {
            self.record(owner_id, now).await?;
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idea_pipeline_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_limit_reached_denies_without_recording() {
        let store = Arc::new(InMemoryStore::new());
        let gate = SubmissionGate::new(store.clone());
        let now = 1_000_000;

        for _ in 0..3 {
            assert_eq!(
                gate.check_and_record("u", 3, now).await.unwrap(),
                GateDecision::Allowed
            );
        }
        assert_eq!(
            gate.check_and_record("u", 3, now).await.unwrap(),
            GateDecision::Denied
        );
        assert_eq!(store.submission_count(), 3);

        // Other owners are unaffected.
        assert_eq!(
            gate.check("v", 3, now).await.unwrap(),
            GateDecision::Allowed
        );
    }

    #[tokio::test]
    async fn test_window_rolls() {
        let store = Arc::new(InMemoryStore::new());
        let gate = SubmissionGate::new(store);
        let t0 = 1_000_000;
        gate.record("u", t0).await.unwrap();

        assert_eq!(gate.check("u", 1, t0 + 10).await.unwrap(), GateDecision::Denied);
        assert_eq!(
            gate.check("u", 1, t0 + SUBMISSION_WINDOW_SECS + 1)
                .await
                .unwrap(),
            GateDecision::Allowed
        );
    }
}
