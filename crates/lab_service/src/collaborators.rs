//! Narrow contracts for the systems the progression engine depends on but
//! does not own: identity, the problem catalog, and the submission tracker.

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::DateTime;
use lab_core::{
    bucket_for_rank, DifficultyBucketDef, PlayerId, ProblemId, ProblemSnapshot, SubmissionStatus,
    Timestamp, UserHandle,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player: PlayerId,
    /// Account name on the external judge, used for submission lookups.
    pub handle: UserHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unauthenticated: {0}")]
pub struct Unauthenticated(pub String);

pub trait IdentityProvider: Send + Sync {
    type Request: ?Sized;

    fn current_user(&self, request: &Self::Request) -> Result<Identity, Unauthenticated>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("problem catalog unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProblemCatalog: Send + Sync {
    /// Problems whose difficulty lies in the bucket containing `rank`.
    async fn find_by_difficulty_bucket(
        &self,
        rank: f64,
    ) -> Result<Vec<ProblemSnapshot>, CatalogError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("submission tracker unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SubmissionTracker: Send + Sync {
    /// First submission and first accepted submission by `handle` on
    /// `problem` at or after `since_epoch_secs`.
    async fn first_solve_and_submit_time(
        &self,
        problem: &ProblemId,
        handle: &UserHandle,
        since_epoch_secs: i64,
    ) -> Result<SubmissionStatus, TrackerError>;
}

// ---------------------------------------------------------------------------
// Static implementations
// ---------------------------------------------------------------------------

/// Catalog backed by a fixed problem list and bucket table.
#[derive(Debug, Clone)]
pub struct StaticProblemCatalog {
    problems: Vec<ProblemSnapshot>,
    buckets: Vec<DifficultyBucketDef>,
}

impl StaticProblemCatalog {
    pub fn new(problems: Vec<ProblemSnapshot>, buckets: Vec<DifficultyBucketDef>) -> Self {
        Self { problems, buckets }
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

#[async_trait]
impl ProblemCatalog for StaticProblemCatalog {
    async fn find_by_difficulty_bucket(
        &self,
        rank: f64,
    ) -> Result<Vec<ProblemSnapshot>, CatalogError> {
        let Some(bucket) = bucket_for_rank(&self.buckets, rank) else {
            return Ok(Vec::new());
        };
        Ok(self
            .problems
            .iter()
            .filter(|problem| bucket.contains(problem.difficulty))
            .cloned()
            .collect())
    }
}

/// One judged submission as the tracker knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub handle: UserHandle,
    pub problem_id: ProblemId,
    pub submitted_at: Timestamp,
    pub accepted: bool,
}

/// In-memory tracker. Entries are added by tests, by the daemon's seed
/// file, or by whoever plays the judge.
#[derive(Debug, Default)]
pub struct StaticSubmissionTracker {
    entries: RwLock<AHashMap<(UserHandle, ProblemId), Vec<SubmissionEntry>>>,
    offline: AtomicBool,
}

impl StaticSubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = SubmissionEntry>) -> Self {
        let tracker = Self::new();
        for entry in entries {
            tracker.record(entry);
        }
        tracker
    }

    pub fn record(&self, entry: SubmissionEntry) {
        self.entries
            .write()
            .entry((entry.handle.clone(), entry.problem_id.clone()))
            .or_default()
            .push(entry);
    }

    /// While offline every lookup fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

#[async_trait]
impl SubmissionTracker for StaticSubmissionTracker {
    async fn first_solve_and_submit_time(
        &self,
        problem: &ProblemId,
        handle: &UserHandle,
        since_epoch_secs: i64,
    ) -> Result<SubmissionStatus, TrackerError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(TrackerError::Unavailable("tracker is offline".to_string()));
        }
        let since = DateTime::from_timestamp(since_epoch_secs, 0)
            .ok_or_else(|| TrackerError::Unavailable(format!("bad epoch {since_epoch_secs}")))?;
        let entries = self.entries.read();
        let Some(list) = entries.get(&(handle.clone(), problem.clone())) else {
            return Ok(SubmissionStatus::default());
        };
        let relevant = list.iter().filter(|entry| entry.submitted_at >= since);
        let mut status = SubmissionStatus::default();
        for entry in relevant {
            status.first_submitted_at = Some(
                status
                    .first_submitted_at
                    .map_or(entry.submitted_at, |at| at.min(entry.submitted_at)),
            );
            if entry.accepted {
                status.first_solved_at = Some(
                    status
                        .first_solved_at
                        .map_or(entry.submitted_at, |at| at.min(entry.submitted_at)),
                );
            }
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::test_fixtures::{at, color_buckets, sample_problems};

    fn entry(secs: i64, accepted: bool) -> SubmissionEntry {
        SubmissionEntry {
            handle: UserHandle::new("alice"),
            problem_id: ProblemId::new("abc300_a"),
            submitted_at: at(secs),
            accepted,
        }
    }

    #[tokio::test]
    async fn catalog_filters_by_rank_bucket() {
        let mut problems = sample_problems();
        problems.push(ProblemSnapshot {
            id: ProblemId::new("abc310_f"),
            title: "Hard".to_string(),
            difficulty: 1900,
        });
        let catalog = StaticProblemCatalog::new(problems, color_buckets());
        let gray = catalog.find_by_difficulty_bucket(0.0).await.unwrap();
        assert_eq!(gray.len(), sample_problems().len());
        let blue = catalog.find_by_difficulty_bucket(1650.5).await.unwrap();
        assert_eq!(blue.len(), 1);
        assert_eq!(blue[0].id, ProblemId::new("abc310_f"));
        assert!(catalog.find_by_difficulty_bucket(900.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tracker_reports_earliest_times_since_start() {
        let tracker = StaticSubmissionTracker::from_entries([
            entry(5, true),
            entry(20, false),
            entry(40, true),
            entry(30, false),
        ]);
        let since = at(10).timestamp();
        let status = tracker
            .first_solve_and_submit_time(&ProblemId::new("abc300_a"), &UserHandle::new("alice"), since)
            .await
            .unwrap();
        assert_eq!(status.first_submitted_at, Some(at(20)));
        assert_eq!(status.first_solved_at, Some(at(40)));
    }

    #[tokio::test]
    async fn tracker_knows_nothing_about_other_handles() {
        let tracker = StaticSubmissionTracker::from_entries([entry(5, true)]);
        let status = tracker
            .first_solve_and_submit_time(&ProblemId::new("abc300_a"), &UserHandle::new("bob"), 0)
            .await
            .unwrap();
        assert_eq!(status, SubmissionStatus::default());
    }

    #[tokio::test]
    async fn offline_tracker_fails() {
        let tracker = StaticSubmissionTracker::new();
        tracker.set_offline(true);
        let result = tracker
            .first_solve_and_submit_time(&ProblemId::new("abc300_a"), &UserHandle::new("alice"), 0)
            .await;
        assert!(matches!(result, Err(TrackerError::Unavailable(_))));
    }
}
