//! Submitting verified and approved changes.

use std::sync::Arc;

use gatekeeper_review::{Change, ReviewService};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::reporter::VerdictPipeline;

/// What happened to one merge candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged,
    SkippedNotSubmittable,
    RetestFailed,
    TestError { error: String },
    SubmitFailed { status: Option<u16>, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeAttempt {
    pub change_id: String,
    pub outcome: MergeOutcome,
}

/// Per-change outcomes of one merge phase, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub attempts: Vec<MergeAttempt>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Ids of the changes that were submitted.
    pub fn merged(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| a.outcome == MergeOutcome::Merged)
            .map(|a| a.change_id.as_str())
            .collect()
    }

    pub fn outcome_of(&self, change_id: &str) -> Option<&MergeOutcome> {
        self.attempts
            .iter()
            .find(|a| a.change_id == change_id)
            .map(|a| &a.outcome)
    }

    fn push(&mut self, change: &Change, outcome: MergeOutcome) {
        self.attempts.push(MergeAttempt {
            change_id: change.id.clone(),
            outcome,
        });
    }
}

/// Retests and submits merge-ready changes one at a time.
pub struct MergeCoordinator {
    review: Arc<dyn ReviewService>,
    tester: Arc<VerdictPipeline>,
}

impl MergeCoordinator {
    pub fn new(review: Arc<dyn ReviewService>, tester: Arc<VerdictPipeline>) -> Self {
        Self { review, tester }
    }

    /// Process `changes` in reverse of the order given (oldest first for a
    /// newest-first listing). No failure aborts the remaining candidates.
    pub async fn merge_ready(&self, changes: &[Change]) -> MergeReport {
        let mut report = MergeReport::default();

        for change in changes.iter().rev() {
            if !change.submittable {
                debug!(change_id = %change.id, "Not submittable, skipping");
                report.push(change, MergeOutcome::SkippedNotSubmittable);
                continue;
            }

            info!(change_id = %change.id, "Retesting before merge");
            let passed = match self.tester.test_change(change).await {
                Ok(passed) => passed,
                Err(e) => {
                    error!(change_id = %change.id, error = %e, "Error testing merge candidate");
                    report.push(
                        change,
                        MergeOutcome::TestError {
                            error: e.to_string(),
                        },
                    );
                    continue;
                }
            };
            if !passed {
                warn!(change_id = %change.id, "Retest failed, not merging");
                report.push(change, MergeOutcome::RetestFailed);
                continue;
            }

            info!(change_id = %change.id, revision = %change.current_revision, "Merging");
            match self
                .review
                .submit(&change.id, &change.current_revision)
                .await
            {
                Ok(()) => {
                    info!(change_id = %change.id, "Merged");
                    report.push(change, MergeOutcome::Merged);
                }
                Err(e) => {
                    let status = e.status();
                    let reason = e
                        .reason()
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string());
                    warn!(
                        change_id = %change.id,
                        status = ?status,
                        conflict = e.is_conflict(),
                        reason = %reason,
                        "Failed to merge"
                    );
                    report.push(change, MergeOutcome::SubmitFailed { status, reason });
                }
            }
        }

        report
    }
}
