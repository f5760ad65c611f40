//! The poll loop: test one candidate, merge what is ready, sleep, repeat.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatekeeper_ci::BuildRunner;
use gatekeeper_review::{Change, QueryOption, ReviewService, DEFAULT_FETCH_SCHEME};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::merge::{MergeCoordinator, MergeReport};
use crate::paste::PasteService;
use crate::reporter::VerdictPipeline;
use crate::schedule::{PollSchedule, ShutdownSignal, Sleeper, TokioSleeper};

/// Open changes nobody has voted Verified on yet.
pub const DEFAULT_VERIFY_QUERY: &str = "is:watched status:open NOT label:Verified>=-1";

/// Open changes that are verified and approved.
pub const DEFAULT_MERGE_QUERY: &str =
    "is:watched status:open label:Verified+1 label:Code-Review+2";

pub const VERIFY_OPTIONS: &[QueryOption] = &[
    QueryOption::Labels,
    QueryOption::CurrentRevision,
    QueryOption::DownloadCommands,
];

pub const MERGE_OPTIONS: &[QueryOption] = &[
    QueryOption::Labels,
    QueryOption::CurrentRevision,
    QueryOption::DownloadCommands,
    QueryOption::Submittable,
];

/// Which verify-query result gets tested when several are pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidatePick {
    First,
    #[default]
    Last,
}

impl CandidatePick {
    pub fn pick<'a>(&self, changes: &'a [Change]) -> Option<&'a Change> {
        match self {
            CandidatePick::First => changes.first(),
            CandidatePick::Last => changes.last(),
        }
    }
}

impl fmt::Display for CandidatePick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidatePick::First => write!(f, "first"),
            CandidatePick::Last => write!(f, "last"),
        }
    }
}

impl FromStr for CandidatePick {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(CandidatePick::First),
            "last" => Ok(CandidatePick::Last),
            other => Err(format!("unknown pick '{other}', expected 'first' or 'last'")),
        }
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    pub verify_query: String,
    pub merge_query: String,
    pub pick: CandidatePick,
    pub schedule: PollSchedule,
    /// Download schemes to fetch from, in preference order.
    pub fetch_schemes: Vec<String>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            verify_query: DEFAULT_VERIFY_QUERY.to_string(),
            merge_query: DEFAULT_MERGE_QUERY.to_string(),
            pick: CandidatePick::default(),
            schedule: PollSchedule::default(),
            fetch_schemes: vec![DEFAULT_FETCH_SCHEME.to_string()],
        }
    }
}

/// Result of testing the cycle's candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Passed,
    Failed,
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestedCandidate {
    pub change_id: String,
    pub outcome: CandidateOutcome,
}

/// Everything one cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub tested: Option<TestedCandidate>,
    pub merge: MergeReport,
}

pub struct PollLoop {
    review: Arc<dyn ReviewService>,
    tester: Arc<VerdictPipeline>,
    merger: MergeCoordinator,
    config: PollConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl PollLoop {
    pub fn new(
        review: Arc<dyn ReviewService>,
        paste: Arc<dyn PasteService>,
        builder: Arc<dyn BuildRunner>,
        config: PollConfig,
    ) -> Self {
        let tester = Arc::new(
            VerdictPipeline::new(review.clone(), paste, builder)
                .with_fetch_schemes(config.fetch_schemes.clone()),
        );
        let merger = MergeCoordinator::new(review.clone(), tester.clone());
        Self {
            review,
            tester,
            merger,
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Run one verify phase and one merge phase.
    ///
    /// A failure testing the candidate is logged and recorded in the report.
    /// Query failures in either phase are returned.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("poll_cycle", cycle_id = %cycle_id);
        self.cycle(cycle_id).instrument(span).await
    }

    async fn cycle(&self, cycle_id: Uuid) -> Result<CycleReport> {
        let started_at = Utc::now();

        let candidates = self
            .review
            .query(&self.config.verify_query, VERIFY_OPTIONS)
            .await?;
        info!(count = candidates.len(), "Changes awaiting verification");

        let tested = match self.config.pick.pick(&candidates) {
            Some(change) => Some(self.test_candidate(change).await),
            None => None,
        };

        let ready = self
            .review
            .query(&self.config.merge_query, MERGE_OPTIONS)
            .await?;
        info!(count = ready.len(), "Changes ready to merge");
        let merge = self.merger.merge_ready(&ready).await;

        Ok(CycleReport {
            cycle_id,
            started_at,
            tested,
            merge,
        })
    }

    async fn test_candidate(&self, change: &Change) -> TestedCandidate {
        info!(change_id = %change.id, change = %change.display_ref(), "Verifying");
        let outcome = match self.tester.test_change(change).await {
            Ok(true) => CandidateOutcome::Passed,
            Ok(false) => CandidateOutcome::Failed,
            Err(e) => {
                error!(change_id = %change.id, error = %e, "Error testing change");
                CandidateOutcome::Error {
                    error: e.to_string(),
                }
            }
        };
        TestedCandidate {
            change_id: change.id.clone(),
            outcome,
        }
    }

    /// Cycle until `shutdown` fires; returns the number of cycles run.
    ///
    /// Shutdown is observed between cycles and while sleeping. A cycle in
    /// progress always runs to completion.
    pub async fn run_until(&self, mut shutdown: ShutdownSignal) -> u64 {
        let mut cycles = 0u64;

        while !shutdown.is_triggered() {
            match self.run_cycle().await {
                Ok(report) => info!(
                    cycle_id = %report.cycle_id,
                    tested = ?report.tested.as_ref().map(|t| t.change_id.as_str()),
                    merged = report.merge.merged().len(),
                    "Cycle complete"
                ),
                Err(e) => error!(error = %e, "Cycle failed, sleeping and retrying"),
            }
            cycles += 1;

            if shutdown.is_triggered() {
                break;
            }
            let delay = self.config.schedule.next_delay();
            debug!(delay_secs = delay.as_secs_f64(), "Sleeping");
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = self.sleeper.sleep(delay) => {}
            }
        }

        info!(cycles, "Poll loop stopped");
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_review::fakes::change;

    #[test]
    fn test_pick() {
        let changes = vec![change("a", "1", true), change("b", "2", true)];
        assert_eq!(CandidatePick::Last.pick(&changes).unwrap().id, "b");
        assert_eq!(CandidatePick::First.pick(&changes).unwrap().id, "a");
        assert!(CandidatePick::default().pick(&[]).is_none());
    }

    #[test]
    fn test_pick_parse() {
        assert_eq!("first".parse::<CandidatePick>().unwrap(), CandidatePick::First);
        assert_eq!("LAST".parse::<CandidatePick>().unwrap(), CandidatePick::Last);
        assert!("middle".parse::<CandidatePick>().is_err());
        assert_eq!(CandidatePick::First.to_string(), "first");
    }

    #[test]
    fn test_default_config() {
        let config = PollConfig::default();
        assert_eq!(config.verify_query, DEFAULT_VERIFY_QUERY);
        assert_eq!(config.merge_query, DEFAULT_MERGE_QUERY);
        assert_eq!(config.pick, CandidatePick::Last);
        assert_eq!(config.schedule.interval_secs, 60);
        assert_eq!(config.fetch_schemes, vec!["ssh".to_string()]);
    }

    #[test]
    fn test_config_deserializes_with_lowercase_pick() {
        let config: PollConfig = serde_json::from_value(serde_json::json!({
            "verify_query": "status:open",
            "merge_query": "status:open label:Verified+1",
            "pick": "first",
            "schedule": { "interval_secs": 5, "jitter_secs": 1 },
            "fetch_schemes": ["http", "ssh"]
        }))
        .unwrap();
        assert_eq!(config.pick, CandidatePick::First);
        assert_eq!(config.schedule, PollSchedule::new(5, 1));
    }

    #[test]
    fn test_merge_options_request_submittable() {
        assert!(MERGE_OPTIONS.contains(&QueryOption::Submittable));
        assert!(!VERIFY_OPTIONS.contains(&QueryOption::Submittable));
    }
}
