//! In-memory fake of the review service (testing only)
//!
//! `MemoryReviewService` answers queries from canned results keyed by filter
//! string and records every call in order so tests can assert on side
//! effects and their sequence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::change::{Change, FetchInfo, QueryOption, ReviewInput, RevisionInfo};
use crate::error::{ReviewError, Result};
use crate::service::ReviewService;

/// A call observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Query {
        filter: String,
    },
    PostReview {
        change_id: String,
        revision_id: String,
        input: ReviewInput,
    },
    Submit {
        change_id: String,
        revision_id: String,
    },
}

#[derive(Debug, Default)]
pub struct MemoryReviewService {
    results: Mutex<HashMap<String, Vec<Change>>>,
    failing_queries: Mutex<HashSet<String>>,
    failing_submits: Mutex<HashMap<String, u16>>,
    calls: Mutex<Vec<Call>>,
}

impl MemoryReviewService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `filter` with `changes`. Unknown filters answer an empty list.
    pub fn set_results(&self, filter: &str, changes: Vec<Change>) {
        self.results
            .lock()
            .unwrap()
            .insert(filter.to_string(), changes);
    }

    /// Make queries for `filter` fail with HTTP 503.
    pub fn fail_query(&self, filter: &str) {
        self.failing_queries
            .lock()
            .unwrap()
            .insert(filter.to_string());
    }

    /// Make submits of `change_id` fail with the given HTTP status.
    pub fn fail_submit(&self, change_id: &str, status: u16) {
        self.failing_submits
            .lock()
            .unwrap()
            .insert(change_id.to_string(), status);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every posted review as `(change_id, input)`, in order.
    pub fn reviews(&self) -> Vec<(String, ReviewInput)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostReview {
                    change_id, input, ..
                } => Some((change_id, input)),
                _ => None,
            })
            .collect()
    }

    /// Change ids of every submit attempt, successful or not, in order.
    pub fn submit_attempts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit { change_id, .. } => Some(change_id),
                _ => None,
            })
            .collect()
    }

    /// Whether anything other than a query happened.
    pub fn has_side_effects(&self) -> bool {
        self.calls()
            .iter()
            .any(|c| !matches!(c, Call::Query { .. }))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ReviewService for MemoryReviewService {
    async fn query(&self, filter: &str, _options: &[QueryOption]) -> Result<Vec<Change>> {
        self.record(Call::Query {
            filter: filter.to_string(),
        });
        if self.failing_queries.lock().unwrap().contains(filter) {
            return Err(ReviewError::Http {
                status: 503,
                reason: "Service Unavailable".to_string(),
                url: format!("memory://changes/?q={filter}"),
                body: String::new(),
            });
        }
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(filter)
            .cloned()
            .unwrap_or_default())
    }

    async fn post_review(
        &self,
        change_id: &str,
        revision_id: &str,
        input: &ReviewInput,
    ) -> Result<()> {
        self.record(Call::PostReview {
            change_id: change_id.to_string(),
            revision_id: revision_id.to_string(),
            input: input.clone(),
        });
        Ok(())
    }

    async fn submit(&self, change_id: &str, revision_id: &str) -> Result<()> {
        self.record(Call::Submit {
            change_id: change_id.to_string(),
            revision_id: revision_id.to_string(),
        });
        if let Some(status) = self.failing_submits.lock().unwrap().get(change_id) {
            return Err(ReviewError::Http {
                status: *status,
                reason: "Conflict".to_string(),
                url: format!("memory://changes/{change_id}/revisions/{revision_id}/submit"),
                body: "change could not be merged".to_string(),
            });
        }
        Ok(())
    }
}

/// Build a change with one ssh-fetchable current revision.
pub fn change(id: &str, revision: &str, submittable: bool) -> Change {
    let mut fetch = BTreeMap::new();
    fetch.insert(
        "ssh".to_string(),
        FetchInfo {
            url: format!("ssh://review.example.com:29418/{id}"),
            git_ref: format!("refs/changes/{id}/1"),
        },
    );
    let mut revisions = BTreeMap::new();
    revisions.insert(
        revision.to_string(),
        RevisionInfo {
            number: Some(1),
            fetch,
        },
    );

    Change {
        id: id.to_string(),
        current_revision: revision.to_string(),
        project: None,
        branch: None,
        subject: None,
        number: None,
        revisions,
        labels: BTreeMap::new(),
        submittable,
    }
}
