//! Change model as returned by the review service.
//!
//! Only the fields the gatekeeper consumes are decoded; everything else in
//! the service's `ChangeInfo` payload is ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ReviewError, Result};

/// Label the gatekeeper votes on.
pub const VERIFIED_LABEL: &str = "Verified";

/// Label humans use to approve a change.
pub const CODE_REVIEW_LABEL: &str = "Code-Review";

/// Fetch scheme preferred when resolving where to pull a revision from.
pub const DEFAULT_FETCH_SCHEME: &str = "ssh";

/// One proposed change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Change {
    /// Stable change identifier (`project~branch~Change-Id` triplet).
    pub id: String,

    /// Revision id (commit SHA) of the latest patch set.
    pub current_revision: String,

    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub subject: Option<String>,

    /// Numeric change number.
    #[serde(rename = "_number", default)]
    pub number: Option<u64>,

    /// Revisions keyed by revision id. With `CURRENT_REVISION` only the
    /// current one is present.
    #[serde(default)]
    pub revisions: BTreeMap<String, RevisionInfo>,

    /// Label summaries keyed by label name.
    #[serde(default)]
    pub labels: BTreeMap<String, LabelInfo>,

    /// Whether the service would accept a submit right now.
    #[serde(default)]
    pub submittable: bool,
}

/// A single patch set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RevisionInfo {
    #[serde(rename = "_number", default)]
    pub number: Option<u32>,

    /// Fetch commands keyed by scheme (`ssh`, `http`, `anonymous http`).
    #[serde(default)]
    pub fetch: BTreeMap<String, FetchInfo>,
}

/// Where a revision's content can be fetched from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchInfo {
    pub url: String,

    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// Label summary. Vote holders are kept as raw JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disliked: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
}

impl Change {
    /// Fetch metadata of the current revision, trying `schemes` in order.
    pub fn fetch_info(&self, schemes: &[String]) -> Result<&FetchInfo> {
        self.revisions
            .get(&self.current_revision)
            .and_then(|rev| schemes.iter().find_map(|s| rev.fetch.get(s)))
            .ok_or_else(|| ReviewError::MissingFetchInfo {
                change_id: self.id.clone(),
                revision: self.current_revision.clone(),
            })
    }

    /// Label summary by name.
    pub fn label(&self, name: &str) -> Option<&LabelInfo> {
        self.labels.get(name)
    }

    /// Short human-readable reference for logs.
    pub fn display_ref(&self) -> String {
        match (self.number, &self.subject) {
            (Some(n), Some(subject)) => format!("{n} ({subject})"),
            (Some(n), None) => n.to_string(),
            _ => self.id.clone(),
        }
    }
}

/// Detail sections requested with a query (`o=` parameters).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryOption {
    Labels,
    CurrentRevision,
    DownloadCommands,
    Submittable,
}

impl QueryOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOption::Labels => "LABELS",
            QueryOption::CurrentRevision => "CURRENT_REVISION",
            QueryOption::DownloadCommands => "DOWNLOAD_COMMANDS",
            QueryOption::Submittable => "SUBMITTABLE",
        }
    }
}

/// Body of a review post.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewInput {
    pub message: String,

    #[serde(default)]
    pub labels: BTreeMap<String, i32>,
}

impl ReviewInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add (or replace) a label vote.
    pub fn with_label(mut self, label: &str, value: i32) -> Self {
        self.labels.insert(label.to_string(), value);
        self
    }

    pub fn label(&self, label: &str) -> Option<i32> {
        self.labels.get(label).copied()
    }
}
