//! Turning build results into Verified votes.

use std::sync::Arc;

use gatekeeper_ci::{BuildResult, BuildRunner, FetchTarget};
use gatekeeper_review::{Change, ReviewInput, ReviewService, DEFAULT_FETCH_SCHEME, VERIFIED_LABEL};
use tracing::info;

use crate::error::Result;
use crate::paste::PasteService;

/// Pass/fail outcome of a build, as voted on the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn from_success(success: bool) -> Self {
        if success {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// Value posted on the `Verified` label.
    pub fn vote(&self) -> i32 {
        match self {
            Verdict::Pass => 1,
            Verdict::Fail => -1,
        }
    }

    pub fn as_word(&self) -> &'static str {
        match self {
            Verdict::Pass => "succeeded",
            Verdict::Fail => "failed",
        }
    }
}

/// `Build succeeded (1m 5s): <url>`
pub fn format_message(verdict: Verdict, elapsed_secs: u64, url: &str) -> String {
    format!(
        "Build {} ({}m {}s): {}",
        verdict.as_word(),
        elapsed_secs / 60,
        elapsed_secs % 60,
        url
    )
}

/// Uploads the transcript and posts the vote.
pub struct VerdictReporter {
    review: Arc<dyn ReviewService>,
    paste: Arc<dyn PasteService>,
}

impl VerdictReporter {
    pub fn new(review: Arc<dyn ReviewService>, paste: Arc<dyn PasteService>) -> Self {
        Self { review, paste }
    }

    /// Publish `result` on the change's current revision.
    ///
    /// Returns the build's success flag. Paste and review failures propagate
    /// and no vote is posted if the upload fails.
    pub async fn report(&self, change: &Change, result: &BuildResult) -> Result<bool> {
        let url = self.paste.upload(&result.output).await?;
        let verdict = Verdict::from_success(result.success);
        let message = format_message(verdict, result.elapsed_secs(), &url);

        info!(
            change_id = %change.id,
            revision = %change.current_revision,
            vote = verdict.vote(),
            elapsed_secs = result.elapsed_secs(),
            "{}",
            message
        );

        let input = ReviewInput::new(message).with_label(VERIFIED_LABEL, verdict.vote());
        self.review
            .post_review(&change.id, &change.current_revision, &input)
            .await?;

        Ok(result.success)
    }
}

/// Fetch, build and vote on one change.
pub struct VerdictPipeline {
    builder: Arc<dyn BuildRunner>,
    reporter: VerdictReporter,
    fetch_schemes: Vec<String>,
}

impl VerdictPipeline {
    pub fn new(
        review: Arc<dyn ReviewService>,
        paste: Arc<dyn PasteService>,
        builder: Arc<dyn BuildRunner>,
    ) -> Self {
        Self {
            builder,
            reporter: VerdictReporter::new(review, paste),
            fetch_schemes: vec![DEFAULT_FETCH_SCHEME.to_string()],
        }
    }

    /// Download schemes to try, in preference order.
    pub fn with_fetch_schemes(mut self, schemes: Vec<String>) -> Self {
        self.fetch_schemes = schemes;
        self
    }

    pub fn reporter(&self) -> &VerdictReporter {
        &self.reporter
    }

    /// Test the change's current revision and post the verdict.
    pub async fn test_change(&self, change: &Change) -> Result<bool> {
        let fetch = change.fetch_info(&self.fetch_schemes)?;
        let target = FetchTarget::new(&fetch.url, &fetch.git_ref);
        info!(change_id = %change.id, revision = %change.current_revision, "Testing change");

        let result = self.builder.build(&target).await?;
        self.reporter.report(change, &result).await
    }
}
