//! The review-service seam.
//!
//! The gatekeeper only ever needs three operations from the review service.
//! `GerritClient` implements them over HTTP; `fakes::MemoryReviewService`
//! implements them in memory for tests.

use async_trait::async_trait;

use crate::change::{Change, QueryOption, ReviewInput};
use crate::error::Result;

#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Search changes. The service's ordering is preserved.
    async fn query(&self, filter: &str, options: &[QueryOption]) -> Result<Vec<Change>>;

    /// Post a review on one revision. Our own previous vote is overwritten.
    async fn post_review(
        &self,
        change_id: &str,
        revision_id: &str,
        input: &ReviewInput,
    ) -> Result<()>;

    /// Merge one revision.
    async fn submit(&self, change_id: &str, revision_id: &str) -> Result<()>;
}
