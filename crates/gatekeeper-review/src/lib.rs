//! Gatekeeper review-service client
//!
//! Everything the gatekeeper needs from a Gerrit-style review service:
//! - `ReviewService`: the query / post-review / submit seam
//! - `GerritClient`: authenticated REST implementation
//! - `fakes::MemoryReviewService`: in-memory implementation for tests

pub mod change;
pub mod error;
pub mod fakes;
pub mod gerrit;
pub mod service;

pub use change::{
    Change, FetchInfo, LabelInfo, QueryOption, ReviewInput, RevisionInfo, CODE_REVIEW_LABEL,
    DEFAULT_FETCH_SCHEME, VERIFIED_LABEL,
};
pub use error::{Result, ReviewError};
pub use gerrit::{strip_magic_prefix, GerritClient, ReviewConfig};
pub use service::ReviewService;
