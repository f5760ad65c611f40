//! Gatekeeper core - verify, vote and merge
//!
//! Ties the review client and the sandbox pipeline together:
//! - `VerdictPipeline`: build a change and post a Verified vote with a log link
//! - `MergeCoordinator`: retest and submit merge-ready changes
//! - `PollLoop`: the long-running cycle with an injectable sleeper

pub mod error;
pub mod fakes;
pub mod merge;
pub mod paste;
pub mod poll;
pub mod reporter;
pub mod schedule;
pub mod telemetry;

pub use error::{CoreError, PasteError, Result};
pub use merge::{MergeAttempt, MergeCoordinator, MergeOutcome, MergeReport};
pub use paste::{
    DirectoryPasteStore, HttpPasteClient, PasteConfig, PasteService, DEFAULT_PASTE_ENDPOINT,
};
pub use poll::{
    CandidateOutcome, CandidatePick, CycleReport, PollConfig, PollLoop, TestedCandidate,
    DEFAULT_MERGE_QUERY, DEFAULT_VERIFY_QUERY,
};
pub use reporter::{format_message, Verdict, VerdictPipeline, VerdictReporter};
pub use schedule::{
    shutdown_channel, PollSchedule, ShutdownSignal, ShutdownTrigger, Sleeper, TokioSleeper,
};
pub use telemetry::{default_level, init_tracing, LogFormat};
