//! End-to-end poll cycles against in-memory collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_ci::{BuildResult, BuildRunner, FetchTarget, Pipeline, SandboxResult};
use gatekeeper_core::fakes::{MemoryPaste, RecordingSleeper, ScriptedBuildRunner};
use gatekeeper_core::{
    shutdown_channel, CandidateOutcome, CandidatePick, MergeOutcome, PollConfig, PollLoop,
    PollSchedule, DEFAULT_MERGE_QUERY, DEFAULT_VERIFY_QUERY,
};
use gatekeeper_review::fakes::{change, Call, MemoryReviewService};
use gatekeeper_review::VERIFIED_LABEL;

/// Runs a fixed command list in a real sandbox, whatever the target.
struct CommandRunner {
    commands: Vec<String>,
    sandbox_parent: PathBuf,
}

#[async_trait]
impl BuildRunner for CommandRunner {
    async fn build(&self, _target: &FetchTarget) -> SandboxResult<BuildResult> {
        Pipeline::from_commands(self.commands.clone(), 60)?
            .run(&self.sandbox_parent)
            .await
    }
}

struct Fixture {
    review: Arc<MemoryReviewService>,
    paste: Arc<MemoryPaste>,
    builder: Arc<ScriptedBuildRunner>,
    poll: PollLoop,
}

fn fixture(config: PollConfig) -> Fixture {
    let review = Arc::new(MemoryReviewService::new());
    let paste = Arc::new(MemoryPaste::new());
    let builder = Arc::new(ScriptedBuildRunner::new());
    let poll = PollLoop::new(review.clone(), paste.clone(), builder.clone(), config);
    Fixture {
        review,
        paste,
        builder,
        poll,
    }
}

fn votes(review: &MemoryReviewService) -> Vec<(String, Option<i32>)> {
    review
        .reviews()
        .into_iter()
        .map(|(id, input)| (id, input.label(VERIFIED_LABEL)))
        .collect()
}

#[tokio::test]
async fn empty_queries_have_no_side_effects() {
    let f = fixture(PollConfig::default());

    let report = f.poll.run_cycle().await.expect("cycle");

    assert!(report.tested.is_none());
    assert!(report.merge.is_empty());
    assert!(!f.review.has_side_effects());
    assert_eq!(
        f.review.calls(),
        vec![
            Call::Query {
                filter: DEFAULT_VERIFY_QUERY.to_string()
            },
            Call::Query {
                filter: DEFAULT_MERGE_QUERY.to_string()
            },
        ]
    );
    assert!(f.builder.targets().is_empty());
    assert!(f.paste.uploads().is_empty());
}

#[tokio::test]
async fn empty_cycle_then_sleeps_for_interval() {
    let f = fixture(PollConfig::default());
    let (trigger, signal) = shutdown_channel();
    let sleeper = Arc::new(RecordingSleeper::stop_after(Arc::new(trigger), 1));
    let poll = f.poll.with_sleeper(sleeper.clone());

    let cycles = poll.run_until(signal).await;

    assert_eq!(cycles, 1);
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(60)]);
    assert!(!f.review.has_side_effects());
}

#[tokio::test]
async fn cycle_tests_last_candidate_then_merges_in_reverse() {
    let f = fixture(PollConfig::default());
    f.review.set_results(
        DEFAULT_VERIFY_QUERY,
        vec![change("new1", "n1", false), change("new2", "n2", false)],
    );
    f.review.set_results(
        DEFAULT_MERGE_QUERY,
        vec![
            change("c3", "r3", true),
            change("c2", "r2", true),
            change("c1", "r1", true),
        ],
    );

    let report = f.poll.run_cycle().await.expect("cycle");

    let tested = report.tested.expect("a candidate was tested");
    assert_eq!(tested.change_id, "new2");
    assert_eq!(tested.outcome, CandidateOutcome::Passed);
    assert_eq!(report.merge.merged(), vec!["c1", "c2", "c3"]);
    assert_eq!(f.review.submit_attempts(), vec!["c1", "c2", "c3"]);
    assert_eq!(
        votes(&f.review),
        vec![
            ("new2".to_string(), Some(1)),
            ("c1".to_string(), Some(1)),
            ("c2".to_string(), Some(1)),
            ("c3".to_string(), Some(1)),
        ]
    );
}

#[tokio::test]
async fn pick_first_tests_first_candidate() {
    let f = fixture(PollConfig {
        pick: CandidatePick::First,
        ..Default::default()
    });
    f.review.set_results(
        DEFAULT_VERIFY_QUERY,
        vec![change("new1", "n1", false), change("new2", "n2", false)],
    );

    let report = f.poll.run_cycle().await.expect("cycle");

    assert_eq!(report.tested.unwrap().change_id, "new1");
    assert_eq!(f.builder.built_refs(), vec!["refs/changes/new1/1"]);
}

#[tokio::test]
async fn candidate_error_does_not_stop_merge_phase() {
    let f = fixture(PollConfig::default());
    f.builder.error_ref("refs/changes/bad/1");
    f.review
        .set_results(DEFAULT_VERIFY_QUERY, vec![change("bad", "b1", false)]);
    f.review
        .set_results(DEFAULT_MERGE_QUERY, vec![change("c1", "r1", true)]);

    let report = f.poll.run_cycle().await.expect("cycle");

    assert!(matches!(
        report.tested.unwrap().outcome,
        CandidateOutcome::Error { .. }
    ));
    assert_eq!(report.merge.merged(), vec!["c1"]);
    assert_eq!(votes(&f.review), vec![("c1".to_string(), Some(1))]);
}

#[tokio::test]
async fn submit_conflict_skips_to_next_change() {
    let f = fixture(PollConfig::default());
    f.review.fail_submit("c1", 409);
    f.review.set_results(
        DEFAULT_MERGE_QUERY,
        vec![change("c2", "r2", true), change("c1", "r1", true)],
    );

    let report = f.poll.run_cycle().await.expect("cycle");

    assert_eq!(f.review.submit_attempts(), vec!["c1", "c2"]);
    assert!(matches!(
        report.merge.outcome_of("c1"),
        Some(MergeOutcome::SubmitFailed {
            status: Some(409),
            ..
        })
    ));
    assert_eq!(report.merge.merged(), vec!["c2"]);
}

#[tokio::test]
async fn query_failure_fails_cycle_but_loop_continues() {
    let f = fixture(PollConfig::default());
    f.review.fail_query(DEFAULT_VERIFY_QUERY);

    assert!(f.poll.run_cycle().await.is_err());

    let (trigger, signal) = shutdown_channel();
    let sleeper = Arc::new(RecordingSleeper::stop_after(Arc::new(trigger), 3));
    let poll = f.poll.with_sleeper(sleeper.clone());

    let cycles = poll.run_until(signal).await;

    assert_eq!(cycles, 3);
    assert_eq!(sleeper.delays().len(), 3);
    assert!(!f.review.has_side_effects());
}

#[tokio::test]
async fn merge_query_failure_keeps_candidate_vote() {
    let f = fixture(PollConfig::default());
    f.review.fail_query(DEFAULT_MERGE_QUERY);
    f.review
        .set_results(DEFAULT_VERIFY_QUERY, vec![change("new1", "n1", false)]);

    assert!(f.poll.run_cycle().await.is_err());
    assert_eq!(votes(&f.review), vec![("new1".to_string(), Some(1))]);
}

#[tokio::test]
async fn shutdown_before_start_runs_no_cycles() {
    let f = fixture(PollConfig::default());
    let (trigger, signal) = shutdown_channel();
    trigger.trigger();

    let cycles = f.poll.run_until(signal).await;

    assert_eq!(cycles, 0);
    assert!(f.review.calls().is_empty());
}

#[tokio::test]
async fn jittered_delays_stay_in_range() {
    let f = fixture(PollConfig {
        schedule: PollSchedule::new(5, 2),
        ..Default::default()
    });
    let (trigger, signal) = shutdown_channel();
    let sleeper = Arc::new(RecordingSleeper::stop_after(Arc::new(trigger), 4));
    let poll = f.poll.with_sleeper(sleeper.clone());

    poll.run_until(signal).await;

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 4);
    for delay in delays {
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_secs(7));
    }
}

fn command_loop(
    commands: &[&str],
    parent: &tempfile::TempDir,
) -> (Arc<MemoryReviewService>, Arc<MemoryPaste>, PollLoop) {
    let review = Arc::new(MemoryReviewService::new());
    let paste = Arc::new(MemoryPaste::new());
    let runner = Arc::new(CommandRunner {
        commands: commands.iter().map(|c| c.to_string()).collect(),
        sandbox_parent: parent.path().to_path_buf(),
    });
    review.set_results(DEFAULT_VERIFY_QUERY, vec![change("c1", "r1", false)]);
    let poll = PollLoop::new(review.clone(), paste.clone(), runner, PollConfig::default());
    (review, paste, poll)
}

#[tokio::test]
async fn passing_commands_vote_plus_one() {
    let parent = tempfile::tempdir().unwrap();
    let (review, paste, poll) = command_loop(&["echo ok"], &parent);

    let report = poll.run_cycle().await.expect("cycle");

    assert_eq!(report.tested.unwrap().outcome, CandidateOutcome::Passed);
    let reviews = review.reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].1.label(VERIFIED_LABEL), Some(1));
    assert!(reviews[0].1.message.starts_with("Build succeeded (0m "));
    assert!(reviews[0].1.message.ends_with("s): https://paste.example.com/1"));
    assert!(paste.uploads()[0].contains("ok"));
    assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn failing_commands_vote_minus_one() {
    let parent = tempfile::tempdir().unwrap();
    let (review, paste, poll) = command_loop(&["exit 1", "echo never"], &parent);

    let report = poll.run_cycle().await.expect("cycle");

    assert_eq!(report.tested.unwrap().outcome, CandidateOutcome::Failed);
    let reviews = review.reviews();
    assert_eq!(reviews[0].1.label(VERIFIED_LABEL), Some(-1));
    assert!(reviews[0].1.message.starts_with("Build failed ("));
    let transcript = &paste.uploads()[0];
    assert!(transcript.contains("$ exit 1"));
    assert!(!transcript.contains("never"));
    assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
}
