//! gatekeeperd - CI gatekeeper for a Gerrit-style review service
//!
//! Every cycle the daemon:
//! - tests one change that has no Verified vote and votes +1/-1 with a log link
//! - retests and submits every change that is verified and approved
//! - sleeps, then repeats until interrupted

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gatekeeper_ci::{PipelineConfig, SandboxRunner};
use gatekeeper_core::{
    default_level, init_tracing, shutdown_channel, CandidatePick, DirectoryPasteStore,
    HttpPasteClient, LogFormat, PasteConfig, PasteService, PollConfig, PollLoop, PollSchedule,
    DEFAULT_MERGE_QUERY, DEFAULT_PASTE_ENDPOINT, DEFAULT_VERIFY_QUERY,
};
use gatekeeper_review::{GerritClient, ReviewConfig, DEFAULT_FETCH_SCHEME};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gatekeeperd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify and merge changes on a code review service", long_about = None)]
struct Cli {
    /// Review service host name (REST API at https://<host>/a)
    #[arg(env = "GATEKEEPER_HOST")]
    host: String,

    /// HTTP user name
    #[arg(env = "GATEKEEPER_HTTP_USER")]
    username: String,

    /// HTTP password
    #[arg(env = "GATEKEEPER_HTTP_PASSWORD", hide_env_values = true)]
    password: String,

    /// Seconds to sleep between cycles
    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    /// Upper bound of random extra delay per sleep, in seconds
    #[arg(long, default_value_t = 0)]
    jitter_secs: u64,

    /// Branch changes are rebased onto before building
    #[arg(long, default_value = "master")]
    mainline: String,

    /// Shell command that builds and tests the checkout
    #[arg(long, default_value = "wercker build")]
    build_command: String,

    /// Timeout for each git step, in seconds
    #[arg(long, default_value_t = 600)]
    stage_timeout_secs: u64,

    /// Timeout for the build command, in seconds
    #[arg(long, default_value_t = 3600)]
    build_timeout_secs: u64,

    /// Timeout for each HTTP request, in seconds
    #[arg(long, default_value_t = 60)]
    http_timeout_secs: u64,

    /// Candidate tested when several changes await verification (first|last)
    #[arg(long, default_value_t = CandidatePick::Last)]
    pick: CandidatePick,

    /// Download scheme to fetch changes from; repeat to set a preference order
    #[arg(long = "fetch-scheme", default_value = DEFAULT_FETCH_SCHEME)]
    fetch_schemes: Vec<String>,

    /// Paste service endpoint for build transcripts
    #[arg(long, default_value = DEFAULT_PASTE_ENDPOINT)]
    paste_endpoint: String,

    /// Store transcripts in this directory instead of a paste service
    #[arg(long, conflicts_with = "paste_endpoint")]
    paste_dir: Option<PathBuf>,

    /// Public URL the paste directory is served under
    #[arg(long, requires = "paste_dir")]
    paste_base_url: Option<String>,

    /// Directory sandboxes are created in (default: system temp dir)
    #[arg(long)]
    sandbox_root: Option<PathBuf>,

    /// Query for changes awaiting verification
    #[arg(long, default_value = DEFAULT_VERIFY_QUERY)]
    verify_query: String,

    /// Query for changes ready to merge
    #[arg(long, default_value = DEFAULT_MERGE_QUERY)]
    merge_query: String,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn review_config(&self) -> ReviewConfig {
        ReviewConfig::for_host(&self.host, &self.username, &self.password)
            .with_timeout_secs(self.http_timeout_secs)
    }

    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            mainline: self.mainline.clone(),
            build_command: self.build_command.clone(),
            git_timeout_secs: self.stage_timeout_secs,
            build_timeout_secs: self.build_timeout_secs,
            sandbox_root: self.sandbox_root.clone(),
        }
    }

    fn poll_config(&self) -> PollConfig {
        PollConfig {
            verify_query: self.verify_query.clone(),
            merge_query: self.merge_query.clone(),
            pick: self.pick,
            schedule: PollSchedule::new(self.interval_secs, self.jitter_secs),
            fetch_schemes: self.fetch_schemes.clone(),
        }
    }

    fn paste_service(&self) -> Result<Arc<dyn PasteService>> {
        if let Some(dir) = &self.paste_dir {
            let mut store = DirectoryPasteStore::new(dir)
                .with_context(|| format!("Failed to open paste directory {}", dir.display()))?;
            if let Some(base) = &self.paste_base_url {
                store = store.with_public_base_url(base.as_str());
            }
            return Ok(Arc::new(store));
        }

        let client = HttpPasteClient::new(PasteConfig {
            endpoint: self.paste_endpoint.clone(),
            timeout_secs: self.http_timeout_secs,
        })
        .context("Failed to build paste client")?;
        Ok(Arc::new(client))
    }

    fn build_loop(&self) -> Result<PollLoop> {
        let review =
            GerritClient::new(self.review_config()).context("Failed to build review client")?;
        let builder = SandboxRunner::new(self.pipeline_config());
        Ok(PollLoop::new(
            Arc::new(review),
            self.paste_service()?,
            Arc::new(builder),
            self.poll_config(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(LogFormat::from_json_flag(cli.json), default_level(cli.verbose));

    let poll = cli.build_loop()?;
    info!(
        host = %cli.host,
        user = %cli.username,
        interval_secs = cli.interval_secs,
        pick = %cli.pick,
        "gatekeeperd started"
    );

    if cli.once {
        let report = poll.run_cycle().await.context("Cycle failed")?;
        info!(
            cycle_id = %report.cycle_id,
            merged = report.merge.merged().len(),
            "Single cycle complete"
        );
        return Ok(());
    }

    let (trigger, signal) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current cycle (press again to abort)");
        trigger.trigger();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let cycles = poll.run_until(signal).await;
    info!(cycles, "gatekeeperd stopped");
    Ok(())
}
