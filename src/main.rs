use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uiprobe::artifacts::ArtifactSink;
use uiprobe::command::{run_chain, Navigate, SolveChallenge, TestCommand, CHALLENGE_PROMPT};
use uiprobe::config::RunConfig;
use uiprobe::oracle::{ActionOracle, HttpOracle, OracleConfig};
use uiprobe::queue::{commands_for_job, DirJobQueue, SOLVE_CHALLENGE_CASE};
use uiprobe::types::{JobReply, RunStatus};

#[derive(Parser)]
#[command(name = "uiprobe", about = "LLM-driven UI test agent")]
struct Cli {
    /// Read jobs from this inbox directory instead of running a single test.
    #[arg(long)]
    jobs_dir: Option<PathBuf>,

    /// Where job replies are written in queue mode.
    #[arg(long, default_value = "replies")]
    replies_dir: PathBuf,

    /// Target URL for a single run.
    #[arg(long)]
    url: Option<String>,

    /// Test case description. Repeatable; cases run in order over one
    /// shared browser session.
    #[arg(long = "test-case")]
    test_cases: Vec<String>,

    /// Assign generated ids to unidentified elements.
    #[arg(long)]
    set_ids: bool,

    /// Pause after every action batch, in milliseconds.
    #[arg(long, default_value_t = 300)]
    delay_ms: u64,

    /// Decision-round budget per test case.
    #[arg(long, default_value_t = 100)]
    interactions: u32,

    /// Initial load pause and page-ready ceiling, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    load_wait_ms: u64,

    /// Local directory for screenshots.
    #[arg(long, default_value = "screenshots")]
    screenshots_dir: PathBuf,

    /// Artifact store root; screenshots are copied under
    /// <store>/<run-prefix>/ when set.
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Run the browser with a visible window.
    #[arg(long)]
    headed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting tests...");
    let cli = Cli::parse();
    let oracle: Arc<dyn ActionOracle> = Arc::new(HttpOracle::new(OracleConfig::from_env()?)?);

    match cli.jobs_dir.clone() {
        Some(inbox) => run_queue(cli, inbox, oracle).await,
        None => run_single(cli, oracle).await,
    }
}

/// Run the CLI-supplied test cases as one command chain.
async fn run_single(cli: Cli, oracle: Arc<dyn ActionOracle>) -> Result<()> {
    let url = cli
        .url
        .clone()
        .context("--url is required unless --jobs-dir is set")?;
    if cli.test_cases.is_empty() {
        anyhow::bail!("at least one --test-case is required");
    }

    let artifacts = Arc::new(ArtifactSink::new(&cli.screenshots_dir, cli.store_dir.clone()));
    info!("Saving screenshots to {}", artifacts.local_dir().display());
    let mut commands: Vec<Box<dyn TestCommand>> = Vec::with_capacity(cli.test_cases.len());
    for case in &cli.test_cases {
        if case.trim() == SOLVE_CHALLENGE_CASE {
            commands.push(Box::new(SolveChallenge::new(
                RunConfig::challenge(&url, CHALLENGE_PROMPT),
                Arc::clone(&oracle),
                Arc::clone(&artifacts),
            )));
        } else {
            let config = RunConfig::builder()
                .url(&url)
                .test_case(case)
                .set_ids(cli.set_ids)
                .delay(Duration::from_millis(cli.delay_ms))
                .interactions(cli.interactions)
                .load_wait(Duration::from_millis(cli.load_wait_ms))
                .persist_artifacts(cli.store_dir.is_some())
                .headless(!cli.headed)
                .build()
                .map_err(anyhow::Error::msg)?;
            commands.push(Box::new(Navigate::new(
                config,
                Arc::clone(&oracle),
                Arc::clone(&artifacts),
            )));
        }
    }

    let status = run_chain(&mut commands).await?;
    info!("Overall status: {}", status.as_str());
    Ok(())
}

/// Process jobs from the inbox directory, one at a time, forever.
async fn run_queue(cli: Cli, inbox: PathBuf, oracle: Arc<dyn ActionOracle>) -> Result<()> {
    info!("Reading jobs from {}", inbox.display());
    let queue = DirJobQueue::new(&inbox, &cli.replies_dir);
    let store_label = cli
        .store_dir
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "local".to_string());

    loop {
        let (path, job) = queue.next_job().await;
        info!("URL: {}", job.url);
        info!("Set IDs: {}", job.set_ids);

        let artifacts = Arc::new(ArtifactSink::new(&cli.screenshots_dir, cli.store_dir.clone()));
        let mut commands = commands_for_job(&job, Arc::clone(&oracle), Arc::clone(&artifacts));

        // An errored chain still produces a FAIL reply; the session
        // was already torn down inside run_chain.
        let status = match run_chain(&mut commands).await {
            Ok(status) => status,
            Err(err) => {
                error!("Error running job {}: {err}", job.id);
                RunStatus::Fail
            }
        };

        let reply = JobReply {
            status: status.as_str().to_string(),
            id: job.id.clone(),
            s3_prefix: format!("{store_label}/{}", artifacts.prefix()),
        };
        if let Err(err) = queue.reply(&reply) {
            error!("Error sending reply for job {}: {err}", job.id);
        }
        queue.complete(&path);
    }
}
