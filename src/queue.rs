//! Job intake boundary. Jobs arrive as JSON files in an inbox
//! directory and replies are written to a reply directory; the core
//! loop only ever sees the parsed `Job`. Read failures are retried
//! indefinitely with a short backoff, malformed jobs are discarded.

use crate::artifacts::ArtifactSink;
use crate::command::{Navigate, SolveChallenge, TestCommand, CHALLENGE_PROMPT};
use crate::config::RunConfig;
use crate::error::AgentError;
use crate::oracle::ActionOracle;
use crate::types::{Job, JobReply};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Test case string that routes to the challenge-solving command.
pub const SOLVE_CHALLENGE_CASE: &str = "solve-captcha";

const READ_FAILURE_BACKOFF: Duration = Duration::from_secs(3);
const EMPTY_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct DirJobQueue {
    inbox: PathBuf,
    replies: PathBuf,
}

impl DirJobQueue {
    pub fn new(inbox: impl Into<PathBuf>, replies: impl Into<PathBuf>) -> Self {
        Self { inbox: inbox.into(), replies: replies.into() }
    }

    /// Block until a well-formed job is available. Transient read
    /// failures never end the intake loop.
    pub async fn next_job(&self) -> (PathBuf, Job) {
        loop {
            match self.oldest_job_file() {
                Ok(Some(path)) => match self.read_job(&path) {
                    Ok(job) => {
                        info!("Picked up job {} from {}", job.id, path.display());
                        return (path, job);
                    }
                    Err(err) => {
                        warn!(
                            "Job file needs to include id, url and testCases[]. \
                             Discarding {}: {err}",
                            path.display()
                        );
                        if let Err(err) = fs::remove_file(&path) {
                            error!("could not discard malformed job file: {err}");
                        }
                    }
                },
                Ok(None) => tokio::time::sleep(EMPTY_POLL_INTERVAL).await,
                Err(err) => {
                    error!(
                        "Error reading from {}. Will try again in {}s. Msg: {err}",
                        self.inbox.display(),
                        READ_FAILURE_BACKOFF.as_secs()
                    );
                    tokio::time::sleep(READ_FAILURE_BACKOFF).await;
                }
            }
        }
    }

    /// Remove a processed job from the inbox.
    pub fn complete(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path) {
            error!("could not remove processed job {}: {err}", path.display());
        } else {
            info!("Processed and deleted job file {}", path.display());
        }
    }

    /// Hand the terminal status back on the reply channel.
    pub fn reply(&self, reply: &JobReply) -> Result<(), AgentError> {
        fs::create_dir_all(&self.replies)?;
        let path = self.replies.join(format!("{}.json", reply.id));
        let body = serde_json::to_string_pretty(reply)?;
        info!("Replying to {} with payload {body}", path.display());
        fs::write(path, body)?;
        Ok(())
    }

    fn oldest_job_file(&self) -> Result<Option<PathBuf>, std::io::Error> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.inbox)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        Ok(files.into_iter().next())
    }

    fn read_job(&self, path: &Path) -> Result<Job, AgentError> {
        let body = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Map a job's test cases onto a command chain. `solve-captcha`
/// routes to the challenge variant, everything else to `Navigate`.
pub fn commands_for_job(
    job: &Job,
    oracle: Arc<dyn ActionOracle>,
    artifacts: Arc<ArtifactSink>,
) -> Vec<Box<dyn TestCommand>> {
    let mut commands: Vec<Box<dyn TestCommand>> = Vec::with_capacity(job.test_cases.len());
    for case in &job.test_cases {
        if case.trim() == SOLVE_CHALLENGE_CASE {
            info!("Solving challenge for {}", job.url);
            let config = RunConfig::challenge(&job.url, CHALLENGE_PROMPT);
            commands.push(Box::new(SolveChallenge::new(
                config,
                Arc::clone(&oracle),
                Arc::clone(&artifacts),
            )));
        } else {
            info!("Test case: {case}");
            let config = RunConfig::default_persisted(&job.url, case, job.set_ids);
            commands.push(Box::new(Navigate::new(
                config,
                Arc::clone(&oracle),
                Arc::clone(&artifacts),
            )));
        }
    }
    commands
}
