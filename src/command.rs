//! Navigation commands and the chain that sequences them over one
//! shared browser session. `Navigate` runs the perception-action
//! loop; `SolveChallenge` runs the bounded-free challenge loop. Both
//! are independent variants of the same capability trait; shared
//! sanitization, catalog and prompt logic lives in the sibling
//! modules, not in a base type.

use crate::artifacts::ArtifactSink;
use crate::catalog;
use crate::config::RunConfig;
use crate::error::AgentError;
use crate::executor;
use crate::oracle::ActionOracle;
use crate::parser;
use crate::prompt;
use crate::sanitizer;
use crate::session::BrowserSession;
use crate::types::{ActionRecord, OracleReply, RunStatus, TerminalVerdict, VerdictStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Page content that signals the challenge round must be retried.
const CHALLENGE_RETRY_MARKER: &str = "type the characters you see";

/// Prompt used by the challenge-solving command.
pub const CHALLENGE_PROMPT: &str = "Human: Answer the following captcha. Your answer should \
output ONLY the value of the captcha\nAssistant: The answer to the captcha is ";

/// A navigation step. `and_then` hands the browser session to the
/// next step and executes it immediately; `tear_down` closes the
/// session regardless of outcome.
#[async_trait]
pub trait TestCommand: Send {
    async fn execute(&mut self) -> Result<(), AgentError>;

    /// The session slot this command owns, if any. Used for explicit
    /// handoff; no command touches a peer's session directly.
    fn session_mut(&mut self) -> &mut Option<BrowserSession>;

    fn status(&self) -> RunStatus;

    async fn and_then(&mut self, next: &mut dyn TestCommand) -> Result<(), AgentError> {
        if let Some(session) = self.session_mut().take() {
            *next.session_mut() = Some(session);
        }
        next.execute().await
    }

    fn tear_down(&mut self) {
        if let Some(session) = self.session_mut().take() {
            session.shutdown();
        }
    }
}

/// Execute a chain of commands over one shared session, tearing the
/// session down on every exit path. Overall status is SUCCEED only if
/// every executed command succeeded.
pub async fn run_chain(commands: &mut [Box<dyn TestCommand>]) -> Result<RunStatus, AgentError> {
    if commands.is_empty() {
        return Ok(RunStatus::Fail);
    }

    let mut overall = RunStatus::Succeed;
    let mut outcome: Result<(), AgentError> = Ok(());
    let mut holder = 0;

    for index in 0..commands.len() {
        let result = if index == 0 {
            commands[0].execute().await
        } else {
            let (done, rest) = commands.split_at_mut(index);
            done[index - 1].and_then(rest[0].as_mut()).await
        };
        holder = index;
        if let Err(err) = result {
            outcome = Err(err);
            break;
        }
        if commands[index].status() == RunStatus::Fail {
            overall = RunStatus::Fail;
        }
    }

    commands[holder].tear_down();
    outcome.map(|_| overall)
}

/// Mutable loop state, created at loop entry and discarded at exit.
#[derive(Default)]
struct LoopState {
    step: u32,
    history: Vec<ActionRecord>,
}

enum RoundOutcome {
    Continue,
    Verdict(TerminalVerdict),
}

/// One decision round, fed the remaining budget.
#[async_trait]
trait RoundSource: Send {
    async fn next_round(&mut self, remaining: u32) -> Result<RoundOutcome, AgentError>;
}

/// Run decision rounds until a verdict lands or the budget is spent.
/// At most `interactions` rounds ever run; recoverable round errors
/// spend their round and the loop moves on.
async fn drive_rounds(
    interactions: u32,
    source: &mut dyn RoundSource,
) -> Result<Option<TerminalVerdict>, AgentError> {
    for round in 0..interactions {
        let remaining = interactions - round;
        info!("Available interactions: {remaining}");
        match source.next_round(remaining).await {
            Ok(RoundOutcome::Verdict(verdict)) => return Ok(Some(verdict)),
            Ok(RoundOutcome::Continue) => {}
            Err(err) if err.is_recoverable() => {
                warn!("Round failed on the page, continuing with the next action: {err}");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(None)
}

/// Map the loop's exit onto a pass/fail flag. No verdict means the
/// budget ran out, which counts as failure.
fn conclude(verdict: Option<TerminalVerdict>) -> bool {
    match verdict {
        Some(verdict) => {
            info!(
                "Test finished. Status: {}. Explanation: {}",
                verdict.status, verdict.explanation
            );
            verdict.status == VerdictStatus::Success
        }
        None => {
            info!("Interaction budget exhausted without a verdict");
            false
        }
    }
}

/// The perception-action loop: observe page state, ask the oracle,
/// execute its actions, until a verdict lands or the budget runs out.
pub struct Navigate {
    config: RunConfig,
    oracle: Arc<dyn ActionOracle>,
    artifacts: Arc<ArtifactSink>,
    session: Option<BrowserSession>,
    state: LoopState,
    success: bool,
}

impl Navigate {
    pub fn new(config: RunConfig, oracle: Arc<dyn ActionOracle>, artifacts: Arc<ArtifactSink>) -> Self {
        Self {
            config,
            oracle,
            artifacts,
            session: None,
            state: LoopState::default(),
            success: false,
        }
    }

    async fn decision_round(&mut self, remaining: u32) -> Result<RoundOutcome, AgentError> {
        let Some(session) = self.session.as_ref() else {
            return Err(AgentError::Browser("no session for decision round".into()));
        };

        session.wait_document_ready(self.config.load_wait)?;

        let elements = catalog::discover(&session.tab, self.config.set_ids)?;
        if self.config.set_ids {
            catalog::write_back_ids(&elements);
        }

        let html = sanitizer::sanitize(&session.page_source()?);
        let compressed = sanitizer::compress_markup(&html);
        info!("HTML length: {}", html.len());
        info!("HTML compressed length: {}", compressed.len());

        let prompt = prompt::build(
            &compressed,
            &self.config.test_case,
            &self.state.history,
            remaining,
            &catalog::summaries(&elements),
        );
        info!("Prompt length: {}", prompt.len());

        let screenshot = session.screenshot_png()?;
        if let Err(err) = self.artifacts.save_screenshot(&screenshot) {
            warn!("could not persist round screenshot: {err}");
        }

        let raw = self.oracle.invoke_with_image(&prompt, &screenshot).await?;
        match parser::parse_reply(&raw)? {
            OracleReply::Verdict(verdict) => {
                if let Ok(png) = session.screenshot_png() {
                    let _ = self.artifacts.save_screenshot(&png);
                }
                Ok(RoundOutcome::Verdict(verdict))
            }
            OracleReply::Step(decision) => {
                self.state.step += 1;
                let actions_taken = serde_json::to_string(&decision.actions)?;
                info!("Step #{}. Explanation: {}", self.state.step, decision.explanation);
                info!("Step actions: {actions_taken}");

                let clicks =
                    executor::apply(&decision.actions, &elements, session, self.artifacts.as_ref());
                if clicks.is_empty() {
                    info!("No click action found");
                    self.state.history.push(ActionRecord {
                        step: self.state.step,
                        actions_taken,
                        explanation: decision.explanation,
                    });
                    // Snapshot handles are done for; nudge focus along
                    // instead of clicking.
                    drop(clicks);
                    drop(elements);
                    session.press_tab_enter()?;
                    return Ok(RoundOutcome::Continue);
                }

                for target in &clicks {
                    info!("Clicking on {}", target.id);
                    if let Err(err) = target.handle.click() {
                        warn!("click on `{}` failed, continuing: {err}", target.id);
                    }
                }
                self.state.history.push(ActionRecord {
                    step: self.state.step,
                    actions_taken,
                    explanation: decision.explanation,
                });
                tokio::time::sleep(self.config.delay).await;
                Ok(RoundOutcome::Continue)
            }
        }
    }
}

#[async_trait]
impl RoundSource for Navigate {
    async fn next_round(&mut self, remaining: u32) -> Result<RoundOutcome, AgentError> {
        self.decision_round(remaining).await
    }
}

#[async_trait]
impl TestCommand for Navigate {
    async fn execute(&mut self) -> Result<(), AgentError> {
        info!("Executing test case: {}", self.config.test_case);

        if self.session.is_none() {
            let session = BrowserSession::launch(self.config.headless)?;
            session.navigate(&self.config.url)?;
            tokio::time::sleep(self.config.load_wait).await;
            self.session = Some(session);
        }

        self.state = LoopState::default();
        let budget = self.config.interactions;
        let verdict = drive_rounds(budget, &mut *self).await?;
        self.success = conclude(verdict);
        Ok(())
    }

    fn session_mut(&mut self) -> &mut Option<BrowserSession> {
        &mut self.session
    }

    fn status(&self) -> RunStatus {
        if self.success { RunStatus::Succeed } else { RunStatus::Fail }
    }
}

/// Bounded-free challenge loop: screenshot, ask the oracle for a
/// short text answer, submit it with Tab + type + Enter, and stop
/// once the retry marker disappears from the page.
pub struct SolveChallenge {
    config: RunConfig,
    oracle: Arc<dyn ActionOracle>,
    artifacts: Arc<ArtifactSink>,
    session: Option<BrowserSession>,
    success: bool,
}

impl SolveChallenge {
    pub fn new(config: RunConfig, oracle: Arc<dyn ActionOracle>, artifacts: Arc<ArtifactSink>) -> Self {
        Self { config, oracle, artifacts, session: None, success: false }
    }
}

#[async_trait]
impl TestCommand for SolveChallenge {
    async fn execute(&mut self) -> Result<(), AgentError> {
        if self.session.is_none() {
            // Challenges are rendered for a human; run headed.
            let session = BrowserSession::launch(false)?;
            session.navigate(&self.config.url)?;
            tokio::time::sleep(self.config.load_wait).await;
            self.session = Some(session);
        }
        let Some(session) = self.session.as_ref() else {
            return Err(AgentError::Browser("no session for challenge loop".into()));
        };

        loop {
            session.wait_document_ready(self.config.load_wait)?;

            let png = session.screenshot_png()?;
            if let Err(err) = self.artifacts.save_screenshot(&png) {
                warn!("could not persist challenge screenshot: {err}");
            }

            let raw = self.oracle.invoke_with_image(&self.config.test_case, &png).await?;
            let answer = raw.replace('\n', "");
            info!("Challenge answer: {}", answer.trim());

            session.press_key("Tab")?;
            session.type_text(answer.trim())?;
            session.press_key("Enter")?;

            if !challenge_retry_needed(&session.page_source()?) {
                self.success = true;
                break;
            }
        }

        info!("Challenge solved");
        Ok(())
    }

    fn session_mut(&mut self) -> &mut Option<BrowserSession> {
        &mut self.session
    }

    fn status(&self) -> RunStatus {
        if self.success { RunStatus::Succeed } else { RunStatus::Fail }
    }
}

fn challenge_retry_needed(html: &str) -> bool {
    html.to_lowercase().contains(CHALLENGE_RETRY_MARKER)
}
