use thiserror::Error;

/// Failure taxonomy for a test run. Only element-level failures are
/// recovered inside the decision loop; everything else propagates to
/// the command boundary, where teardown still runs.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The oracle referenced an identifier absent from the current snapshot.
    #[error("element `{0}` not found in current snapshot")]
    ElementResolution(String),

    /// Element detached or not interactable at click/type time.
    #[error("element `{0}` is no longer interactable: {1}")]
    NotInteractable(String, String),

    /// Oracle text contained no parseable JSON object, or the payload
    /// missed required fields. Fatal to the current navigation step.
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),

    /// Browser/driver could not be started. Fatal before the loop begins.
    #[error("browser session could not be started: {0}")]
    SessionStartup(String),

    /// Model id with no entry in the strategy table.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Oracle transport failure.
    #[error("oracle transport error: {0}")]
    Oracle(#[from] reqwest::Error),

    /// Oracle replied with a non-success HTTP status.
    #[error("oracle rejected the request ({status}): {message}")]
    OracleRejected { status: u16, message: String },

    /// Any other browser-side failure (navigation, evaluate, screenshot).
    #[error("browser error: {0}")]
    Browser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the loop may swallow this error and continue with the
    /// next decision round. `Browser` is wider than the element-level
    /// failures: page-ready timeouts and screenshot hiccups retry on
    /// the next round instead of aborting the test.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::ElementResolution(_)
                | AgentError::NotInteractable(..)
                | AgentError::Browser(_)
        )
    }

    /// Collapse a headless_chrome error into the browser bucket.
    pub fn browser(err: impl std::fmt::Display) -> Self {
        AgentError::Browser(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_failures_are_recoverable() {
        assert!(AgentError::ElementResolution("btn1".into()).is_recoverable());
        assert!(AgentError::NotInteractable("btn1".into(), "stale".into()).is_recoverable());
        assert!(AgentError::Browser("lost connection".into()).is_recoverable());
    }

    #[test]
    fn fatal_kinds_are_not_recoverable() {
        assert!(!AgentError::MalformedResponse("no braces".into()).is_recoverable());
        assert!(!AgentError::SessionStartup("no chrome".into()).is_recoverable());
        assert!(!AgentError::UnsupportedModel("gpt-9".into()).is_recoverable());
    }
}
