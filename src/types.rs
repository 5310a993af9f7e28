use serde::{Deserialize, Serialize};
use std::fmt;

/// How an element can be used. Clickable elements receive click
/// actions, input elements receive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Clickable,
    Input,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Clickable => write!(f, "clickable"),
            ElementKind::Input => write!(f, "input"),
        }
    }
}

/// A single atomic action the oracle asks the agent to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAction {
    pub action: ActionKind,
    pub id: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Input,
}

/// One action batch decided by the oracle for the current round.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDecision {
    pub explanation: String,
    pub actions: Vec<OracleAction>,
}

/// The oracle declaring the test case finished.
#[derive(Debug, Clone)]
pub struct TerminalVerdict {
    pub status: VerdictStatus,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Success,
    Failure,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictStatus::Success => write!(f, "success"),
            VerdictStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Either outcome of one oracle round.
#[derive(Debug, Clone)]
pub enum OracleReply {
    Step(StepDecision),
    Verdict(TerminalVerdict),
}

/// Append-only audit entry for one executed action batch. Rendered
/// into the prompt so the oracle sees what it already tried.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub step: u32,
    pub actions_taken: String,
    pub explanation: String,
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"step\":{}, \"actions\": {}}}", self.step, self.actions_taken)
    }
}

/// Type + identifier view of a catalogued element, the only part of
/// the catalog the oracle is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSummary {
    pub kind: ElementKind,
    pub id: String,
}

impl fmt::Display for ElementSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[type={},id={}]", self.kind, self.id)
    }
}

/// Terminal status of a command or chain, as reported on the reply
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeed,
    Fail,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeed => "SUCCEED",
            RunStatus::Fail => "FAIL",
        }
    }
}

/// A test job handed in over the intake boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub url: String,
    pub test_cases: Vec<String>,
    #[serde(default)]
    pub set_ids: bool,
}

/// Reply handed back once every test case of a job has run.
#[derive(Debug, Clone, Serialize)]
pub struct JobReply {
    pub status: String,
    pub id: String,
    #[serde(rename = "s3Prefix")]
    pub s3_prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_wire_format() {
        let job: Job = serde_json::from_str(
            r#"{"id":"42","url":"https://shop.test","testCases":["add to cart"],"setIds":true}"#,
        )
        .unwrap();
        assert_eq!(job.id, "42");
        assert_eq!(job.test_cases, vec!["add to cart"]);
        assert!(job.set_ids);
    }

    #[test]
    fn set_ids_defaults_to_false() {
        let job: Job =
            serde_json::from_str(r#"{"id":"1","url":"https://a.test","testCases":[]}"#).unwrap();
        assert!(!job.set_ids);
    }

    #[test]
    fn reply_uses_external_field_names() {
        let reply = JobReply {
            status: RunStatus::Succeed.as_str().to_string(),
            id: "42".into(),
            s3_prefix: "bucket/abc123".into(),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "SUCCEED");
        assert_eq!(json["s3Prefix"], "bucket/abc123");
    }

    #[test]
    fn record_renders_like_past_action() {
        let record = ActionRecord {
            step: 3,
            actions_taken: r#"[{"action":"click","id":"btn1","value":""}]"#.into(),
            explanation: "submit the form".into(),
        };
        assert_eq!(
            record.to_string(),
            r#"{"step":3, "actions": [{"action":"click","id":"btn1","value":""}]}"#
        );
    }
}
