//! Extracts the oracle's structured decision from free-text output.
//! The oracle may wrap its JSON object in prose; only the span from
//! the first `{` to the last `}` is trusted.

use crate::error::AgentError;
use crate::types::{OracleReply, StepDecision, TerminalVerdict, VerdictStatus};
use serde_json::Value;

/// Parse raw oracle text into either a step decision or a terminal
/// verdict. Anything else is a `MalformedResponse`.
pub fn parse_reply(raw: &str) -> Result<OracleReply, AgentError> {
    let start = raw
        .find('{')
        .ok_or_else(|| malformed("no JSON object in oracle text", raw))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| malformed("no JSON object in oracle text", raw))?;
    if end < start {
        return Err(malformed("braces out of order in oracle text", raw));
    }

    let payload: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|err| malformed(&format!("payload is not valid JSON: {err}"), raw))?;

    if let Some(status) = payload.get("status") {
        let status_text = status.as_str().unwrap_or_default();
        let explanation = payload
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // Anything that does not spell failure counts as success.
        let status = if status_text.to_lowercase().contains("failure") {
            VerdictStatus::Failure
        } else {
            VerdictStatus::Success
        };
        return Ok(OracleReply::Verdict(TerminalVerdict { status, explanation }));
    }

    if payload.get("actions").is_none() || payload.get("explanation").is_none() {
        return Err(malformed("decision needs both `actions` and `explanation`", raw));
    }
    let decision: StepDecision = serde_json::from_value(payload)
        .map_err(|err| malformed(&format!("decision does not match schema: {err}"), raw))?;
    Ok(OracleReply::Step(decision))
}

fn malformed(reason: &str, raw: &str) -> AgentError {
    let preview: String = raw.chars().take(200).collect();
    AgentError::MalformedResponse(format!("{reason}; text begins: {preview}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;

    #[test]
    fn parses_decision_embedded_in_prose() {
        let raw = concat!(
            "Sure! Looking at the page, the next step is clear.\n",
            r#"{"explanation":"fill and submit","actions":[{"action":"input","id":"email","value":"a@b.c"},{"action":"click","id":"submit","value":"Go"}]}"#,
            "\nLet me know how it goes."
        );
        let OracleReply::Step(decision) = parse_reply(raw).unwrap() else {
            panic!("expected a step decision");
        };
        assert_eq!(decision.explanation, "fill and submit");
        assert_eq!(decision.actions.len(), 2);
        assert_eq!(decision.actions[0].action, ActionKind::Input);
        assert_eq!(decision.actions[1].action, ActionKind::Click);
        assert_eq!(decision.actions[1].id, "submit");
    }

    #[test]
    fn decision_survives_prose_without_braces() {
        let inner = r#"{"explanation":"e","actions":[]}"#;
        let raw = format!("prefix words {inner} suffix words");
        let OracleReply::Step(decision) = parse_reply(&raw).unwrap() else {
            panic!("expected a step decision");
        };
        assert_eq!(decision.explanation, "e");
        assert!(decision.actions.is_empty());
    }

    #[test]
    fn failure_status_any_case_maps_to_failure() {
        for status in ["failure", "FAILURE", "Test Failure: no evidence"] {
            let raw = format!(r#"{{"status":"{status}","explanation":"why"}}"#);
            let OracleReply::Verdict(verdict) = parse_reply(&raw).unwrap() else {
                panic!("expected a verdict");
            };
            assert_eq!(verdict.status, VerdictStatus::Failure);
            assert_eq!(verdict.explanation, "why");
        }
    }

    #[test]
    fn any_other_status_maps_to_success() {
        for status in ["success", "passed", "done"] {
            let raw = format!(r#"{{"status":"{status}","explanation":"ok"}}"#);
            let OracleReply::Verdict(verdict) = parse_reply(&raw).unwrap() else {
                panic!("expected a verdict");
            };
            assert_eq!(verdict.status, VerdictStatus::Success);
        }
    }

    #[test]
    fn missing_actions_is_malformed() {
        let err = parse_reply(r#"{"explanation":"only"}"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[test]
    fn missing_explanation_is_malformed() {
        let err = parse_reply(r#"{"actions":[]}"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[test]
    fn text_without_object_is_malformed() {
        let err = parse_reply("I could not decide on an action.").unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[test]
    fn value_defaults_to_empty_for_clicks() {
        let raw = r#"{"explanation":"e","actions":[{"action":"click","id":"go"}]}"#;
        let OracleReply::Step(decision) = parse_reply(raw).unwrap() else {
            panic!("expected a step decision");
        };
        assert_eq!(decision.actions[0].value, "");
    }
}
