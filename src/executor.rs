//! Maps parsed oracle actions onto live elements. Input actions are
//! applied immediately; click actions are collected and returned so
//! every input in the batch takes effect before any click fires.

use crate::artifacts::ArtifactSink;
use crate::catalog::InteractiveElement;
use crate::error::AgentError;
use crate::session::BrowserSession;
use crate::types::{ActionKind, OracleAction};
use serde_json::json;
use tracing::{debug, info, warn};

const CLEAR_AND_FOCUS_FN: &str = "function() { this.focus(); this.value = ''; }";

/// Selects the option whose value matches, if any, and reports back
/// whether a match was found. No match is a silent no-op.
const SELECT_OPTION_FN: &str = r#"
function(value) {
    let matched = false;
    for (const option of this.options) {
        if (option.value === value) {
            option.selected = true;
            matched = true;
        }
    }
    if (matched) {
        this.dispatchEvent(new Event('change', { bubbles: true }));
    }
    return matched;
}"#;

/// Action indices resolved against one snapshot. Inputs keep action
/// order; click targets are held in catalog order.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ResolvedBatch {
    pub inputs: Vec<(usize, String)>,
    pub clicks: Vec<usize>,
}

/// Resolve action identifiers against the current snapshot.
/// Identifiers with no matching element are skipped with a warning;
/// they never abort the batch.
pub(crate) fn resolve(actions: &[OracleAction], ids: &[&str]) -> ResolvedBatch {
    let mut batch = ResolvedBatch::default();
    for action in actions {
        let Some(index) = ids.iter().position(|id| *id == action.id) else {
            warn!("skipping action: {}", AgentError::ElementResolution(action.id.clone()));
            continue;
        };
        match action.action {
            ActionKind::Input => batch.inputs.push((index, action.value.clone())),
            ActionKind::Click => batch.clicks.push(index),
        }
    }
    batch.clicks.sort_unstable();
    batch
}

/// Apply the input actions of a batch and return the resolved click
/// targets, in catalog order. Failures on single elements are logged
/// and swallowed; the batch continues.
pub fn apply<'e, 'a>(
    actions: &[OracleAction],
    elements: &'e [InteractiveElement<'a>],
    session: &BrowserSession,
    artifacts: &ArtifactSink,
) -> Vec<&'e InteractiveElement<'a>> {
    let ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
    let batch = resolve(actions, &ids);

    for (index, value) in &batch.inputs {
        let element = &elements[*index];
        let outcome = if element.tag == "select" {
            select_option(element, value, session, artifacts)
        } else {
            fill_text(element, value, session)
        };
        if let Err(err) = outcome {
            warn!("input on `{}` failed, continuing with the batch: {err}", element.id);
        }
    }

    batch.clicks.iter().map(|index| &elements[*index]).collect()
}

fn fill_text(
    element: &InteractiveElement<'_>,
    value: &str,
    session: &BrowserSession,
) -> Result<(), AgentError> {
    element
        .handle
        .call_js_fn(CLEAR_AND_FOCUS_FN, vec![], false)
        .map_err(|err| AgentError::NotInteractable(element.id.clone(), err.to_string()))?;
    session.type_text(value)?;
    info!("Inputted value {value} on {}", element.id);
    Ok(())
}

fn select_option(
    element: &InteractiveElement<'_>,
    value: &str,
    session: &BrowserSession,
    artifacts: &ArtifactSink,
) -> Result<(), AgentError> {
    let result = element
        .handle
        .call_js_fn(SELECT_OPTION_FN, vec![json!(value)], false)
        .map_err(|err| AgentError::NotInteractable(element.id.clone(), err.to_string()))?;
    let matched = result.value.and_then(|v| v.as_bool()).unwrap_or(false);
    if matched {
        // Confirm the selection with an activation keystroke.
        session.press_key("Enter")?;
        info!("Selected option {value} on {}", element.id);
    } else {
        debug!("select `{}` has no option with value `{value}`", element.id);
    }

    // Diagnostic screenshot after the attempt, matched or not.
    match session.screenshot_png() {
        Ok(png) => {
            if let Err(err) = artifacts.save_screenshot(&png) {
                debug!("could not persist diagnostic screenshot: {err}");
            }
        }
        Err(err) => debug!("could not capture diagnostic screenshot: {err}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(id: &str) -> OracleAction {
        OracleAction { action: ActionKind::Click, id: id.into(), value: String::new() }
    }

    fn input(id: &str, value: &str) -> OracleAction {
        OracleAction { action: ActionKind::Input, id: id.into(), value: value.into() }
    }

    #[test]
    fn clicks_come_back_in_catalog_order() {
        let ids = ["first", "second", "third"];
        let actions = vec![click("third"), click("first")];
        let batch = resolve(&actions, &ids);
        assert_eq!(batch.clicks, vec![0, 2]);
        assert!(batch.inputs.is_empty());
    }

    #[test]
    fn unknown_identifiers_are_skipped_not_fatal() {
        let ids = ["real"];
        let actions = vec![click("hallucinated"), click("real"), input("ghost", "x")];
        let batch = resolve(&actions, &ids);
        assert_eq!(batch.clicks, vec![0]);
        assert!(batch.inputs.is_empty());
    }

    #[test]
    fn inputs_keep_action_order() {
        let ids = ["a", "b", "c"];
        let actions = vec![input("c", "3"), input("a", "1")];
        let batch = resolve(&actions, &ids);
        assert_eq!(batch.inputs, vec![(2, "3".to_string()), (0, "1".to_string())]);
    }

    #[test]
    fn click_only_batch_has_no_input_side_effects() {
        let ids = ["btn1", "btn2"];
        let actions = vec![click("btn2"), click("btn1")];
        let batch = resolve(&actions, &ids);
        assert_eq!(batch, ResolvedBatch { inputs: vec![], clicks: vec![0, 1] });
    }

    #[test]
    fn empty_snapshot_resolves_nothing() {
        let batch = resolve(&[click("any")], &[]);
        assert_eq!(batch, ResolvedBatch::default());
    }
}
