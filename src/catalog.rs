//! Interactive-element discovery. Scans the live page in a fixed
//! order, filters to visible and enabled elements, and assigns every
//! element an identifier the oracle can refer back to. Handles are
//! only valid for the decision round that produced them.

use crate::error::AgentError;
use crate::types::{ElementKind, ElementSummary};
use headless_chrome::{Element, Tab};
use rand::RngExt;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Scan order. Earlier entries win when two elements would otherwise
/// claim the same identifier.
const SCAN_ORDER: &[(&str, ElementKind)] = &[
    ("button", ElementKind::Clickable),
    ("input", ElementKind::Input),
    ("a", ElementKind::Clickable),
    ("textarea", ElementKind::Input),
    ("select", ElementKind::Input),
    ("[onclick]:not(button):not(a):not(input)", ElementKind::Clickable),
    ("span", ElementKind::Clickable),
];

const GENERATED_ID_LEN: usize = 8;

/// A live interactive element in the current snapshot. The handle is
/// a non-owning reference into the tab; it is never reused across
/// decision rounds.
pub struct InteractiveElement<'a> {
    pub kind: ElementKind,
    pub id: String,
    /// True when the id was assigned by us rather than read off the DOM.
    pub generated: bool,
    pub tag: String,
    pub handle: Element<'a>,
}

impl InteractiveElement<'_> {
    pub fn summary(&self) -> ElementSummary {
        ElementSummary {
            kind: self.kind,
            id: self.id.clone(),
        }
    }
}

/// What we read off a candidate element before admitting it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ElementProbe {
    pub tag: String,
    pub id: String,
    pub visible: bool,
    pub enabled: bool,
}

const PROBE_FN: &str = r#"
function() {
    const style = getComputedStyle(this);
    const visible = !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length)
        && style.visibility !== 'hidden' && style.display !== 'none';
    return JSON.stringify({
        tag: this.tagName.toLowerCase(),
        id: this.id || '',
        visible: visible,
        enabled: !this.disabled,
    });
}"#;

const ASSIGN_ID_FN: &str = "function(id) { this.id = id; }";

/// Enumerate interactive elements on the current page. With
/// `include_unidentified` set, elements lacking a natural id are kept
/// and assigned a generated token; otherwise they are filtered out.
pub fn discover(tab: &Tab, include_unidentified: bool) -> Result<Vec<InteractiveElement<'_>>, AgentError> {
    let mut used: HashSet<String> = HashSet::new();
    let mut elements = Vec::new();

    for (selector, kind) in SCAN_ORDER {
        let found = tab.find_elements(selector).unwrap_or_default();
        for handle in found {
            let probe = match probe_element(&handle) {
                Ok(probe) => probe,
                Err(err) => {
                    debug!("skipping element that could not be probed: {err}");
                    continue;
                }
            };
            if let Some((id, generated)) = admit(&probe, include_unidentified, &mut used) {
                elements.push(InteractiveElement {
                    kind: *kind,
                    id,
                    generated,
                    tag: probe.tag,
                    handle,
                });
            }
        }
    }

    debug!("catalog holds {} interactive elements", elements.len());
    Ok(elements)
}

/// Write generated identifiers back onto the live DOM so the oracle's
/// later references resolve to the same nodes. Skipped entirely when
/// the id-assignment policy is off.
pub fn write_back_ids(elements: &[InteractiveElement<'_>]) {
    for element in elements.iter().filter(|e| e.generated) {
        if let Err(err) = element
            .handle
            .call_js_fn(ASSIGN_ID_FN, vec![json!(element.id)], false)
        {
            warn!("could not write id `{}` back to the page: {err}", element.id);
        }
    }
}

pub fn summaries(elements: &[InteractiveElement<'_>]) -> Vec<ElementSummary> {
    elements.iter().map(InteractiveElement::summary).collect()
}

fn probe_element(handle: &Element<'_>) -> Result<ElementProbe, AgentError> {
    let result = handle
        .call_js_fn(PROBE_FN, vec![], false)
        .map_err(AgentError::browser)?;
    let raw = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| AgentError::Browser("element probe returned no value".into()))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Filter policy plus identifier assignment. Returns the id to use
/// and whether it was generated. First element to claim an id wins.
pub(crate) fn admit(
    probe: &ElementProbe,
    include_unidentified: bool,
    used: &mut HashSet<String>,
) -> Option<(String, bool)> {
    if !probe.visible || !probe.enabled {
        return None;
    }
    if probe.id.is_empty() {
        if !include_unidentified {
            return None;
        }
        let mut token = random_token(GENERATED_ID_LEN);
        while used.contains(&token) {
            token = random_token(GENERATED_ID_LEN);
        }
        used.insert(token.clone());
        return Some((token, true));
    }
    if !used.insert(probe.id.clone()) {
        return None;
    }
    Some((probe.id.clone(), false))
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(rng.sample(rand::distr::Alphanumeric)).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(tag: &str, id: &str, visible: bool, enabled: bool) -> ElementProbe {
        ElementProbe {
            tag: tag.into(),
            id: id.into(),
            visible,
            enabled,
        }
    }

    #[test]
    fn filters_unidentified_elements_by_default() {
        let mut used = HashSet::new();
        let kept = admit(&probe("button", "btn1", true, true), false, &mut used);
        let dropped = admit(&probe("input", "", true, true), false, &mut used);
        assert_eq!(kept, Some(("btn1".into(), false)));
        assert_eq!(dropped, None);
    }

    #[test]
    fn assigns_generated_ids_when_requested() {
        let mut used = HashSet::new();
        let first = admit(&probe("button", "btn1", true, true), true, &mut used).unwrap();
        let second = admit(&probe("input", "", true, true), true, &mut used).unwrap();
        assert_eq!(first, ("btn1".into(), false));
        assert!(second.1, "id should be flagged as generated");
        assert_eq!(second.0.len(), GENERATED_ID_LEN);
    }

    #[test]
    fn generated_ids_are_pairwise_distinct() {
        let mut used = HashSet::new();
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let (id, generated) = admit(&probe("input", "", true, true), true, &mut used).unwrap();
            assert!(generated);
            assert!(seen.insert(id), "duplicate generated id in one snapshot");
        }
    }

    #[test]
    fn invisible_or_disabled_elements_are_dropped() {
        let mut used = HashSet::new();
        assert_eq!(admit(&probe("button", "b", false, true), true, &mut used), None);
        assert_eq!(admit(&probe("button", "c", true, false), true, &mut used), None);
    }

    #[test]
    fn first_claim_on_an_id_wins() {
        let mut used = HashSet::new();
        let first = admit(&probe("button", "dup", true, true), false, &mut used);
        let second = admit(&probe("span", "dup", true, true), false, &mut used);
        assert!(first.is_some());
        assert_eq!(second, None);
    }

    #[test]
    fn tokens_are_lowercase_alphanumeric() {
        let token = random_token(GENERATED_ID_LEN);
        assert_eq!(token.len(), GENERATED_ID_LEN);
        assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
