//! Assembles the oracle's grounding context: behavioral contract,
//! sanitized markup, test case, action history, remaining budget and
//! the element catalog.

use crate::types::{ActionRecord, ElementSummary};

/// Behavioral contract for the oracle. One click per round at most,
/// any number of inputs, decisions grounded in literal evidence from
/// the supplied markup.
const INSTRUCTIONS: &str = r#"Human: You are a professional tester testing web applications. You provide the output to the next step you need to execute to complete the test case. You can provide values to several inputs at once but one click action only on each step. Your actions must use actionable elements from the input. Provide the information to the next step according to the following instructions:

1- One input is the HTML source code of the web page. You will find it inside <code></code> tags.
2- Another input is the description of the test case you are executing. You will find it inside <testcase></testcase> tags
3- Another input is the list of past actions that you have done so far. The first element is the first action of the test and last element is the previous action. You will find it inside <actions></actions> tags
4- Another input is the number of available interactions. You will find it inside <available-interactions></available-interactions> tags.
5- Another input is the list of elements available for you to interact with. They are of type input or clickable. You will find it inside <interact></interact> tags
6- Your answer must always be JSON Object containing the next step or a test case completed response type. The next step object should contain a key "explanation" and a key "actions". Key "actions" is an array of JSON objects with keys "action", "id" and "value". Sometimes you need to click an element to visualize the input form. These are the examples:
<examples>
{"explanation":"Click on the button to submit the form","actions":[{"action":"click","id":"button1","value":"Submit"}, {"action":"input","id":"name-field","value":"John Doe"}, {"action":"input","id":"dropdown-menu","value":"Option 2"}, {"action":"input","id":"email-field","value":"johndoe@example.com"} ]}
{"explanation":"Click on the button to submit the form","actions":[{"action":"click","id":"link-1","value":"Learn More"}]}
{"explanation":"Click on the button to submit the form","actions": [{"action":"input","id":"name-field","value":"John Doe"}, {"action":"input","id":"dropdown-menu","value":"Option 2"}, {"action":"input","id":"email-field","value":"johndoe@example.com"}, {"action":"click","id":"link-sign-in","value":"SignIn"} ]}
</examples>
7- When test case is completed your answer must be a JSON object with two keys, status and explanation. Here are a few examples:
<examples>
{"status":"success","explanation":"<EXPLANATION>"}
{"status":"failure","explanation":"<EXPLANATION>"}
</examples>
8- For test to finish successfully, your explanation must contain evidence within the source HTML code that conditions to finish the test were met. Do not finish test successfully before finding evidence within the HTML code.
9- You can use information from the image that was rendered using the HTML code provided within <code></code>
"#;

/// Completion condition appended to every test-case description.
const COMPLETION_CONDITION: &str = "The test fails if you cannot complete the action after the \
number of available interactions gets to 0 or if you cannot complete the action for another reason.";

/// Build the full instruction document for one decision round.
pub fn build(
    sanitized_html: &str,
    test_case: &str,
    history: &[ActionRecord],
    remaining_budget: u32,
    elements: &[ElementSummary],
) -> String {
    let mut prompt = String::with_capacity(INSTRUCTIONS.len() + sanitized_html.len() + 512);
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str(&format!("\n<code>{sanitized_html}</code>\n"));
    prompt.push_str(&format!("<testcase>{test_case} {COMPLETION_CONDITION}</testcase>\n"));
    prompt.push_str(&format!("<actions>{}</actions>\n", render_history(history)));
    prompt.push_str(&format!(
        "<available-interactions>{remaining_budget}</available-interactions>\n"
    ));
    prompt.push_str(&format!("<interact>{}</interact>.\n", render_elements(elements)));
    prompt.push_str("\nAnswer in JSON format:\n");
    prompt
}

fn render_history(history: &[ActionRecord]) -> String {
    let entries: Vec<String> = history.iter().map(ActionRecord::to_string).collect();
    format!("[{}]", entries.join(", "))
}

fn render_elements(elements: &[ElementSummary]) -> String {
    let entries: Vec<String> = elements.iter().map(ElementSummary::to_string).collect();
    format!("[{}]", entries.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementKind;

    fn sample_elements() -> Vec<ElementSummary> {
        vec![
            ElementSummary { kind: ElementKind::Input, id: "email".into() },
            ElementSummary { kind: ElementKind::Clickable, id: "submit".into() },
        ]
    }

    #[test]
    fn embeds_every_section() {
        let history = vec![ActionRecord {
            step: 1,
            actions_taken: r#"[{"action":"input","id":"email","value":"a@b.c"}]"#.into(),
            explanation: "fill the email".into(),
        }];
        let prompt = build("<p>page</p>", "log in as a@b.c", &history, 42, &sample_elements());

        assert!(prompt.contains("<code><p>page</p></code>"));
        assert!(prompt.contains("log in as a@b.c"));
        assert!(prompt.contains("The test fails if you cannot complete the action"));
        assert!(prompt.contains(r#"{"step":1, "actions": [{"action":"input","id":"email","value":"a@b.c"}]}"#));
        assert!(prompt.contains("<available-interactions>42</available-interactions>"));
        assert!(prompt.contains("<interact>[[type=input,id=email], [type=clickable,id=submit]]</interact>"));
    }

    #[test]
    fn empty_history_renders_as_empty_list() {
        let prompt = build("<p></p>", "t", &[], 1, &[]);
        assert!(prompt.contains("<actions>[]</actions>"));
        assert!(prompt.contains("<interact>[]</interact>"));
    }

    #[test]
    fn states_one_click_contract() {
        let prompt = build("", "t", &[], 5, &[]);
        assert!(prompt.contains("one click action only on each step"));
        assert!(prompt.contains("Do not finish test successfully before finding evidence"));
    }
}
