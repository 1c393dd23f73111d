//! Element and step names

use super::prompt;
use crate::llm::LanguageModel;
use crate::step::{ElementDescriptor, Step, StepAction, WaitCondition};

const MAX_ELEMENT_NAME: usize = 40;

/// Identifier-safe name for the element a step targets.
///
/// Steps without selectors (e.g. `switch_to_default_content`) act on the
/// page itself and are named `page_context`.
pub fn element_name(data: &ElementDescriptor) -> String {
    let Some(selectors) = data.selectors.as_ref() else {
        return "page_context".to_string();
    };

    let test_id = data.attributes.get("data-testid").and_then(|v| v.as_deref());
    let source = [
        test_id,
        selectors.id.as_deref(),
        selectors.name.as_deref(),
        selectors.placeholder.as_deref(),
        data.text.as_deref(),
        data.tag.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty());

    let Some(source) = source else {
        return "element".to_string();
    };
    let name = sanitize(source);
    if name.is_empty() {
        "element".to_string()
    } else {
        name
    }
}

/// Keep ASCII alphanumerics, turn whitespace runs into `_`, lowercase
fn sanitize(source: &str) -> String {
    let mut name = String::new();
    let mut in_whitespace = false;
    for c in source.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                name.push('_');
            }
            in_whitespace = true;
        } else if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
            in_whitespace = false;
        }
    }
    name.chars().take(MAX_ELEMENT_NAME).collect()
}

/// Value shown in step names: the element value, else the expected text
fn display_value(step: &Step) -> &str {
    step.data
        .value
        .as_deref()
        .filter(|v| !v.is_empty())
        .or(step.action.expected_text())
        .unwrap_or("")
}

/// Human-readable step name, asking the language model first
pub async fn step_name(step: &Step, model: &dyn LanguageModel) -> String {
    let element = element_name(&step.data);
    let value = display_value(step);

    let prompt = prompt::step_name_prompt(step.action.label(), &element, value);
    if let Some(name) = model.complete(&prompt).await {
        if !name.is_empty() {
            return name;
        }
    }
    fallback_step_name(step)
}

/// Deterministic step name used when no language model answers
pub fn fallback_step_name(step: &Step) -> String {
    let element = element_name(&step.data);
    match &step.action {
        StepAction::Wait(condition) => {
            let target = match condition {
                WaitCondition::Invisible => "invisible",
                WaitCondition::Visible | WaitCondition::Clickable => "visible",
            };
            format!("Wait until element '{}' becomes {}", element, target)
        }
        StepAction::Click => format!("Click on element '{}'", element),
        StepAction::Input => format!("Enter value '{}' into '{}'", display_value(step), element),
        StepAction::Assert(crate::step::Assertion::Visible) => {
            format!("Check visibility of element '{}'", element)
        }
        other => format!("Perform '{}' on element '{}'", other.label(), element),
    }
}
