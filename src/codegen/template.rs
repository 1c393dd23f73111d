//! Per-step page-object code
//!
//! Every step renders to one page-object method (Python, using the healing
//! helpers of the generated base page) and the call that invokes it from a
//! test. Assembling whole files is the code-generation service's job.

use super::naming::element_name;
use crate::step::{Assertion, BooleanCheck, Step, StepAction, StepCode, WaitCondition};

/// Rendered fragments of one step
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub code: StepCode,
    /// Boolean form of visibility/clickability/enabled assertions
    pub boolean_check: Option<BooleanCheck>,
}

/// Render the method definition and call for a step.
///
/// Returns `None` when the step kind has no method body.
pub fn render(step: &Step) -> Option<Rendered> {
    let element = element_name(&step.data);
    let locators = format!("self.{}_locators", element);
    let mut method = format!("{}_{}", step.action.label(), element);
    let mut allure = step.allure_step.clone();
    let mut signature = "(self)".to_string();
    let mut call_args = "()".to_string();

    let argument = step.argument_variable().map(|name| (name, name.to_lowercase()));
    if let Some((name, lower)) = &argument {
        signature = format!("(self, {})", lower);
        call_args = format!("({})", name);
        allure = replace_first_quoted(&allure, &format!("{{{}}}", lower));
    }
    let arg = argument.as_ref().map(|(_, lower)| lower.as_str());
    let literal = |value: Option<&str>| match arg {
        Some(arg) => arg.to_string(),
        None => format!("\"{}\"", value.unwrap_or_default()),
    };

    let mut boolean_check = None;
    let body = match &step.action {
        StepAction::Click => format!("self.do_click_with_healing({})", locators),
        StepAction::RightClick => format!("self.do_right_click_with_healing({})", locators),
        StepAction::Hover => format!("self.do_hover_with_healing({})", locators),
        StepAction::DoubleClick => format!("self.do_double_click_with_healing({})", locators),
        StepAction::Input => format!(
            "self.do_clear_and_send_keys_with_healing({}, {})",
            locators,
            literal(step.data.value.as_deref())
        ),
        StepAction::Select => format!(
            "self.select_option_by_visible_text({}, \"{}\")",
            locators,
            step.data.selected_text.as_deref().unwrap_or_default()
        ),
        StepAction::GetText { .. } => {
            method = format!("get_text_from_{}", element);
            format!("return self.get_text_with_healing({})", locators)
        }
        StepAction::SwitchToIframe => format!("self.switch_to_iframe({})", locators),
        StepAction::SwitchToDefaultContent => {
            method = "switch_to_default_content".to_string();
            "self.switch_to_default_content()".to_string()
        }
        StepAction::Wait(condition) => {
            let wait = match condition {
                WaitCondition::Visible => "wait_for_element_visible",
                WaitCondition::Invisible => "wait_for_element_invisible",
                WaitCondition::Clickable => "wait_for_element_to_be_clickable",
            };
            format!("self.{}({})", wait, locators)
        }
        StepAction::Assert(assertion) => {
            if let Some((check, message)) = boolean_form(assertion) {
                boolean_check = Some(BooleanCheck {
                    method_name: check.to_string(),
                    locator_var_name: locators.clone(),
                });
                let call = match check.strip_prefix("not self.") {
                    Some(positive) => format!("not self.{}({})", positive, locators),
                    None => format!("self.{}({})", check, locators),
                };
                format!("assert {}, \"{}\"", call, message)
            } else {
                value_assertion(assertion, &locators, &literal)
            }
        }
    };

    if body.is_empty() {
        return None;
    }

    let mut call = format!("page.{}{}", method, call_args);
    if let (StepAction::GetText { .. }, Some(variable)) =
        (&step.action, step.variable_name.as_deref().filter(|v| !v.is_empty()))
    {
        call = format!("{} = {}", variable, call);
    }

    let definition = format!(
        "    @allure.step(\"{}\")\n    def {}{}:\n        {}",
        allure, method, signature, body
    );
    Some(Rendered {
        code: StepCode { definition, call },
        boolean_check,
    })
}

/// Re-render a step in place; a step with nothing to render keeps its code
pub fn apply(step: &mut Step) {
    match render(step) {
        Some(rendered) => {
            step.code = rendered.code;
            step.boolean_check = rendered.boolean_check;
        }
        None => log::debug!("No code template for step {}", step.id),
    }
}

/// Check used by IF conditions and the assertion message
fn boolean_form(assertion: &Assertion) -> Option<(&'static str, &'static str)> {
    let form = match assertion {
        Assertion::Visible => ("is_visible_with_healing", "Element is not visible"),
        Assertion::NotVisible => ("is_not_visible_with_healing", "Element is visible"),
        Assertion::IsClickable => ("is_clickable_with_healing", "Element is not clickable"),
        Assertion::IsNotClickable => ("not self.is_clickable_with_healing", "Element is clickable"),
        Assertion::IsEnabled => ("is_enabled_with_healing", "Element is disabled"),
        Assertion::IsDisabled => ("not self.is_enabled_with_healing", "Element is enabled"),
        _ => return None,
    };
    Some(form)
}

fn value_assertion(
    assertion: &Assertion,
    locators: &str,
    literal: &dyn Fn(Option<&str>) -> String,
) -> String {
    match assertion {
        Assertion::TextEquals { expected_text } => format!(
            "assert self.get_text_with_healing({}) == {}",
            locators,
            literal(expected_text.as_deref())
        ),
        Assertion::ValueEquals { expected_value } => format!(
            "assert self.get_attribute_with_healing({}, \"value\") == {}",
            locators,
            literal(expected_value.as_deref())
        ),
        Assertion::HasCssClass { expected_css_class } => format!(
            "assert \"{}\" in self.get_attribute_with_healing({}, \"class\")",
            expected_css_class, locators
        ),
        Assertion::Attribute {
            expected_attribute_name,
            expected_attribute_value,
        } => format!(
            "assert self.get_attribute_with_healing({}, \"{}\") == \"{}\"",
            locators, expected_attribute_name, expected_attribute_value
        ),
        _ => String::new(),
    }
}

/// Replace the first `'...'` fragment of a step name
fn replace_first_quoted(name: &str, replacement: &str) -> String {
    let Some(start) = name.find('\'') else {
        return name.to_string();
    };
    let Some(len) = name[start + 1..].find('\'') else {
        return name.to_string();
    };
    let end = start + 1 + len + 1;
    format!("{}{}{}", &name[..start], replacement, &name[end..])
}
