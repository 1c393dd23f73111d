//! Prompt templates for the language model

/// Prompt asking for an Allure step name
pub fn step_name_prompt(action: &str, element: &str, value: &str) -> String {
    format!(
        r#"Generate a short, human-readable Allure step name for a UI test.
Action type: "{action}"
Element name: "{element}"
Value: "{value}"
Return only the final string, like "Click the 'Sign in' button" or "Enter '{{login}}' into the 'Username' field". Use placeholders like {{variable_name}} if the value is parameterized."#
    )
}

/// Prompt asking for a CSS selector of the target element
pub fn css_selector_prompt(html_context: &str, target_outer_html: &str) -> String {
    format!(
        r#"Analyze this HTML snippet:

{html_context}

The target element is `{target_outer_html}`. Provide the most robust and unique CSS selector for it. Return ONLY the selector string."#
    )
}
