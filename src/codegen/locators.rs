//! Locator list generation
//!
//! Each step carries candidate locators, most preferred first, rendered as
//! Selenium `(By.X, '...')` tuples for the generated page object.

use super::prompt;
use crate::llm::LanguageModel;
use crate::step::ElementDescriptor;
use serde::{Deserialize, Serialize};

/// Which locator families are emitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    /// CSS locators followed by XPath locators
    #[default]
    Smart,
    Css,
    Xpath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatorSettings {
    /// Attribute read from `dataAttributes` for a test-id locator
    pub custom_test_id: String,
    pub strategy: LocatorStrategy,
    pub exclude_xpath: bool,
    /// Ask the language model for a CSS selector
    pub use_llm: bool,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            custom_test_id: "data-testid".to_string(),
            strategy: LocatorStrategy::Smart,
            exclude_xpath: false,
            use_llm: false,
        }
    }
}

/// Build the deduplicated locator list for an element
pub async fn locator_list(
    data: &ElementDescriptor,
    settings: &LocatorSettings,
    model: &dyn LanguageModel,
) -> Vec<String> {
    let Some(selectors) = data.selectors.as_ref() else {
        return Vec::new();
    };
    let mut locators = Vec::new();

    if let Some(value) = data
        .data_attributes
        .get(&settings.custom_test_id)
        .filter(|v| !v.is_empty())
    {
        locators.push(format!(
            "(By.CSS_SELECTOR, '[{}=\"{}\"]')",
            settings.custom_test_id, value
        ));
    }

    if settings.use_llm {
        if let (Some(context), Some(target)) = (&data.html_context, &data.target_outer_html) {
            let prompt = prompt::css_selector_prompt(context, target);
            if let Some(selector) = model.complete(&prompt).await.filter(|s| !s.is_empty()) {
                locators.push(format!("(By.CSS_SELECTOR, '{}')", selector));
            }
        }
    }

    let mut css = Vec::new();
    if let Some(id) = non_empty(&selectors.id) {
        css.push(format!("(By.ID, '{}')", id));
    }
    if let Some(name) = non_empty(&selectors.name) {
        css.push(format!("(By.NAME, '{}')", name));
    }

    let mut xpath = Vec::new();
    if let Some(text) = non_empty(&selectors.xpath_text) {
        xpath.push(format!("(By.XPATH, '{}')", text));
    }
    if let Some(full) = non_empty(&selectors.full_xpath) {
        if !settings.exclude_xpath {
            xpath.push(format!("(By.XPATH, '{}')", full));
        }
    }

    match settings.strategy {
        LocatorStrategy::Css => locators.extend(css),
        LocatorStrategy::Xpath => locators.extend(xpath),
        LocatorStrategy::Smart => {
            locators.extend(css);
            locators.extend(xpath);
        }
    }

    let mut seen = std::collections::HashSet::new();
    locators.retain(|locator| seen.insert(locator.clone()));
    locators
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Disabled;
    use crate::step::Selectors;
    use async_trait::async_trait;

    fn login_button() -> ElementDescriptor {
        let mut data = ElementDescriptor {
            selectors: Some(Selectors {
                id: Some("login".to_string()),
                name: Some("login".to_string()),
                xpath_text: Some("//button[.='Log in']".to_string()),
                full_xpath: Some("/html/body/form/button".to_string()),
                ..Default::default()
            }),
            html_context: Some("<form><button id=\"login\">Log in</button></form>".to_string()),
            target_outer_html: Some("<button id=\"login\">Log in</button>".to_string()),
            ..Default::default()
        };
        data.data_attributes
            .insert("data-qa".to_string(), "login-btn".to_string());
        data
    }

    #[tokio::test]
    async fn test_smart_strategy_orders_css_before_xpath() {
        let settings = LocatorSettings::default();
        let locators = locator_list(&login_button(), &settings, &Disabled).await;
        assert_eq!(
            locators,
            vec![
                "(By.ID, 'login')",
                "(By.NAME, 'login')",
                "(By.XPATH, '//button[.='Log in']')",
                "(By.XPATH, '/html/body/form/button')",
            ]
        );
    }

    #[tokio::test]
    async fn test_custom_test_id_and_strategy_filters() {
        let settings = LocatorSettings {
            custom_test_id: "data-qa".to_string(),
            strategy: LocatorStrategy::Xpath,
            exclude_xpath: true,
            use_llm: false,
        };
        let locators = locator_list(&login_button(), &settings, &Disabled).await;
        assert_eq!(
            locators,
            vec![
                "(By.CSS_SELECTOR, '[data-qa=\"login-btn\"]')",
                "(By.XPATH, '//button[.='Log in']')",
            ]
        );

        let css_only = LocatorSettings {
            strategy: LocatorStrategy::Css,
            ..LocatorSettings::default()
        };
        assert_eq!(
            locator_list(&login_button(), &css_only, &Disabled).await.len(),
            2
        );
    }

    #[tokio::test]
    async fn test_no_selectors_no_locators() {
        let locators =
            locator_list(&ElementDescriptor::default(), &LocatorSettings::default(), &Disabled).await;
        assert!(locators.is_empty());
    }

    struct Selector;

    #[async_trait]
    impl LanguageModel for Selector {
        async fn complete(&self, prompt: &str) -> Option<String> {
            prompt.contains("Log in").then(|| "#login".to_string())
        }
    }

    #[tokio::test]
    async fn test_model_selector_only_when_enabled() {
        let off = locator_list(&login_button(), &LocatorSettings::default(), &Selector).await;
        assert!(!off.iter().any(|l| l.contains("#login")));

        let settings = LocatorSettings {
            use_llm: true,
            ..LocatorSettings::default()
        };
        let on = locator_list(&login_button(), &settings, &Selector).await;
        assert_eq!(on[0], "(By.CSS_SELECTOR, '#login')");
    }
}
