//! Step object factory
//!
//! Turns an interaction (step kind plus element descriptor) into a complete
//! [`Step`]: id, screenshot, locators, name and page-object code.

use crate::browser::capture::{to_data_url, ScreenshotSource};
use crate::codegen::{self, LocatorSettings};
use crate::ids;
use crate::llm::LanguageModel;
use crate::step::{ElementDescriptor, Step, StepAction, StepCode};
use std::sync::Arc;

pub struct StepFactory {
    screenshots: Arc<dyn ScreenshotSource>,
    model: Arc<dyn LanguageModel>,
    locators: LocatorSettings,
}

impl StepFactory {
    pub fn new(
        screenshots: Arc<dyn ScreenshotSource>,
        model: Arc<dyn LanguageModel>,
        locators: LocatorSettings,
    ) -> Self {
        Self {
            screenshots,
            model,
            locators,
        }
    }

    /// Build a new step. Collaborator failures only leave fields empty.
    pub async fn create_step(&self, action: StepAction, data: ElementDescriptor) -> Step {
        let screenshot = self.screenshot(&data).await;
        let locators = codegen::locator_list(&data, &self.locators, self.model.as_ref()).await;

        let mut step = Step {
            id: ids::step_id(),
            action,
            data,
            screenshot,
            variable_name: None,
            variable_for_value: None,
            locators,
            code: StepCode::default(),
            allure_step: String::new(),
            boolean_check: None,
        };
        self.refresh_derived(&mut step).await;
        log::debug!("Created {} step {}", step.action.label(), step.id);
        step
    }

    /// Point an existing step at another element
    pub async fn rebind(&self, step: &mut Step, data: ElementDescriptor) {
        step.locators = codegen::locator_list(&data, &self.locators, self.model.as_ref()).await;
        step.screenshot = self.screenshot(&data).await;
        step.data = data;
        self.refresh_derived(step).await;
    }

    /// Regenerate the step name and code
    pub async fn refresh_derived(&self, step: &mut Step) {
        step.allure_step = codegen::step_name(step, self.model.as_ref()).await;
        codegen::apply(step);
    }

    async fn screenshot(&self, data: &ElementDescriptor) -> Option<String> {
        let rect = data.rect.filter(|r| !r.is_degenerate())?;
        match self.screenshots.capture_region(&rect).await {
            Ok(png) => png.map(|png| to_data_url(&png)),
            Err(e) => {
                log::error!("Screenshot failed: {:#}", e);
                None
            }
        }
    }
}
