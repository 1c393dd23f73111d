//! Command dispatcher
//!
//! Every command runs one cycle under a single async mutex: load the state,
//! apply the command, persist, notify. Collaborator calls (screenshots,
//! language model) are awaited inside the cycle, so bridging frame steps and
//! the step that triggered them are appended atomically.

use crate::browser::capture::ScreenshotSource;
use crate::codegen::{self, CodegenClient, GenerateOptions, GenerateRequest, LocatorSettings};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::factory::StepFactory;
use crate::frame;
use crate::llm::LanguageModel;
use crate::mode::{Disposition, PageSignal};
use crate::notify::{Notification, Notifier};
use crate::state::{RecorderState, Variables};
use crate::step::{Assertion, ElementDescriptor, StepAction, StepId, StepNode};
use crate::store::StateStore;
use crate::tree;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

// ===== WIRE TYPES =====

/// A command from the UI or the page observer
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Command {
    CreateCollection {
        name: String,
    },
    SwitchCollection {
        id: String,
    },
    RenameCollection {
        id: String,
        new_name: String,
    },
    DeleteCollection {
        id: String,
    },
    CreateTestCase {
        name: String,
    },
    SwitchTestCase {
        id: String,
    },
    DeleteTestCase {
        id: String,
    },
    RenameTestCase {
        id: String,
        new_name: String,
    },
    UpdatePageName {
        page_name: String,
    },
    Start {
        #[serde(default)]
        page_name: Option<String>,
    },
    Stop,
    RecordAction {
        #[serde(rename = "type")]
        action_type: String,
        #[serde(default)]
        sub_type: Option<String>,
        #[serde(default)]
        data: ElementDescriptor,
    },
    /// Context-menu entry picked on the last right-clicked element
    RecordMenuAction {
        menu_item_id: String,
        parent_menu_item_id: String,
        #[serde(default)]
        data: ElementDescriptor,
    },
    StartIfBlock,
    SwitchToElseBlock,
    EndIfBlock,
    DeleteStep {
        id: StepId,
    },
    ClearSteps,
    ReorderSteps {
        new_order: Vec<StepId>,
    },
    GetCurrentState,
    GenerateFullCode {
        #[serde(default)]
        generate_pom: bool,
        #[serde(default)]
        generate_test: bool,
        #[serde(default)]
        generate_base_page: bool,
    },
    GetStepData {
        id: StepId,
    },
    /// `data` is a partial step; its `id` selects the step
    UpdateStep {
        data: Map<String, Value>,
    },
    EnterAssertMode,
    ReselectElement {
        step_id: StepId,
    },
    RecordAssertAction {
        #[serde(default)]
        data: ElementDescriptor,
    },
    ClearModalFlag,
    GetFullState,
    ImportState {
        state: Value,
    },
    SetActiveEnvironment {
        env: String,
    },
    UpdateVariables {
        variables: Variables,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Done {},
    State { state: Box<RecorderState> },
    Step { step: Option<StepNode> },
    Code { code: String },
    Error { error: String },
}

impl Reply {
    fn state(state: &RecorderState) -> Self {
        Self::State {
            state: Box::new(state.clone()),
        }
    }

    fn error(error: impl ToString) -> Self {
        Self::Error {
            error: error.to_string(),
        }
    }
}

/// What a handled command asks the cycle to do afterwards
struct Effect {
    persist: bool,
    push_state: bool,
    signals: Vec<PageSignal>,
    reply: Reply,
}

impl Effect {
    /// Persist and push the new state to the UI
    fn changed() -> Self {
        Self {
            persist: true,
            push_state: true,
            signals: Vec::new(),
            reply: Reply::Done {},
        }
    }

    /// Persist without pushing the state
    fn saved() -> Self {
        Self {
            push_state: false,
            ..Self::changed()
        }
    }

    fn unchanged() -> Self {
        Self::reply(Reply::Done {})
    }

    fn reply(reply: Reply) -> Self {
        Self {
            persist: false,
            push_state: false,
            signals: Vec::new(),
            reply,
        }
    }

    /// After the active test case may have changed: a condition capture
    /// cut short also takes the page out of selection mode
    fn moved(capturing: bool, state: &RecorderState) -> Self {
        if capturing && !state.is_recording_if_condition {
            Self::changed().signal(PageSignal::ExitSelectionMode)
        } else {
            Self::changed()
        }
    }

    fn signal(mut self, signal: PageSignal) -> Self {
        self.signals.push(signal);
        self
    }
}

// ===== DISPATCHER =====

pub struct Dispatcher {
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    screenshots: Arc<dyn ScreenshotSource>,
    locators: LocatorSettings,
    factory: StepFactory,
    codegen: CodegenClient,
    cycle: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        config: &RecorderConfig,
        store: Arc<dyn StateStore>,
        screenshots: Arc<dyn ScreenshotSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let locators = config.locator_settings();
        Self {
            factory: StepFactory::new(screenshots.clone(), config.language_model(), locators.clone()),
            store,
            notifier,
            screenshots,
            locators,
            codegen: CodegenClient::new(config.codegen_url.clone())
                .with_license_key(config.license_key.clone()),
            cycle: Mutex::new(()),
        }
    }

    /// Replace the language model chosen from the settings
    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.factory = StepFactory::new(self.screenshots.clone(), model, self.locators.clone());
        self
    }

    pub async fn dispatch(&self, command: Command) -> Reply {
        match command {
            Command::UpdateStep { data } => self.update_step(data).await,
            Command::GenerateFullCode {
                generate_pom,
                generate_test,
                generate_base_page,
            } => {
                self.generate_full_code(GenerateOptions {
                    generate_pom,
                    generate_test,
                    generate_base_page,
                })
                .await
            }
            command => {
                let _cycle = self.cycle.lock().await;
                let mut state = self.load_state().await;
                match self.apply(&mut state, command).await {
                    Ok(effect) => self.finish(state, effect).await,
                    Err(e) => skipped(e),
                }
            }
        }
    }

    /// Current persisted state
    pub async fn snapshot(&self) -> RecorderState {
        let _cycle = self.cycle.lock().await;
        self.load_state().await
    }

    async fn load_state(&self) -> RecorderState {
        match self.store.load().await {
            Ok(document) => RecorderState::from_stored(document),
            Err(e) => {
                log::error!("Failed to load state, using defaults: {}", e);
                RecorderState::default()
            }
        }
    }

    async fn finish(&self, state: RecorderState, effect: Effect) -> Reply {
        if effect.persist {
            if let Err(e) = self.store.save(&state).await {
                log::error!("Failed to persist state: {}", e);
                return Reply::error(e);
            }
        }
        for signal in effect.signals {
            self.notifier.notify(signal.into());
        }
        if effect.push_state {
            self.notifier.notify(Notification::UpdateState {
                state: Box::new(state),
            });
        }
        effect.reply
    }

    async fn apply(&self, state: &mut RecorderState, command: Command) -> Result<Effect> {
        let capturing = state.is_recording_if_condition;
        let effect = match command {
            // ----- registry -----
            Command::CreateCollection { name } => {
                state.create_collection(name);
                Effect::moved(capturing, state)
            }
            Command::SwitchCollection { id } => {
                state.switch_collection(&id);
                Effect::moved(capturing, state)
            }
            Command::RenameCollection { id, new_name } => {
                state.rename_collection(&id, new_name);
                Effect::changed()
            }
            Command::DeleteCollection { id } => {
                state.delete_collection(&id);
                Effect::moved(capturing, state)
            }
            Command::CreateTestCase { name } => {
                state.create_test_case(name);
                Effect::moved(capturing, state)
            }
            Command::SwitchTestCase { id } => {
                state.switch_test_case(&id);
                Effect::moved(capturing, state)
            }
            Command::DeleteTestCase { id } => {
                state.delete_test_case(&id);
                Effect::moved(capturing, state)
            }
            Command::RenameTestCase { id, new_name } => {
                state.rename_test_case(&id, new_name);
                Effect::changed()
            }
            Command::UpdatePageName { page_name } => {
                state.update_page_name(page_name);
                Effect::changed()
            }

            // ----- recording -----
            Command::Start { page_name } => {
                state.start_recording(page_name);
                Effect::changed()
            }
            Command::Stop => Effect::changed().signal(state.stop_recording()),
            Command::RecordAction {
                action_type,
                sub_type,
                data,
            } => self.record_action(state, &action_type, sub_type.as_deref(), data).await?,
            Command::RecordMenuAction {
                menu_item_id,
                parent_menu_item_id,
                data,
            } => {
                self.record_menu_action(state, &menu_item_id, &parent_menu_item_id, data)
                    .await?
            }
            Command::StartIfBlock => match state.start_if_block() {
                Some(signal) => Effect::changed().signal(signal),
                None => Effect::unchanged(),
            },
            Command::SwitchToElseBlock => {
                state.switch_to_else();
                Effect::changed()
            }
            Command::EndIfBlock => {
                state.end_if_block();
                Effect::changed()
            }
            Command::EnterAssertMode => Effect::saved().signal(state.enter_assert_mode()),
            Command::ReselectElement { step_id } => {
                Effect::saved().signal(state.begin_reselect(step_id))
            }
            Command::RecordAssertAction { data } => self.record_assert_action(state, data).await?,
            Command::ClearModalFlag => {
                state.open_modal_for_step_id = None;
                Effect::changed()
            }

            // ----- step editing -----
            Command::DeleteStep { id } => {
                let test_case = state
                    .active_test_case_mut()
                    .ok_or(RecorderError::NoActiveTestCase)?;
                if !tree::delete_by_id(&mut test_case.recorded_steps, id) {
                    log::debug!("delete_step: step {} not found", id);
                }
                state.settle_conditional_flag();
                Effect::changed()
            }
            Command::ClearSteps => {
                let test_case = state
                    .active_test_case_mut()
                    .ok_or(RecorderError::NoActiveTestCase)?;
                test_case.recorded_steps.clear();
                state.settle_conditional_flag();
                Effect::changed()
            }
            Command::ReorderSteps { new_order } => {
                let test_case = state
                    .active_test_case_mut()
                    .ok_or(RecorderError::NoActiveTestCase)?;
                tree::reorder_top_level(&mut test_case.recorded_steps, &new_order);
                state.settle_conditional_flag();
                Effect::changed()
            }
            Command::GetStepData { id } => {
                let step = state
                    .active_test_case()
                    .and_then(|tc| tree::find_by_id(&tc.recorded_steps, id))
                    .cloned();
                Effect::reply(Reply::Step { step })
            }

            // ----- state & environments -----
            Command::GetCurrentState => {
                self.notifier.notify(Notification::UpdateState {
                    state: Box::new(state.clone()),
                });
                Effect::reply(Reply::state(state))
            }
            Command::GetFullState => Effect::reply(Reply::state(state)),
            Command::ImportState { state: incoming } => {
                state.import(incoming)?;
                log::info!("Imported state");
                Effect::changed()
            }
            Command::SetActiveEnvironment { env } => {
                state.active_environment = env;
                Effect::changed()
            }
            Command::UpdateVariables { variables } => {
                state
                    .environments
                    .insert(state.active_environment.clone(), variables);
                if let Some(test_case) = state.active_test_case_mut() {
                    tree::for_each_step_mut(&mut test_case.recorded_steps, &mut codegen::apply);
                }
                Effect::changed()
            }

            Command::UpdateStep { .. } | Command::GenerateFullCode { .. } => {
                return Err(RecorderError::Other(
                    "command runs outside the state cycle".to_string(),
                ))
            }
        };
        Ok(effect)
    }

    // ===== RECORDING =====

    async fn record_action(
        &self,
        state: &mut RecorderState,
        action_type: &str,
        sub_type: Option<&str>,
        data: ElementDescriptor,
    ) -> Result<Effect> {
        match state.action_disposition() {
            Disposition::Ignore => {
                log::debug!("Ignoring {} while not recording", action_type);
                Ok(Effect::unchanged())
            }
            Disposition::CaptureCondition => self.capture_condition(state, data).await,
            Disposition::Append => {
                let action = StepAction::from_parts(action_type, sub_type, &data)?;
                if action.is_input() && self.coalesce_input(state, &data).await? {
                    return Ok(Effect::changed());
                }
                self.record_step(state, action, data).await?;
                Ok(Effect::changed())
            }
        }
    }

    async fn record_menu_action(
        &self,
        state: &mut RecorderState,
        menu_item_id: &str,
        parent_menu_item_id: &str,
        data: ElementDescriptor,
    ) -> Result<Effect> {
        if !state.is_recording {
            log::debug!("Ignoring menu action {} while not recording", menu_item_id);
            return Ok(Effect::unchanged());
        }
        let step_type = match parent_menu_item_id {
            "assertions" => "assert",
            "waits" => "wait",
            "actions" => menu_item_id,
            other => {
                return Err(RecorderError::UnknownStepType(format!(
                    "{}/{}",
                    other, menu_item_id
                )))
            }
        };
        let action = StepAction::from_parts(step_type, Some(menu_item_id), &data)?;
        self.record_step(state, action, data).await?;
        Ok(Effect::changed())
    }

    async fn record_assert_action(
        &self,
        state: &mut RecorderState,
        data: ElementDescriptor,
    ) -> Result<Effect> {
        if let Some(step_id) = state.reselecting_step_id {
            let test_case = state
                .active_test_case_mut()
                .ok_or(RecorderError::NoActiveTestCase)?;
            match tree::find_step_mut(&mut test_case.recorded_steps, step_id) {
                Some(step) => {
                    self.factory.rebind(step, data).await;
                    log::info!("Re-selected element for step {}", step_id);
                }
                None => log::warn!("Re-selected step {} no longer exists", step_id),
            }
        } else if state.action_disposition() == Disposition::CaptureCondition {
            state.finish_assert_selection();
            return self.capture_condition(state, data).await;
        } else {
            let action = StepAction::from_parts("assert", Some("assertVisible"), &data)?;
            let step_id = self.record_step(state, action, data).await?;
            state.open_modal_for_step_id = Some(step_id);
        }
        state.finish_assert_selection();
        Ok(Effect::changed())
    }

    /// Open a conditional block whose condition checks the selected element
    async fn capture_condition(
        &self,
        state: &mut RecorderState,
        data: ElementDescriptor,
    ) -> Result<Effect> {
        if state.active_test_case().is_none() {
            return Err(RecorderError::NoActiveTestCase);
        }
        let condition = self
            .factory
            .create_step(StepAction::Assert(Assertion::Visible), data)
            .await;
        let signal = state.open_conditional(condition)?;
        Ok(Effect::changed().signal(signal))
    }

    /// Append a step (after any frame bridging steps) at the insertion point
    async fn record_step(
        &self,
        state: &mut RecorderState,
        action: StepAction,
        data: ElementDescriptor,
    ) -> Result<StepId> {
        if state.active_test_case().is_none() {
            return Err(RecorderError::NoActiveTestCase);
        }

        let mut nodes = Vec::new();
        for switch in frame::reconcile(&mut state.current_frame_context, data.iframe_info.as_ref()) {
            let (bridge_action, bridge_data) = switch.step_parts();
            let bridge = self.factory.create_step(bridge_action, bridge_data).await;
            nodes.push(StepNode::Step(bridge));
        }

        let step = self.factory.create_step(action, data).await;
        let step_id = step.id;
        nodes.push(StepNode::Step(step));
        state.append_to_active(nodes)?;
        Ok(step_id)
    }

    /// Typing into the same field again updates the last input step of the
    /// current branch instead of adding one
    async fn coalesce_input(&self, state: &mut RecorderState, data: &ElementDescriptor) -> Result<bool> {
        let Some(xpath) = data.full_xpath() else {
            return Ok(false);
        };
        let point = state.insertion_point();
        let test_case = state
            .active_test_case_mut()
            .ok_or(RecorderError::NoActiveTestCase)?;

        let target = tree::branch(&test_case.recorded_steps, &point)
            .unwrap_or(test_case.recorded_steps.as_slice());
        let Some(step_id) = tree::last_input_for(target, xpath) else {
            return Ok(false);
        };
        let Some(step) = tree::find_step_mut(&mut test_case.recorded_steps, step_id) else {
            return Ok(false);
        };

        step.data.value = data.value.clone();
        self.factory.refresh_derived(step).await;
        log::debug!("Updated input step {} in place", step_id);
        Ok(true)
    }

    // ===== OUTSIDE THE CYCLE =====

    /// Merge the patch, then regenerate the step's code in a second cycle.
    ///
    /// The second cycle only writes `code` and `booleanCheck`, so an edit
    /// committed in between keeps everything else.
    async fn update_step(&self, patch: Map<String, Value>) -> Reply {
        let Some(step_id) = patch_step_id(&patch) else {
            log::warn!("update_step without a step id");
            return Reply::error(RecorderError::InvalidPatch("missing step id".to_string()));
        };

        let test_case_id = {
            let _cycle = self.cycle.lock().await;
            let mut state = self.load_state().await;
            let Some(test_case) = state.active_test_case_mut() else {
                return skipped(RecorderError::NoActiveTestCase);
            };
            let test_case_id = test_case.id.clone();
            match tree::update_by_id(&mut test_case.recorded_steps, step_id, &patch) {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("update_step: step {} not found", step_id);
                    return Reply::Done {};
                }
                Err(e) => return skipped(e),
            }
            let reply = self.finish(state, Effect::changed()).await;
            if let Reply::Error { .. } = reply {
                return reply;
            }
            test_case_id
        };

        let _cycle = self.cycle.lock().await;
        let mut state = self.load_state().await;
        // the edit belongs to the test case it was made in, even if another one is active now
        let regenerated = state
            .test_cases
            .get_mut(&test_case_id)
            .and_then(|tc| tree::find_step_mut(&mut tc.recorded_steps, step_id))
            .map(codegen::apply)
            .is_some();
        if !regenerated {
            log::debug!("update_step: step {} removed before its code was regenerated", step_id);
            return Reply::Done {};
        }
        self.finish(state, Effect::changed()).await
    }

    /// Snapshot the request under the lock, call the service without it
    async fn generate_full_code(&self, options: GenerateOptions) -> Reply {
        let request = {
            let _cycle = self.cycle.lock().await;
            let state = self.load_state().await;
            GenerateRequest::snapshot(&state, options)
        };
        let result = match request {
            Ok(request) => self.codegen.generate(&request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(code) => Reply::Code { code },
            Err(e) => Reply::error(e),
        }
    }
}

/// Log a failed command. A missing active test case skips the command
/// quietly; anything else is reported to the caller.
fn skipped(e: RecorderError) -> Reply {
    log::warn!("Command skipped: {}", e);
    match e {
        RecorderError::NoActiveTestCase => Reply::Done {},
        e => Reply::error(e),
    }
}

fn patch_step_id(patch: &Map<String, Value>) -> Option<StepId> {
    serde_json::from_value(patch.get("id")?.clone()).ok()
}
