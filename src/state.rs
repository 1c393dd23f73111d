//! Persisted recorder state
//!
//! The whole recorder lives in one JSON document stored under
//! [`STATE_KEY`]. Loading overlays the stored top-level keys on the
//! defaults, so documents written by older versions pick up new fields.

use crate::error::{RecorderError, Result};
use crate::step::{Branch, FrameInfo, StepId, StepNode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Storage key of the state document
pub const STATE_KEY: &str = "autotestProState";

pub const DEFAULT_PAGE_CLASS: &str = "MyPage";
pub const DEFAULT_TEST_NAME: &str = "Default Test";
pub const DEFAULT_COLLECTION_NAME: &str = "Default Collection";

const MIGRATED_COLLECTION_ID: &str = "default_migrated";
const MIGRATED_COLLECTION_NAME: &str = "Migrated Collection";

/// Variable name to value, per environment
pub type Variables = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub collection_id: String,

    #[serde(default)]
    pub recorded_steps: Vec<StepNode>,

    #[serde(default = "default_page_class")]
    pub page_class_name: String,
}

fn default_page_class() -> String {
    DEFAULT_PAGE_CLASS.to_string()
}

impl TestCase {
    pub fn new(id: impl Into<String>, name: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            collection_id: collection_id.into(),
            recorded_steps: Vec::new(),
            page_class_name: default_page_class(),
        }
    }
}

/// Everything the recorder persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderState {
    pub is_recording: bool,
    pub is_assert_mode: bool,
    pub reselecting_step_id: Option<StepId>,

    /// Waiting for the element that becomes an IF condition
    pub is_recording_if_condition: bool,
    pub is_recording_in_conditional_block: bool,
    pub conditional_recording_context: Branch,

    /// Frame the last recorded step was in; `None` is the top document
    pub current_frame_context: Option<FrameInfo>,

    pub environments: IndexMap<String, Variables>,
    pub active_environment: String,

    pub collections: IndexMap<String, Collection>,
    pub test_cases: IndexMap<String, TestCase>,
    pub active_collection_id: Option<String>,
    pub active_test_case_id: Option<String>,

    /// Step whose editor the UI should open next
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_modal_for_step_id: Option<StepId>,
}

impl Default for RecorderState {
    fn default() -> Self {
        let mut environments = IndexMap::new();
        environments.insert("dev".to_string(), Variables::new());
        environments.insert("prod".to_string(), Variables::new());

        let mut collections = IndexMap::new();
        collections.insert(
            "default".to_string(),
            Collection {
                id: "default".to_string(),
                name: DEFAULT_COLLECTION_NAME.to_string(),
            },
        );

        let mut test_cases = IndexMap::new();
        test_cases.insert(
            "default_test".to_string(),
            TestCase::new("default_test", DEFAULT_TEST_NAME, "default"),
        );

        Self {
            is_recording: false,
            is_assert_mode: false,
            reselecting_step_id: None,
            is_recording_if_condition: false,
            is_recording_in_conditional_block: false,
            conditional_recording_context: Branch::Then,
            current_frame_context: None,
            environments,
            active_environment: "dev".to_string(),
            collections,
            test_cases,
            active_collection_id: Some("default".to_string()),
            active_test_case_id: Some("default_test".to_string()),
            open_modal_for_step_id: None,
        }
    }
}

impl RecorderState {
    /// Build the state from a stored document.
    ///
    /// A missing document yields the defaults. A document that cannot be
    /// read is logged and replaced by the defaults.
    pub fn from_stored(stored: Option<Value>) -> Self {
        let Some(stored) = stored else {
            return Self::default();
        };
        let Value::Object(mut raw) = stored else {
            log::error!("Stored state is not a JSON object, using defaults");
            return Self::default();
        };
        migrate_legacy(&mut raw);

        match serde_json::from_value::<Self>(Value::Object(raw)) {
            Ok(mut state) => {
                state.ensure_registry();
                state
            }
            Err(e) => {
                log::error!("Failed to read stored state, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Overlay an imported document on the current state.
    ///
    /// Top-level keys of `incoming` replace the current ones; legacy
    /// documents are migrated first.
    pub fn import(&mut self, incoming: Value) -> Result<()> {
        let Value::Object(mut incoming) = incoming else {
            return Err(RecorderError::InvalidState(
                "imported state must be a JSON object".to_string(),
            ));
        };
        migrate_legacy(&mut incoming);

        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(current) => current,
            _ => Map::new(),
        };
        merged.extend(incoming);

        let mut imported: Self = serde_json::from_value(Value::Object(merged))
            .map_err(|e| RecorderError::InvalidState(e.to_string()))?;
        imported.ensure_registry();
        *self = imported;
        Ok(())
    }

    /// Variables of the active environment
    pub fn active_variables(&self) -> Option<&Variables> {
        self.environments.get(&self.active_environment)
    }
}

/// Move a document that predates collections into a single collection.
///
/// Returns whether the document was migrated.
pub fn migrate_legacy(raw: &mut Map<String, Value>) -> bool {
    let has_test_cases = raw.get("testCases").is_some_and(|v| !v.is_null());
    let has_collections = raw.get("collections").is_some_and(|v| !v.is_null());
    if !has_test_cases || has_collections {
        return false;
    }

    log::info!("Migrating test cases into the '{}' collection", MIGRATED_COLLECTION_ID);

    if let Some(Value::Object(cases)) = raw.get_mut("testCases") {
        for (key, case) in cases.iter_mut() {
            if let Value::Object(case) = case {
                case.insert("collectionId".to_string(), json!(MIGRATED_COLLECTION_ID));
                case.entry("id").or_insert_with(|| json!(key));
                case.entry("name").or_insert_with(|| json!(key));
            }
        }
    }
    raw.insert(
        "collections".to_string(),
        json!({
            MIGRATED_COLLECTION_ID: {"id": MIGRATED_COLLECTION_ID, "name": MIGRATED_COLLECTION_NAME}
        }),
    );
    raw.insert("activeCollectionId".to_string(), json!(MIGRATED_COLLECTION_ID));
    true
}
