//! Collection and test-case registry
//!
//! Reducer-style operations on [`RecorderState`]. At least one collection
//! and one test case exist after every operation; unknown ids are no-ops.

use crate::ids;
use crate::state::{
    Collection, RecorderState, TestCase, DEFAULT_COLLECTION_NAME, DEFAULT_TEST_NAME,
};

impl RecorderState {
    // ===== COLLECTIONS =====

    /// Create a collection with one empty test case and make both active
    pub fn create_collection(&mut self, name: impl Into<String>) -> String {
        self.leave_active_test_case();
        let collection_id = ids::prefixed("coll");
        self.collections.insert(
            collection_id.clone(),
            Collection {
                id: collection_id.clone(),
                name: name.into(),
            },
        );
        self.active_collection_id = Some(collection_id.clone());

        let test_case_id = ids::prefixed("test");
        self.test_cases.insert(
            test_case_id.clone(),
            TestCase::new(test_case_id.clone(), DEFAULT_TEST_NAME, collection_id.clone()),
        );
        self.active_test_case_id = Some(test_case_id);

        log::info!("Created collection {}", collection_id);
        collection_id
    }

    /// Activate a collection and its first test case (if it has one)
    pub fn switch_collection(&mut self, id: &str) -> bool {
        if !self.collections.contains_key(id) {
            log::debug!("switch_collection: unknown collection {}", id);
            return false;
        }
        let next = self.first_test_case_in(id);
        if next != self.active_test_case_id {
            self.leave_active_test_case();
        }
        self.active_collection_id = Some(id.to_string());
        self.active_test_case_id = next;
        true
    }

    pub fn rename_collection(&mut self, id: &str, new_name: impl Into<String>) -> bool {
        match self.collections.get_mut(id) {
            Some(collection) => {
                collection.name = new_name.into();
                true
            }
            None => false,
        }
    }

    /// Delete a collection together with its test cases
    pub fn delete_collection(&mut self, id: &str) -> bool {
        if !self.collections.contains_key(id) {
            return false;
        }
        let owns_active = self.active_collection_id.as_deref() == Some(id)
            || self.active_test_case().is_some_and(|tc| tc.collection_id == id);
        if owns_active {
            self.leave_active_test_case();
        }
        self.collections.shift_remove(id);
        self.test_cases.retain(|_, tc| tc.collection_id != id);
        log::info!("Deleted collection {}", id);

        if self.collections.is_empty() {
            self.install_default_collection();
        } else if self.active_collection_id.as_deref() == Some(id) {
            let first = self.collections.keys().next().cloned();
            self.active_test_case_id = first.as_deref().and_then(|c| self.first_test_case_in(c));
            self.active_collection_id = first;
        }
        true
    }

    // ===== TEST CASES =====

    /// Create a test case in the active collection and activate it
    pub fn create_test_case(&mut self, name: impl Into<String>) -> Option<String> {
        let Some(collection_id) = self.active_collection_id.clone() else {
            log::warn!("create_test_case: no active collection");
            return None;
        };
        self.leave_active_test_case();
        let id = ids::prefixed("test");
        self.test_cases
            .insert(id.clone(), TestCase::new(id.clone(), name, collection_id));
        self.active_test_case_id = Some(id.clone());
        Some(id)
    }

    /// Activate a test case; the active collection is left alone
    pub fn switch_test_case(&mut self, id: &str) -> bool {
        if !self.test_cases.contains_key(id) {
            return false;
        }
        if self.active_test_case_id.as_deref() != Some(id) {
            self.leave_active_test_case();
        }
        self.active_test_case_id = Some(id.to_string());
        true
    }

    /// Delete the active test case.
    ///
    /// Requests for any other test case are ignored. The collection never
    /// ends up empty: a fresh default test case replaces the last one.
    pub fn delete_test_case(&mut self, id: &str) -> bool {
        let is_active = self.active_test_case().is_some_and(|tc| tc.id == id);
        if !is_active {
            log::debug!("delete_test_case: {} is not the active test case", id);
            return false;
        }
        self.leave_active_test_case();
        let Some(deleted) = self.test_cases.shift_remove(id) else {
            return false;
        };

        let collection_id = deleted.collection_id;
        match self.first_test_case_in(&collection_id) {
            Some(next) => self.active_test_case_id = Some(next),
            None => {
                let new_id = ids::prefixed("test");
                self.test_cases.insert(
                    new_id.clone(),
                    TestCase::new(new_id.clone(), DEFAULT_TEST_NAME, collection_id),
                );
                self.active_test_case_id = Some(new_id);
            }
        }
        true
    }

    pub fn rename_test_case(&mut self, id: &str, new_name: impl Into<String>) -> bool {
        match self.test_cases.get_mut(id) {
            Some(test_case) => {
                test_case.name = new_name.into();
                true
            }
            None => false,
        }
    }

    /// Set the page-object class name of the active test case
    pub fn update_page_name(&mut self, page_name: impl Into<String>) -> bool {
        match self.active_test_case_mut() {
            Some(test_case) => {
                test_case.page_class_name = page_name.into();
                true
            }
            None => false,
        }
    }

    // ===== ACTIVE POINTERS =====

    /// The active test case, falling back to the first one when the pointer is stale
    pub fn active_test_case(&self) -> Option<&TestCase> {
        self.active_test_case_id
            .as_ref()
            .and_then(|id| self.test_cases.get(id))
            .or_else(|| self.test_cases.values().next())
    }

    /// Mutable active test case; a stale pointer is repaired in place
    pub fn active_test_case_mut(&mut self) -> Option<&mut TestCase> {
        let valid = self
            .active_test_case_id
            .as_ref()
            .is_some_and(|id| self.test_cases.contains_key(id));
        if !valid {
            let first = self.test_cases.keys().next().cloned();
            if first.is_some() {
                log::debug!(
                    "Active test case {:?} not found, falling back to {:?}",
                    self.active_test_case_id,
                    first
                );
            }
            self.active_test_case_id = first;
        }
        let id = self.active_test_case_id.as_ref()?;
        self.test_cases.get_mut(id)
    }

    /// Test cases that share the active test case's page class
    pub fn test_cases_for_page(&self, page_class_name: &str) -> Vec<&TestCase> {
        self.test_cases
            .values()
            .filter(|tc| tc.page_class_name == page_class_name)
            .collect()
    }

    /// Restore the registry guarantees after loading or importing a document
    pub(crate) fn ensure_registry(&mut self) {
        if self.collections.is_empty() {
            self.install_default_collection();
            return;
        }

        let collection_valid = self
            .active_collection_id
            .as_ref()
            .is_some_and(|id| self.collections.contains_key(id));
        if !collection_valid {
            self.active_collection_id = self.collections.keys().next().cloned();
        }
        let Some(collection_id) = self.active_collection_id.clone() else {
            return;
        };

        if self.test_cases.is_empty() {
            let id = ids::prefixed("test");
            self.test_cases.insert(
                id.clone(),
                TestCase::new(id.clone(), DEFAULT_TEST_NAME, collection_id),
            );
            self.active_test_case_id = Some(id);
            return;
        }

        let test_case_valid = self
            .active_test_case_id
            .as_ref()
            .is_some_and(|id| self.test_cases.contains_key(id));
        if !test_case_valid {
            self.active_test_case_id = self
                .first_test_case_in(&collection_id)
                .or_else(|| self.test_cases.keys().next().cloned());
        }
    }

    /// Close what the active test case left open; called while the pointer
    /// still names it, before any operation moves the pointer away
    fn leave_active_test_case(&mut self) {
        self.reset_conditional_recording();
    }

    fn first_test_case_in(&self, collection_id: &str) -> Option<String> {
        self.test_cases
            .values()
            .find(|tc| tc.collection_id == collection_id)
            .map(|tc| tc.id.clone())
    }

    fn install_default_collection(&mut self) {
        self.collections.insert(
            "default".to_string(),
            Collection {
                id: "default".to_string(),
                name: DEFAULT_COLLECTION_NAME.to_string(),
            },
        );
        self.active_collection_id = Some("default".to_string());
        self.test_cases.insert(
            "test_default".to_string(),
            TestCase::new("test_default", DEFAULT_TEST_NAME, "default"),
        );
        self.active_test_case_id = Some("test_default".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_collection_activates_new_test_case() {
        let mut state = RecorderState::default();
        let id = state.create_collection("Checkout");

        assert!(id.starts_with("coll_"));
        assert_eq!(state.active_collection_id.as_deref(), Some(id.as_str()));
        let active = state.active_test_case().unwrap();
        assert_eq!(active.collection_id, id);
        assert_eq!(active.name, "Default Test");
        assert!(active.id.starts_with("test_"));
    }

    #[test]
    fn test_switch_collection() {
        let mut state = RecorderState::default();
        let created = state.create_collection("Other");

        assert!(!state.switch_collection("nope"));
        assert_eq!(state.active_collection_id.as_deref(), Some(created.as_str()));

        assert!(state.switch_collection("default"));
        assert_eq!(state.active_test_case_id.as_deref(), Some("default_test"));
    }

    #[test]
    fn test_delete_last_collection_synthesizes_default() {
        let mut state = RecorderState::default();
        assert!(state.delete_collection("default"));

        assert_eq!(state.collections.len(), 1);
        assert_eq!(state.active_collection_id.as_deref(), Some("default"));
        assert_eq!(state.active_test_case_id.as_deref(), Some("test_default"));
        assert!(!state.test_cases.contains_key("default_test"));
    }

    #[test]
    fn test_delete_active_collection_moves_to_first_remaining() {
        let mut state = RecorderState::default();
        let created = state.create_collection("Second");
        assert!(state.delete_collection(&created));

        assert_eq!(state.active_collection_id.as_deref(), Some("default"));
        assert_eq!(state.active_test_case_id.as_deref(), Some("default_test"));
        assert!(state.test_cases.values().all(|tc| tc.collection_id != created));
    }

    #[test]
    fn test_create_test_case_requires_active_collection() {
        let mut state = RecorderState::default();
        state.active_collection_id = None;
        assert_eq!(state.create_test_case("Orphan"), None);

        state.active_collection_id = Some("default".to_string());
        let id = state.create_test_case("Login").unwrap();
        assert_eq!(state.active_test_case().unwrap().name, "Login");
        assert_eq!(state.test_cases[&id].page_class_name, "MyPage");
    }

    #[test]
    fn test_delete_only_active_test_case() {
        let mut state = RecorderState::default();
        let second = state.create_test_case("Second").unwrap();

        assert!(!state.delete_test_case("default_test"));
        assert!(state.test_cases.contains_key("default_test"));

        assert!(state.delete_test_case(&second));
        assert_eq!(state.active_test_case_id.as_deref(), Some("default_test"));
    }

    #[test]
    fn test_delete_last_test_case_in_collection() {
        let mut state = RecorderState::default();
        assert!(state.delete_test_case("default_test"));

        let active = state.active_test_case().unwrap();
        assert_ne!(active.id, "default_test");
        assert_eq!(active.name, "Default Test");
        assert_eq!(active.collection_id, "default");
    }

    #[test]
    fn test_stale_active_pointer_is_repaired() {
        let mut state = RecorderState::default();
        state.active_test_case_id = Some("gone".to_string());
        assert!(state.update_page_name("LoginPage"));
        assert_eq!(state.active_test_case_id.as_deref(), Some("default_test"));
        assert_eq!(state.test_cases["default_test"].page_class_name, "LoginPage");
    }

    #[test]
    fn test_renames_ignore_unknown_ids() {
        let mut state = RecorderState::default();
        assert!(!state.rename_collection("x", "X"));
        assert!(!state.rename_test_case("x", "X"));
        assert!(state.rename_test_case("default_test", "Smoke"));
        assert_eq!(state.test_cases["default_test"].name, "Smoke");
    }

    #[test]
    fn test_moving_the_active_test_case_closes_its_blocks() {
        use crate::step::{Assertion, Branch, StepAction};
        use crate::tree::{self, fixtures::step};

        let mut state = RecorderState::default();
        state.start_recording(None);
        state.start_if_block();
        state
            .open_conditional(step(1.0, StepAction::Assert(Assertion::Visible)))
            .unwrap();
        state.switch_to_else();

        let created = state.create_test_case("Other").unwrap();
        assert!(!state.is_recording_in_conditional_block);
        assert_eq!(state.conditional_recording_context, Branch::Then);
        assert!(!tree::has_open_blocks(&state.test_cases["default_test"].recorded_steps));

        // the same pointer is not a move
        state.start_if_block();
        assert!(state.switch_test_case(&created));
        assert!(state.is_recording_if_condition);

        assert!(state.switch_test_case("default_test"));
        assert!(!state.is_recording_if_condition);
        assert!(state.is_recording);
    }
}
