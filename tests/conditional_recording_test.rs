//! IF/ELSE recording through the dispatcher
//!
//! Tests cover:
//! - Condition capture from both the action and the assertion channel
//! - Then/else routing and block finalization
//! - Nested blocks
//! - Page notifications around condition capture

use autotest_recorder::{
    Assertion, Branch, BroadcastNotifier, Command, Dispatcher, MemoryStore, NoCapture,
    Notification, RecorderConfig, RecorderState, StepAction, StepNode,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn recorder_with(notifier: Arc<BroadcastNotifier>) -> Dispatcher {
    Dispatcher::new(
        &RecorderConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(NoCapture),
        notifier,
    )
}

fn recorder() -> Dispatcher {
    recorder_with(Arc::new(BroadcastNotifier::default()))
}

async fn send(recorder: &Dispatcher, command: Value) -> Value {
    let command: Command = serde_json::from_value(command).expect("valid command");
    serde_json::to_value(recorder.dispatch(command).await).expect("reply serializes")
}

fn element(id: &str) -> Value {
    json!({
        "selectors": { "id": id, "fullXpath": format!("/html/body/*[@id='{}']", id) },
        "tag": "button",
        "text": id
    })
}

async fn click(recorder: &Dispatcher, id: &str) {
    let reply = send(recorder, json!({"command": "record_action", "type": "click", "data": element(id)})).await;
    assert_eq!(reply, json!({}));
}

fn steps(state: &RecorderState) -> &[StepNode] {
    &state.active_test_case().expect("active test case").recorded_steps
}

fn element_id(node: &StepNode) -> Option<&str> {
    node.as_step()?.data.selectors.as_ref()?.id.as_deref()
}

fn ids(nodes: &[StepNode]) -> Vec<&str> {
    nodes.iter().filter_map(element_id).collect()
}

// ===== BASIC IF/ELSE =====

#[tokio::test]
async fn test_if_else_block_from_assertion_selection() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;
    click(&recorder, "before").await;

    send(&recorder, json!({"command": "start_if_block"})).await;
    let state = recorder.snapshot().await;
    assert!(state.is_recording_if_condition);

    // the page reports the picked element on the assertion channel
    send(&recorder, json!({"command": "record_assert_action", "data": element("banner")})).await;
    click(&recorder, "accept").await;
    send(&recorder, json!({"command": "switch_to_else_block"})).await;
    click(&recorder, "dismiss").await;
    send(&recorder, json!({"command": "end_if_block"})).await;
    click(&recorder, "after").await;

    let state = recorder.snapshot().await;
    let steps = steps(&state);
    assert_eq!(steps.len(), 3);
    assert_eq!(element_id(&steps[0]), Some("before"));
    assert_eq!(element_id(&steps[2]), Some("after"));

    let block = steps[1].as_block().expect("conditional block");
    assert!(block.is_finalized);
    assert_eq!(block.condition.action, StepAction::Assert(Assertion::Visible));
    assert_eq!(
        block.condition.data.selectors.as_ref().and_then(|s| s.id.as_deref()),
        Some("banner")
    );
    assert!(block.condition.boolean_check.is_some());
    assert_eq!(ids(&block.then_steps), vec!["accept"]);
    assert_eq!(ids(&block.else_steps), vec!["dismiss"]);

    assert!(!state.is_recording_if_condition);
    assert!(!state.is_recording_in_conditional_block);
    assert_eq!(state.conditional_recording_context, Branch::Then);
    assert!(state.open_modal_for_step_id.is_none());
}

#[tokio::test]
async fn test_condition_from_action_channel() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;
    click(&recorder, "cookie-banner").await;
    click(&recorder, "accept").await;

    let state = recorder.snapshot().await;
    let steps = steps(&state);
    assert_eq!(steps.len(), 1);
    let block = steps[0].as_block().expect("conditional block");
    assert!(!block.is_finalized);
    assert_eq!(ids(&block.then_steps), vec!["accept"]);
    assert!(state.is_recording_in_conditional_block);
}

#[tokio::test]
async fn test_start_if_block_ignored_when_idle() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start_if_block"})).await;
    let state = recorder.snapshot().await;
    assert!(!state.is_recording_if_condition);

    click(&recorder, "ignored").await;
    assert!(steps(&recorder.snapshot().await).is_empty());
}

#[tokio::test]
async fn test_switch_to_else_without_block_is_noop() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "switch_to_else_block"})).await;
    send(&recorder, json!({"command": "end_if_block"})).await;

    let state = recorder.snapshot().await;
    assert_eq!(state.conditional_recording_context, Branch::Then);
    assert!(!state.is_recording_in_conditional_block);
}

// ===== NESTING =====

#[tokio::test]
async fn test_nested_blocks() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;

    send(&recorder, json!({"command": "start_if_block"})).await;
    send(&recorder, json!({"command": "record_assert_action", "data": element("outer")})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;
    send(&recorder, json!({"command": "record_assert_action", "data": element("inner")})).await;
    click(&recorder, "deep").await;

    send(&recorder, json!({"command": "end_if_block"})).await;
    let state = recorder.snapshot().await;
    assert!(state.is_recording_in_conditional_block);

    click(&recorder, "shallow").await;
    send(&recorder, json!({"command": "end_if_block"})).await;

    let state = recorder.snapshot().await;
    assert!(!state.is_recording_in_conditional_block);
    let steps = steps(&state);
    assert_eq!(steps.len(), 1);

    let outer = steps[0].as_block().expect("outer block");
    assert!(outer.is_finalized);
    assert_eq!(outer.then_steps.len(), 2);
    assert_eq!(element_id(&outer.then_steps[1]), Some("shallow"));

    let inner = outer.then_steps[0].as_block().expect("inner block");
    assert!(inner.is_finalized);
    assert_eq!(ids(&inner.then_steps), vec!["deep"]);
}

#[tokio::test]
async fn test_else_branch_survives_nested_block() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;
    click(&recorder, "logged-in").await;
    click(&recorder, "logout").await;
    send(&recorder, json!({"command": "switch_to_else_block"})).await;

    send(&recorder, json!({"command": "start_if_block"})).await;
    click(&recorder, "signup-banner").await;
    click(&recorder, "close-banner").await;
    send(&recorder, json!({"command": "end_if_block"})).await;
    click(&recorder, "login").await;

    let state = recorder.snapshot().await;
    let outer = steps(&state)[0].as_block().expect("outer block");
    assert!(!outer.is_finalized);
    assert_eq!(ids(&outer.then_steps), vec!["logout"]);
    assert_eq!(outer.else_steps.len(), 2);
    assert_eq!(element_id(&outer.else_steps[1]), Some("login"));
    let inner = outer.else_steps[0].as_block().expect("inner block");
    assert!(inner.is_finalized);
    assert_eq!(ids(&inner.then_steps), vec!["close-banner"]);
}

#[tokio::test]
async fn test_stop_finalizes_open_blocks() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;
    click(&recorder, "condition").await;
    send(&recorder, json!({"command": "stop"})).await;

    let state = recorder.snapshot().await;
    assert!(!state.is_recording);
    assert!(!state.is_recording_in_conditional_block);
    assert!(steps(&state)[0].as_block().expect("block").is_finalized);
}

#[tokio::test]
async fn test_deleting_open_block_leaves_block_mode() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;
    click(&recorder, "condition").await;

    let state = recorder.snapshot().await;
    let block_id = steps(&state)[0].id();
    send(&recorder, json!({"command": "delete_step", "id": block_id})).await;

    let state = recorder.snapshot().await;
    assert!(steps(&state).is_empty());
    assert!(!state.is_recording_in_conditional_block);

    click(&recorder, "plain").await;
    assert_eq!(ids(steps(&recorder.snapshot().await)), vec!["plain"]);
}

#[tokio::test]
async fn test_switching_test_case_closes_open_block() {
    let recorder = recorder();
    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;
    click(&recorder, "cond").await;

    send(&recorder, json!({"command": "create_test_case", "name": "B"})).await;
    let state = recorder.snapshot().await;
    assert!(!state.is_recording_in_conditional_block);
    assert_eq!(state.conditional_recording_context, Branch::Then);
    send(&recorder, json!({"command": "end_if_block"})).await;

    send(&recorder, json!({"command": "switch_test_case", "id": "default_test"})).await;
    let state = recorder.snapshot().await;
    assert!(!state.is_recording_in_conditional_block);
    assert!(steps(&state)[0].as_block().expect("first block").is_finalized);

    send(&recorder, json!({"command": "start_if_block"})).await;
    click(&recorder, "cond2").await;
    send(&recorder, json!({"command": "end_if_block"})).await;
    click(&recorder, "after").await;

    let state = recorder.snapshot().await;
    assert!(!state.is_recording_in_conditional_block);
    let steps = steps(&state);
    assert_eq!(steps.len(), 3);
    assert!(steps[0].as_block().expect("first block").then_steps.is_empty());
    assert!(steps[1].as_block().expect("second block").is_finalized);
    assert_eq!(element_id(&steps[2]), Some("after"));
}

#[tokio::test]
async fn test_switching_collection_ends_condition_capture() {
    let notifier = Arc::new(BroadcastNotifier::default());
    let recorder = recorder_with(notifier.clone());
    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;

    let mut events = notifier.subscribe();
    send(&recorder, json!({"command": "create_collection", "name": "Other"})).await;
    let state = recorder.snapshot().await;
    assert!(!state.is_recording_if_condition);
    assert!(state.is_recording);

    let mut received = Vec::new();
    while let Ok(notification) = events.try_recv() {
        if !matches!(notification, Notification::UpdateState { .. }) {
            received.push(notification);
        }
    }
    assert_eq!(received, vec![Notification::ExitAssertMode]);

    // clicks are plain steps again
    click(&recorder, "plain").await;
    assert_eq!(ids(steps(&recorder.snapshot().await)), vec!["plain"]);
}

// ===== NOTIFICATIONS =====

#[tokio::test]
async fn test_condition_capture_toggles_selection_mode() {
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut events = notifier.subscribe();
    let recorder = recorder_with(notifier);

    send(&recorder, json!({"command": "start"})).await;
    send(&recorder, json!({"command": "start_if_block"})).await;
    send(&recorder, json!({"command": "record_assert_action", "data": element("banner")})).await;

    let mut received = Vec::new();
    while let Ok(notification) = events.try_recv() {
        if !matches!(notification, Notification::UpdateState { .. }) {
            received.push(notification);
        }
    }
    assert_eq!(
        received,
        vec![Notification::EnterAssertMode, Notification::ExitAssertMode]
    );
}
