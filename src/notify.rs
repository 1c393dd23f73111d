//! Notifications to the page observer and the UI

use crate::mode::PageSignal;
use crate::state::RecorderState;
use serde::Serialize;
use tokio::sync::broadcast;

/// Message pushed after a command, tagged by `command` like the commands themselves
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Notification {
    /// Page starts highlighting elements for selection
    EnterAssertMode,
    ExitAssertMode,
    UpdateState { state: Box<RecorderState> },
}

impl From<PageSignal> for Notification {
    fn from(signal: PageSignal) -> Self {
        match signal {
            PageSignal::EnterSelectionMode => Self::EnterAssertMode,
            PageSignal::ExitSelectionMode => Self::ExitAssertMode,
        }
    }
}

/// Delivery is best effort; nobody listening is not an error
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Fans notifications out to every subscriber
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            log::debug!("No subscribers for notification");
        }
    }
}
