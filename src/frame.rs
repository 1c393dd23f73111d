//! Frame-context tracking
//!
//! Generated tests must switch into an iframe before touching elements in
//! it and back out afterwards. The recorder remembers the frame of the last
//! recorded step and emits bridging steps when the next one is elsewhere.

use crate::step::{ElementDescriptor, FrameInfo, StepAction};

/// A bridging step to insert before the triggering step
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSwitch {
    ExitToDefault,
    Enter(FrameInfo),
}

impl FrameSwitch {
    /// Step kind and element data for the bridging step
    pub fn step_parts(&self) -> (StepAction, ElementDescriptor) {
        match self {
            Self::ExitToDefault => (StepAction::SwitchToDefaultContent, ElementDescriptor::default()),
            Self::Enter(frame) => (StepAction::SwitchToIframe, ElementDescriptor::for_frame(frame)),
        }
    }
}

/// Compare the reported frame with the tracked one and update the tracker.
///
/// Frames are identified by xpath only.
pub fn reconcile(current: &mut Option<FrameInfo>, reported: Option<&FrameInfo>) -> Vec<FrameSwitch> {
    let old_xpath = current.as_ref().and_then(|f| f.xpath.as_deref());
    let new_xpath = reported.and_then(|f| f.xpath.as_deref());
    if old_xpath == new_xpath {
        return Vec::new();
    }

    let mut switches = Vec::new();
    if old_xpath.is_some() {
        switches.push(FrameSwitch::ExitToDefault);
    }
    if let (Some(frame), Some(_)) = (reported, new_xpath) {
        switches.push(FrameSwitch::Enter(frame.clone()));
    }

    log::debug!("Frame context {:?} -> {:?}", old_xpath, new_xpath);
    *current = reported.cloned();
    switches
}
