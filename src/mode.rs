//! Recording-mode state machine
//!
//! The mode is stored as flags on [`RecorderState`] so it survives a reload;
//! [`RecordingMode`] is the derived view used to route interactions.
//! Transitions that the page has to follow return a [`PageSignal`].

use crate::error::{RecorderError, Result};
use crate::ids;
use crate::state::RecorderState;
use crate::step::{Branch, ConditionalBlock, Step, StepId, StepNode};
use crate::tree::{self, InsertionPoint, RecordingCursor};

/// Where the recorder is, derived from the persisted flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    Idle,
    Recording,
    /// The next selected element becomes an IF condition
    CapturingCondition,
    InConditionalBlock(Branch),
}

/// What an incoming page interaction does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ignore,
    CaptureCondition,
    Append,
}

/// Instruction for the page observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    EnterSelectionMode,
    ExitSelectionMode,
}

impl RecorderState {
    pub fn mode(&self) -> RecordingMode {
        if !self.is_recording {
            RecordingMode::Idle
        } else if self.is_recording_if_condition {
            RecordingMode::CapturingCondition
        } else if self.is_recording_in_conditional_block {
            RecordingMode::InConditionalBlock(self.conditional_recording_context)
        } else {
            RecordingMode::Recording
        }
    }

    pub fn action_disposition(&self) -> Disposition {
        match self.mode() {
            RecordingMode::Idle => Disposition::Ignore,
            RecordingMode::CapturingCondition => Disposition::CaptureCondition,
            RecordingMode::Recording | RecordingMode::InConditionalBlock(_) => Disposition::Append,
        }
    }

    pub fn cursor(&self) -> RecordingCursor {
        RecordingCursor {
            in_conditional_block: self.is_recording_in_conditional_block,
            context: self.conditional_recording_context,
        }
    }

    /// Where the next step of the active test case goes
    pub fn insertion_point(&self) -> InsertionPoint {
        match self.active_test_case() {
            Some(test_case) => tree::locate_insertion_point(&test_case.recorded_steps, self.cursor()),
            None => InsertionPoint::root(),
        }
    }

    // ===== TRANSITIONS =====

    pub fn start_recording(&mut self, page_name: Option<String>) {
        self.is_recording = true;
        self.current_frame_context = None;
        self.reset_conditional_recording();
        if let Some(page_name) = page_name {
            self.update_page_name(page_name);
        }
        log::info!("Recording started");
    }

    pub fn stop_recording(&mut self) -> PageSignal {
        self.is_recording = false;
        self.is_assert_mode = false;
        self.reselecting_step_id = None;
        self.reset_conditional_recording();
        log::info!("Recording stopped");
        PageSignal::ExitSelectionMode
    }

    /// Allowed while not recording as well
    pub fn enter_assert_mode(&mut self) -> PageSignal {
        self.is_assert_mode = true;
        PageSignal::EnterSelectionMode
    }

    pub fn begin_reselect(&mut self, step_id: StepId) -> PageSignal {
        self.is_assert_mode = true;
        self.reselecting_step_id = Some(step_id);
        PageSignal::EnterSelectionMode
    }

    /// Leave selection mode after an assertion element was picked
    pub fn finish_assert_selection(&mut self) {
        self.is_assert_mode = false;
        self.reselecting_step_id = None;
    }

    pub fn start_if_block(&mut self) -> Option<PageSignal> {
        if !self.is_recording {
            log::warn!("start_if_block ignored: not recording");
            return None;
        }
        self.is_recording_if_condition = true;
        Some(PageSignal::EnterSelectionMode)
    }

    /// Wrap the captured condition in a new block and start recording its then branch
    pub fn open_conditional(&mut self, condition: Step) -> Result<PageSignal> {
        let point = self.insertion_point();
        let test_case = self
            .active_test_case_mut()
            .ok_or(RecorderError::NoActiveTestCase)?;

        let block = ConditionalBlock::new(ids::step_id(), condition);
        log::info!("Opened conditional block {}", block.id);
        tree::append(&mut test_case.recorded_steps, &point, [StepNode::Conditional(block)]);

        self.is_recording_if_condition = false;
        self.is_recording_in_conditional_block = true;
        self.conditional_recording_context = Branch::Then;
        Ok(PageSignal::ExitSelectionMode)
    }

    pub fn switch_to_else(&mut self) -> bool {
        if !self.is_recording_in_conditional_block {
            return false;
        }
        self.conditional_recording_context = Branch::Else;
        true
    }

    /// Close the innermost open block
    pub fn end_if_block(&mut self) -> bool {
        if !self.is_recording_in_conditional_block {
            return false;
        }
        let point = self.insertion_point();
        let Some(test_case) = self.active_test_case_mut() else {
            return false;
        };
        tree::finalize_innermost_open_block(&mut test_case.recorded_steps);
        // recording resumes in the branch that held the closed block
        if let [.., (_, enclosing), _] = point.hops.as_slice() {
            self.conditional_recording_context = *enclosing;
        }
        self.settle_conditional_flag();
        true
    }

    /// Append nodes to the active test case at the current insertion point
    pub fn append_to_active(&mut self, nodes: Vec<StepNode>) -> Result<()> {
        let point = self.insertion_point();
        let test_case = self
            .active_test_case_mut()
            .ok_or(RecorderError::NoActiveTestCase)?;
        tree::append(&mut test_case.recorded_steps, &point, nodes);
        Ok(())
    }

    /// Drop the in-block flag once no open block is left in the active test case
    pub fn settle_conditional_flag(&mut self) {
        let open = self
            .active_test_case()
            .is_some_and(|tc| tree::has_open_blocks(&tc.recorded_steps));
        if !open && self.is_recording_in_conditional_block {
            self.is_recording_in_conditional_block = false;
            self.conditional_recording_context = Branch::Then;
        }
    }

    /// Clear the conditional flags and close every open block of the active test case
    pub(crate) fn reset_conditional_recording(&mut self) {
        self.is_recording_if_condition = false;
        self.is_recording_in_conditional_block = false;
        self.conditional_recording_context = Branch::Then;
        if let Some(test_case) = self.active_test_case_mut() {
            let closed = tree::finalize_all_open_blocks(&mut test_case.recorded_steps);
            if closed > 0 {
                log::debug!("Finalized {} open conditional block(s)", closed);
            }
        }
    }
}
