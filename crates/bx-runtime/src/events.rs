//! Notifications from the run loop to the session owner

use crate::runloop::RunLoopState;
use bx_core::error::CoreFault;

/// Where the loop was when it ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastState {
    pub state: RunLoopState,
    pub frames_delivered: u64,
    pub steps: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The run loop thread is up
    Started { machine: String },
    Paused,
    Resumed,
    /// The loop stopped on request or after its frame limit
    Stopped { last_state: LastState },
    /// The core failed and the loop was forced to stop
    Terminated { fault: CoreFault, last_state: LastState },
}

impl SessionEvent {
    /// True for the last event a run loop sends
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::Terminated { .. })
    }
}
