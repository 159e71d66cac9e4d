use std::fmt;

use thiserror::Error;

use crate::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlAction::Start => "start",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Stop => "stop",
            ControlAction::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// A control request that is not valid in the current state. Nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("a job is already active ({state})")]
    JobActive { state: JobState },
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: ControlAction,
        state: JobState,
    },
    #[error("cannot {action}: the job is already assembling its output")]
    Finalizing { action: ControlAction },
}
