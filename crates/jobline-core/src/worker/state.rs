use std::fmt;

use crate::domain::JobId;

/// Worker lifecycle.
///
/// - Disconnected -> Connecting -> Idle -> Executing -> Idle -> ...
/// - any state -> Disconnected on I/O failure
/// - any state -> Stopped on cancellation (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    Connecting,
    Idle,
    Executing(JobId),
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Disconnected => f.write_str("disconnected"),
            WorkerState::Connecting => f.write_str("connecting"),
            WorkerState::Idle => f.write_str("idle"),
            WorkerState::Executing(id) => write!(f, "executing job {id}"),
            WorkerState::Stopped => f.write_str("stopped"),
        }
    }
}
