//! Job state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job state.
///
/// State transitions:
/// - Waiting -> Running (FETCH)
/// - Running -> Completed (DONE)
///
/// There is no way back and no way to skip `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Submitted, sitting in the waiting queue.
    Waiting,

    /// Handed to a worker by FETCH.
    Running,

    /// Reported done by the worker.
    Completed,
}

impl JobState {
    /// Wire name used in STATUS replies.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Waiting, JobState::Running) | (JobState::Running, JobState::Completed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
