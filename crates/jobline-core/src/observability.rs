use serde::{Deserialize, Serialize};

/// Snapshot of how many jobs sit in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: usize,
    pub running: usize,
    pub completed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.waiting + self.running + self.completed
    }
}
