//! Job record: text + state.

use std::time::{Duration, Instant};

use super::{JobId, JobState};

/// A single job as held by the broker.
///
/// Design:
/// - This is the single source of truth for a job's state.
/// - Queue structures in the store hold `JobId` only.
/// - Transitions go through `start` / `complete`, which refuse illegal moves.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub text: String,
    pub state: JobState,

    pub submitted_at: Instant,
    pub updated_at: Instant,
}

impl JobRecord {
    pub fn new(id: JobId, text: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            text,
            state: JobState::Waiting,
            submitted_at: now,
            updated_at: now,
        }
    }

    /// Waiting -> Running. Returns false (and changes nothing) otherwise.
    pub fn start(&mut self) -> bool {
        self.transition(JobState::Running)
    }

    /// Running -> Completed. Returns false (and changes nothing) otherwise.
    pub fn complete(&mut self) -> bool {
        self.transition(JobState::Completed)
    }

    /// Time since submission.
    pub fn age(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.updated_at = Instant::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_waiting() {
        let job = JobRecord::new(JobId::new(1), "hello world".to_string());
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.text, "hello world");
    }

    #[test]
    fn walks_the_full_lifecycle() {
        let mut job = JobRecord::new(JobId::new(1), "a".to_string());
        assert!(job.start());
        assert_eq!(job.state, JobState::Running);
        assert!(job.complete());
        assert_eq!(job.state, JobState::Completed);
        assert!(job.updated_at >= job.submitted_at);
    }

    #[test]
    fn cannot_complete_without_running() {
        let mut job = JobRecord::new(JobId::new(1), "a".to_string());
        assert!(!job.complete());
        assert_eq!(job.state, JobState::Waiting);
    }

    #[test]
    fn cannot_start_twice() {
        let mut job = JobRecord::new(JobId::new(1), "a".to_string());
        assert!(job.start());
        assert!(!job.start());
        assert!(job.complete());
        assert!(!job.complete());
        assert_eq!(job.state, JobState::Completed);
    }
}
