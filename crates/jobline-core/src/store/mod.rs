//! Job store: the authoritative job table.
//!
//! ジョブの正本。`jobs` が JobRecord を保持し、キュー構造（waiting /
//! running / completed）は JobId だけを持つ。
//!
//! The store is a plain owned value with `&mut self` mutators. The broker
//! owns exactly one and mutates it from its single dispatch path, so there
//! is no lock here. A multi-task caller has to wrap it (`Mutex`) or give it
//! to a single owning task.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::domain::{JobId, JobRecord, JobState};
use crate::observability::JobCounts;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("job text must not be empty")]
    EmptyText,

    #[error("unknown job id={0}")]
    UnknownJob(JobId),

    #[error("job id={id} is {state}, not running")]
    NotRunning { id: JobId, state: JobState },
}

/// A job handed out by `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: JobId,
    pub text: String,
}

#[derive(Debug)]
pub struct JobStore {
    /// Next id to hand out. Starts at 1, only ever grows.
    next_id: JobId,

    /// All job records, never removed.
    jobs: HashMap<JobId, JobRecord>,

    /// Waiting ids in submission order.
    waiting: VecDeque<JobId>,

    running: HashSet<JobId>,
    completed: HashSet<JobId>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            next_id: JobId::new(1),
            jobs: HashMap::new(),
            waiting: VecDeque::new(),
            running: HashSet::new(),
            completed: HashSet::new(),
        }
    }

    fn allocate_id(&mut self) -> JobId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    /// Create a waiting job and append it to the queue.
    pub fn submit(&mut self, text: impl Into<String>) -> Result<JobId, StoreError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(StoreError::EmptyText);
        }

        let id = self.allocate_id();
        self.jobs.insert(id, JobRecord::new(id, text));
        self.waiting.push_back(id);
        Ok(id)
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.jobs.get(&id).map(|job| job.state)
    }

    /// Pop the oldest waiting job and mark it running.
    pub fn fetch(&mut self) -> Option<Assignment> {
        while let Some(id) = self.waiting.pop_front() {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            if !job.start() {
                continue;
            }
            self.running.insert(id);
            return Some(Assignment {
                id,
                text: job.text.clone(),
            });
        }
        None
    }

    /// Running -> Completed. Nothing changes on error.
    pub fn complete(&mut self, id: JobId) -> Result<&JobRecord, StoreError> {
        let job = self.jobs.get_mut(&id).ok_or(StoreError::UnknownJob(id))?;
        if !self.running.contains(&id) || !job.complete() {
            return Err(StoreError::NotRunning {
                id,
                state: job.state,
            });
        }
        self.running.remove(&id);
        self.completed.insert(id);
        Ok(&*job)
    }

    pub fn counts(&self) -> JobCounts {
        JobCounts {
            waiting: self.waiting.len(),
            running: self.running.len(),
            completed: self.completed.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Check that every job sits in exactly the container its state names.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.counts().total(), self.jobs.len());
        for (id, job) in &self.jobs {
            let memberships = [
                self.waiting.contains(id),
                self.running.contains(id),
                self.completed.contains(id),
            ];
            assert_eq!(memberships.iter().filter(|m| **m).count(), 1, "job {id}");
            match job.state {
                JobState::Waiting => assert!(memberships[0]),
                JobState::Running => assert!(memberships[1]),
                JobState::Completed => assert!(memberships[2]),
            }
        }
    }
}
