use crate::pipeline::{JobOutcome, OrchestratorError};

/// A queued reference to a task record. The record itself stays in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub id: i64,
    /// Dispatch attempt, starting at 0.
    pub attempt: u32,
}

impl TaskRef {
    pub fn new(id: i64) -> Self {
        Self { id, attempt: 0 }
    }

    /// A fresh reference for the next dispatch attempt.
    pub fn retry(&self) -> Self {
        Self {
            id: self.id,
            attempt: self.attempt + 1,
        }
    }
}

#[derive(Debug)]
pub enum JobResult {
    Finished(JobOutcome),
    Failed(OrchestratorError),
    Panicked(String),
}

/// Sent back by a worker after each task it picks up.
#[derive(Debug)]
pub struct JobReport {
    pub worker_id: usize,
    pub task: TaskRef,
    pub result: JobResult,
}

impl JobReport {
    pub fn is_retryable(&self) -> bool {
        matches!(self.result, JobResult::Failed(_))
    }
}
