use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};

use crate::task::Task;

use super::error::JobWarning;

pub struct JobContext {
    // Input, mutated by every committed transition
    pub task: Task,

    // Moment the working directory was created; names the workdir and dates its archive
    pub moment: Option<DateTime<FixedOffset>>,

    // Prepare result
    pub workdir: Option<PathBuf>,

    // COLLECTING result
    pub source_path: Option<PathBuf>,

    // Non-fatal warnings
    pub warnings: Vec<JobWarning>,
}

impl JobContext {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            moment: None,
            workdir: None,
            source_path: None,
            warnings: Vec::new(),
        }
    }
}
