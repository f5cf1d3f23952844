//! Boundary between workers and whatever restarts the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::warn;

use crate::task::ErrorCode;

/// Exit status asking an external supervisor to restart the process
/// (`EX_TEMPFAIL`).
pub const EXIT_RESTART: i32 = 75;

pub trait Supervisor: Send + Sync {
    /// Called by a worker that stopped because its engine is unusable.
    fn request_restart(&self, worker_id: usize, code: ErrorCode);
}

/// Records restart requests for the dispatcher loop, which drains the pool
/// and lets the binary exit with [`EXIT_RESTART`].
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    requested: AtomicBool,
    reason: Mutex<Option<(usize, ErrorCode)>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restart_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Worker and code of the first restart request.
    pub fn reason(&self) -> Option<(usize, ErrorCode)> {
        self.reason.lock().ok().and_then(|reason| *reason)
    }
}

impl Supervisor for ProcessSupervisor {
    fn request_restart(&self, worker_id: usize, code: ErrorCode) {
        warn!("Worker {} requested a process restart after {}", worker_id, code);
        if let Ok(mut reason) = self.reason.lock() {
            reason.get_or_insert((worker_id, code));
        }
        self.requested.store(true, Ordering::Release);
    }
}
