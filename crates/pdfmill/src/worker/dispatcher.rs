//! Feeds `CREATED` tasks from the store into the worker pool.
//!
//! The dispatcher is the only place where a job is retried: a run that could
//! not commit a transition is re-queued as a fresh [`TaskRef`] after an
//! exponential backoff. Classified failures are already terminal on the
//! record and are never retried.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use chrono_tz::Tz;
use log::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::db::DatabaseError;
use crate::pipeline::JobOutcome;
use crate::task::{ErrorCode, Status, TaskStore};
use crate::worker::job::{JobReport, JobResult, TaskRef};
use crate::worker::pool::WorkerPool;
use crate::worker::supervisor::ProcessSupervisor;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    /// Upper bound on tasks pulled from the store per poll.
    pub batch_size: usize,
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            batch_size: config.queue_capacity,
        }
    }
}

impl DispatchSettings {
    /// Delay before dispatching `attempt` (1-based retry count).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_backoff.saturating_mul(factor)
    }
}

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    Stopped,
    RestartRequested(ErrorCode),
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    pool: WorkerPool,
    settings: DispatchSettings,
    timezone: Tz,
    in_flight: HashSet<i64>,
    retries: Vec<(Instant, TaskRef)>,
    backlog: Vec<TaskRef>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        pool: WorkerPool,
        settings: DispatchSettings,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            pool,
            settings,
            timezone,
            in_flight: HashSet::new(),
            retries: Vec::new(),
            backlog: Vec::new(),
        }
    }

    /// Number of tasks queued, running or waiting for a retry.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Re-queues tasks left `RUNNING` by a previous process. Each is re-entered
    /// from its first phase without moving `result` backwards.
    pub fn recover(&mut self) -> Result<usize, DatabaseError> {
        let ids = self.store.list_ids(Status::Running, self.settings.batch_size)?;
        let count = self.enqueue_new(ids);
        if count > 0 {
            warn!("Recovering {} task(s) interrupted while RUNNING", count);
        }
        Ok(count)
    }

    /// Queues `CREATED` tasks that are not already in flight.
    pub fn poll(&mut self) -> Result<usize, DatabaseError> {
        let ids = self.store.list_ids(Status::Created, self.settings.batch_size)?;
        let count = self.enqueue_new(ids);
        if count > 0 {
            debug!("Queued {} new task(s)", count);
        }
        Ok(count)
    }

    fn enqueue_new(&mut self, ids: Vec<i64>) -> usize {
        let mut count = 0;
        for id in ids {
            if self.in_flight.insert(id) {
                self.backlog.push(TaskRef::new(id));
                count += 1;
            }
        }
        self.flush_backlog();
        count
    }

    /// Hands queued references to the pool until its queue is full.
    fn flush_backlog(&mut self) {
        let mut pending = std::mem::take(&mut self.backlog).into_iter();
        for task in pending.by_ref() {
            match self.pool.try_submit(task) {
                Ok(true) => {}
                Ok(false) => {
                    self.backlog.push(task);
                    break;
                }
                Err(e) => {
                    debug!("Not dispatching task {}: {}", task.id, e);
                    self.backlog.push(task);
                    break;
                }
            }
        }
        self.backlog.extend(pending);
    }

    fn release_due_retries(&mut self) {
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.retries.drain(..).partition(|(at, _)| *at <= now);
        self.retries = waiting;
        for (_, task) in due {
            debug!("Retrying task {} (attempt {})", task.id, task.attempt);
            self.backlog.push(task);
        }
        self.flush_backlog();
    }

    fn handle_report(&mut self, report: JobReport) {
        let task = report.task;
        let retry = report.is_retryable() && task.attempt < self.settings.max_retries;
        match report.result {
            JobResult::Finished(outcome) => {
                self.in_flight.remove(&task.id);
                match outcome {
                    JobOutcome::Completed => info!("Task {} completed", task.id),
                    JobOutcome::Terminated(code) | JobOutcome::RestartWorker(code) => {
                        info!("Task {} terminated with {}", task.id, code)
                    }
                    JobOutcome::Skipped => debug!("Task {} skipped", task.id),
                }
            }
            JobResult::Failed(e) if retry => {
                let next = task.retry();
                let delay = self.settings.backoff(next.attempt);
                warn!(
                    "Task {} failed on attempt {}: {}; retrying in {:?}",
                    task.id, task.attempt, e, delay
                );
                self.retries.push((Instant::now() + delay, next));
            }
            JobResult::Failed(e) => {
                error!(
                    "Task {} failed after {} attempt(s): {}",
                    task.id,
                    task.attempt + 1,
                    e
                );
                self.in_flight.remove(&task.id);
                self.abandon(task.id);
            }
            JobResult::Panicked(message) => {
                error!("Task {} panicked in worker {}: {}", task.id, report.worker_id, message);
                self.in_flight.remove(&task.id);
                self.abandon(task.id);
            }
        }
    }

    /// Marks a task that can no longer be driven as `SYS_INTERNAL_ERROR` so it
    /// does not stay `RUNNING`.
    fn abandon(&self, id: i64) {
        let result = self.store.load(id).and_then(|task| {
            let Some(mut task) = task else {
                return Ok(());
            };
            if task.status.is_terminal() {
                return Ok(());
            }
            if task.status == Status::Created {
                let now = Utc::now().with_timezone(&self.timezone).fixed_offset();
                if let Err(e) = task.begin(now) {
                    warn!("Cannot abandon task {}: {}", id, e);
                    return Ok(());
                }
            }
            if let Err(e) = task.terminate(ErrorCode::SysInternalError) {
                warn!("Cannot abandon task {}: {}", id, e);
                return Ok(());
            }
            task.updated_at = Utc::now().with_timezone(&self.timezone).fixed_offset();
            self.store.save(&task)
        });
        if let Err(e) = result {
            error!("Failed to mark task {} as terminated: {}", id, e);
        }
    }

    /// One round: collect reports, release due retries, then poll the store.
    pub fn tick(&mut self) -> Result<(), DatabaseError> {
        while let Some(report) = self.pool.try_recv_result() {
            self.handle_report(report);
        }
        self.release_due_retries();
        self.poll()?;
        Ok(())
    }

    /// Drives the pool until `stop` is raised or a worker asks for a process
    /// restart, then drains the pool.
    pub fn run(mut self, stop: &AtomicBool, supervisor: &ProcessSupervisor) -> DispatchExit {
        let mut last_poll: Option<Instant> = None;

        let exit = loop {
            if stop.load(Ordering::Acquire) {
                break DispatchExit::Stopped;
            }
            if supervisor.restart_requested() {
                let code = supervisor
                    .reason()
                    .map(|(_, code)| code)
                    .unwrap_or(ErrorCode::SysInternalError);
                break DispatchExit::RestartRequested(code);
            }

            if let Some(report) = self.pool.recv_result_timeout(Duration::from_millis(50)) {
                self.handle_report(report);
            }
            while let Some(report) = self.pool.try_recv_result() {
                self.handle_report(report);
            }
            self.release_due_retries();

            let poll_due = last_poll
                .map(|at| at.elapsed() >= self.settings.poll_interval)
                .unwrap_or(true);
            if poll_due {
                if let Err(e) = self.poll() {
                    error!("Failed to poll for tasks: {}", e);
                }
                last_poll = Some(Instant::now());
            }
        };

        self.shutdown();
        exit
    }

    /// Stops the pool and waits for running jobs to finish.
    pub fn shutdown(mut self) {
        self.pool.shutdown();
        while let Some(report) = self.pool.try_recv_result() {
            self.handle_report(report);
        }
        self.pool.wait();
    }
}
