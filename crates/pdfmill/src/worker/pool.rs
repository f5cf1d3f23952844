use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::pipeline::{JobOutcome, Orchestrator};
use crate::worker::job::{JobReport, JobResult, TaskRef};
use crate::worker::supervisor::Supervisor;

/// Builds the orchestrator owned by one worker thread.
pub type OrchestratorFactory = dyn Fn(usize) -> Orchestrator + Send + Sync;

pub struct WorkerPool {
    job_sender: Sender<TaskRef>,
    result_receiver: Receiver<JobReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` worker threads, each building its own
    /// orchestrator (and engine handle) through `factory`.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        worker_count: usize,
        queue_capacity: usize,
        supervisor: Arc<dyn Supervisor>,
        factory: Arc<OrchestratorFactory>,
    ) -> Result<Self, WorkerError> {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<TaskRef>(queue_capacity.max(1));
        let (result_sender, result_receiver) =
            bounded::<JobReport>(queue_capacity.max(worker_count * 2));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_supervisor = Arc::clone(&supervisor);
            let worker_factory = Arc::clone(&factory);

            let handle = thread::Builder::new()
                .name(format!("pdfmill-worker-{}", worker_id))
                .spawn(move || {
                    let orchestrator = worker_factory(worker_id);
                    run_worker(
                        worker_id,
                        orchestrator,
                        job_rx,
                        result_tx,
                        shutdown_flag,
                        worker_supervisor,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        })
    }

    pub fn submit(&self, task: TaskRef) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(task)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Like [`submit`](Self::submit) but returns `Ok(false)` instead of
    /// blocking when the queue is full.
    pub fn try_submit(&self, task: TaskRef) -> Result<bool, WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        match self.job_sender.try_send(task) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::ChannelClosed),
        }
    }

    pub fn try_recv_result(&self) -> Option<JobReport> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobReport> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn run_worker(
    worker_id: usize,
    mut orchestrator: Orchestrator,
    job_receiver: Receiver<TaskRef>,
    result_sender: Sender<JobReport>,
    shutdown: Arc<AtomicBool>,
    supervisor: Arc<dyn Supervisor>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => {
                debug!(
                    "Worker {} processing task {} (attempt {})",
                    worker_id, task.id, task.attempt
                );

                let result = match catch_unwind(AssertUnwindSafe(|| orchestrator.run(task.id))) {
                    Ok(Ok(outcome)) => JobResult::Finished(outcome),
                    Ok(Err(e)) => JobResult::Failed(e),
                    Err(payload) => JobResult::Panicked(panic_message(payload.as_ref())),
                };

                let restart = match result {
                    JobResult::Finished(JobOutcome::RestartWorker(code)) => Some(code),
                    _ => None,
                };

                if let Err(e) = result_sender.send(JobReport {
                    worker_id,
                    task,
                    result,
                }) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }

                if let Some(code) = restart {
                    supervisor.request_restart(worker_id, code);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::pipeline::PipelineConfig;
    use crate::processor::{
        EngineError, ExtractionEngine, FetchError, FileGate, GateError, Limits, SourceFetcher,
        TuningOptions,
    };
    use crate::storage::InstanceLayout;
    use crate::task::{ErrorCode, NewTask, Status, Task, TaskStore};
    use crate::webhook::{Delivery, Notifier};
    use crate::worker::supervisor::ProcessSupervisor;
    use std::path::Path;
    use tempfile::TempDir;

    struct NotFoundFetcher;

    impl SourceFetcher for NotFoundFetcher {
        fn fetch(&self, _url: &str, _dest: &Path) -> Result<u64, FetchError> {
            Err(FetchError::Status(404))
        }
    }

    struct WriteFetcher;

    impl SourceFetcher for WriteFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
            std::fs::write(dest, b"%PDF-1.7").unwrap();
            Ok(8)
        }
    }

    struct PassGate;

    impl FileGate for PassGate {
        fn validate(&self, _path: &Path) -> Result<(), GateError> {
            Ok(())
        }
    }

    struct OomEngine;

    impl ExtractionEngine for OomEngine {
        fn run(&mut self, _: &Path, _: &Path, _: &TuningOptions) -> Result<(), EngineError> {
            Err(EngineError::OutOfMemory("CUDA out of memory".into()))
        }
    }

    struct Silent;

    impl Notifier for Silent {
        fn notify(&self, _task: &Task) -> Delivery {
            Delivery::Skipped
        }
    }

    fn factory(
        dir: &Path,
        db: Arc<Database>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Arc<OrchestratorFactory> {
        let config = Arc::new(PipelineConfig {
            layout: InstanceLayout::new(dir),
            timezone: chrono_tz::UTC,
            limits: Limits::default(),
            notify_on_failure: false,
        });
        Arc::new(move |_worker_id: usize| {
            Orchestrator::new(
                Arc::clone(&config),
                db.clone(),
                Arc::clone(&fetcher),
                Arc::new(PassGate),
                Box::new(OomEngine),
                Arc::new(Silent),
            )
        })
    }

    fn submit(db: &Database) -> i64 {
        let new = NewTask::new(
            "doc",
            "https://example.com/doc.pdf",
            "",
            None,
            chrono::Utc::now().fixed_offset(),
        )
        .unwrap();
        db.insert(new).unwrap().id
    }

    #[test]
    fn test_worker_pool_creation() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let supervisor = Arc::new(ProcessSupervisor::new());
        let pool = WorkerPool::new(
            2,
            4,
            supervisor,
            factory(dir.path(), db, Arc::new(NotFoundFetcher)),
        )
        .unwrap();

        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(pool.submit(TaskRef::new(1)).is_err());

        pool.wait();
    }

    #[test]
    fn test_submit_and_receive_report() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let id = submit(&db);
        let supervisor = Arc::new(ProcessSupervisor::new());
        let pool = WorkerPool::new(
            2,
            4,
            supervisor.clone(),
            factory(dir.path(), db.clone(), Arc::new(NotFoundFetcher)),
        )
        .unwrap();

        pool.submit(TaskRef::new(id)).unwrap();
        let report = pool.recv_result_timeout(Duration::from_secs(10)).unwrap();

        assert_eq!(report.task.id, id);
        assert!(matches!(
            report.result,
            JobResult::Finished(JobOutcome::Terminated(ErrorCode::HttpNotFound))
        ));
        assert!(!supervisor.restart_requested());
        assert_eq!(db.load(id).unwrap().unwrap().status, Status::Terminated);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_out_of_memory_stops_worker_and_notifies_supervisor() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let id = submit(&db);
        let supervisor = Arc::new(ProcessSupervisor::new());
        let pool = WorkerPool::new(
            1,
            4,
            supervisor.clone(),
            factory(dir.path(), db.clone(), Arc::new(WriteFetcher)),
        )
        .unwrap();

        pool.submit(TaskRef::new(id)).unwrap();
        let report = pool.recv_result_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(
            report.result,
            JobResult::Finished(JobOutcome::RestartWorker(ErrorCode::GpuOutOfMemory))
        ));

        // The only worker has exited, so wait() returns without a shutdown.
        pool.wait();
        assert!(supervisor.restart_requested());
        assert_eq!(supervisor.reason(), Some((0, ErrorCode::GpuOutOfMemory)));
    }

    #[test]
    fn test_try_submit_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let supervisor = Arc::new(ProcessSupervisor::new());
        let pool = WorkerPool::new(
            1,
            1,
            supervisor,
            factory(dir.path(), db, Arc::new(NotFoundFetcher)),
        )
        .unwrap();
        pool.shutdown();
        assert!(pool.try_submit(TaskRef::new(1)).is_err());
        pool.wait();
    }
}
