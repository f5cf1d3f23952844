pub mod config;
pub mod db;
pub mod error;
pub mod janitor;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod storage;
pub mod task;
pub mod telemetry;
pub mod webhook;
pub mod worker;

pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, PdfmillError, Result, StorageError, WorkerError};
pub use janitor::{Janitor, JanitorScheduler, SweepReport};
pub use pipeline::{JobOutcome, Orchestrator, OrchestratorError, PipelineConfig};
pub use task::{ErrorCode, NewTask, Phase, Status, Task, TaskStore};
pub use webhook::{TaskView, WebhookNotifier};
pub use worker::{Dispatcher, ProcessSupervisor, WorkerPool, EXIT_RESTART};
