pub mod dispatcher;
pub mod job;
pub mod pool;
pub mod supervisor;

pub use dispatcher::{DispatchExit, DispatchSettings, Dispatcher};
pub use job::{JobReport, JobResult, TaskRef};
pub use pool::{OrchestratorFactory, WorkerPool};
pub use supervisor::{ProcessSupervisor, Supervisor, EXIT_RESTART};
