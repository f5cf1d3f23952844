pub mod config;
pub mod context;
pub mod error;
pub mod runner;

pub use config::PipelineConfig;
pub use context::JobContext;
pub use error::{JobWarning, OrchestratorError, PhaseFailure};
pub use runner::{JobOutcome, Orchestrator};
