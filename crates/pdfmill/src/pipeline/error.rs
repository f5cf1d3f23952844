use std::path::PathBuf;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::StorageError;
use crate::processor::{EngineError, FetchError, GateError};
use crate::storage::ArchiveError;
use crate::task::{ErrorCode, TransitionError};

/// A failure inside one phase. Always recorded on the task, never propagated.
#[derive(Error, Debug)]
pub enum PhaseFailure {
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Validation failed: {0}")]
    Gate(#[from] GateError),

    #[error("Extraction failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Packing failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Working directory failed: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Internal(String),
}

impl PhaseFailure {
    /// Stable code recorded in `errors`.
    pub fn code(&self) -> ErrorCode {
        match self {
            PhaseFailure::Fetch(e) => e.code(),
            PhaseFailure::Gate(e) => e.code(),
            PhaseFailure::Engine(e) => e.code(),
            PhaseFailure::Archive(_) | PhaseFailure::Storage(_) | PhaseFailure::Internal(_) => {
                ErrorCode::SysInternalError
            }
        }
    }
}

/// The orchestrator could not commit a transition. The task record is left
/// at its last committed state and the dispatcher may retry the job.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Task store failed: {0}")]
    Store(#[from] DatabaseError),

    #[error("Rejected transition: {0}")]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone)]
pub enum JobWarning {
    WorkdirNotRemoved { path: PathBuf, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_map_to_codes() {
        assert_eq!(
            PhaseFailure::from(FetchError::Status(404)).code(),
            ErrorCode::HttpNotFound
        );
        assert_eq!(
            PhaseFailure::from(GateError::Encrypted).code(),
            ErrorCode::FileEncryptionFound
        );
        assert_eq!(
            PhaseFailure::from(EngineError::OutOfMemory("CUDA out of memory".into())).code(),
            ErrorCode::GpuOutOfMemory
        );
        assert_eq!(
            PhaseFailure::Internal("archive vanished".into()).code(),
            ErrorCode::SysInternalError
        );
    }
}
