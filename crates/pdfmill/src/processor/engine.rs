//! Extraction engine seam.
//!
//! Each worker thread owns its own engine handle, so accelerator state never
//! crosses threads. An out-of-memory failure poisons that handle and the
//! worker must be replaced before it runs another task.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::task::ErrorCode;

use super::options::TuningOptions;

/// Files every successful run leaves in its output directory.
pub const ENGINE_ARTIFACTS: [&str; 4] = [
    "content.md",
    "content_list.json",
    "middle.json",
    "model.json",
];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Accelerator ran out of memory: {0}")]
    OutOfMemory(String),

    #[error("Accelerator device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Engine ran out of host memory: {0}")]
    HostOutOfMemory(String),

    #[error("Extraction failed: {0}")]
    Other(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::OutOfMemory(_) => ErrorCode::GpuOutOfMemory,
            EngineError::DeviceUnavailable(_) => ErrorCode::GpuRuntimeError,
            EngineError::HostOutOfMemory(_) => ErrorCode::HostMemoryError,
            EngineError::Other(_) => ErrorCode::SysInternalError,
        }
    }
}

pub trait ExtractionEngine: Send {
    fn run(
        &mut self,
        input: &Path,
        output_dir: &Path,
        options: &TuningOptions,
    ) -> Result<(), EngineError>;
}

/// Runs an external extraction CLI once per task.
///
/// Invoked as `<program> <args...> --path <input> --output <dir> <tuning flags>`.
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Maps the engine's stderr onto a failure class.
fn classify_failure(stderr: &str) -> EngineError {
    let lower = stderr.to_ascii_lowercase();
    let detail = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("engine exited without output")
        .trim()
        .to_string();

    if lower.contains("out of memory") || lower.contains("outofmemoryerror") {
        EngineError::OutOfMemory(detail)
    } else if lower.contains("no cuda gpus are available")
        || lower.contains("cuda driver")
        || lower.contains("cuda unavailable")
        || lower.contains("device unavailable")
    {
        EngineError::DeviceUnavailable(detail)
    } else if lower.contains("memoryerror") || lower.contains("cannot allocate memory") {
        EngineError::HostOutOfMemory(detail)
    } else {
        EngineError::Other(detail)
    }
}

impl ExtractionEngine for CommandEngine {
    fn run(
        &mut self,
        input: &Path,
        output_dir: &Path,
        options: &TuningOptions,
    ) -> Result<(), EngineError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--path")
            .arg(input)
            .arg("--output")
            .arg(output_dir)
            .args(options.to_args());

        debug!("Running extraction engine {}", self.program.display());

        let output = cmd.output().map_err(|e| {
            EngineError::Other(format!(
                "failed to start '{}': {}",
                self.program.display(),
                e
            ))
        })?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let missing: Vec<&str> = ENGINE_ARTIFACTS
            .iter()
            .copied()
            .filter(|name| !output_dir.join(name).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Other(format!(
                "engine finished without producing {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }
}
