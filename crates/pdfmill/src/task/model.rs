use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use thiserror::Error;

use super::codes::{ErrorCode, Phase, Status};

/// Maximum length of a caller-supplied `file_id`.
pub const FILE_ID_MAX_LEN: usize = 128;

/// One submitted extraction job and its lifecycle fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub uuid: String,
    pub file_id: String,
    pub file_url: String,
    /// Serialized tuning options, interpreted only by the pipeline and engine.
    pub finetune_args: String,
    pub callback_url: Option<String>,
    pub status: Status,
    pub result: Phase,
    pub errors: ErrorCode,
    pub tarball_location: String,
    pub tarball_checksum: String,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub finished_at: Option<DateTime<FixedOffset>>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

/// Intake payload for a task that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub uuid: String,
    pub file_id: String,
    pub file_url: String,
    pub finetune_args: String,
    pub callback_url: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidFileId {
    #[error("file_id must not be empty")]
    Empty,

    #[error("file_id is {0} characters long, at most 128 are allowed")]
    TooLong(usize),

    #[error("file_id may only contain letters, digits, '-', '_', '.' and '@'")]
    Charset,

    #[error("file_id must not consist of dots only")]
    DotsOnly,
}

/// Rejected lifecycle mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("task {id} is already {status}")]
    Terminal { id: i64, status: Status },

    #[error("task {id} is {status}, expected RUNNING")]
    NotRunning { id: i64, status: Status },

    #[error("task {id} cannot record an archive while {phase}")]
    NotPacking { id: i64, phase: Phase },

    #[error("task {id} already has an archive recorded")]
    ArchiveRecorded { id: i64 },

    #[error("task {id} needs an error code to terminate")]
    MissingErrorCode { id: i64 },

    #[error("task {id} cannot complete from {phase}")]
    Incomplete { id: i64, phase: Phase },
}

static RE_FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._@-]+$").unwrap());

/// Checks a caller-supplied `file_id` before it is used to name files.
pub fn validate_file_id(file_id: &str) -> Result<(), InvalidFileId> {
    if file_id.is_empty() {
        return Err(InvalidFileId::Empty);
    }
    let len = file_id.chars().count();
    if len > FILE_ID_MAX_LEN {
        return Err(InvalidFileId::TooLong(len));
    }
    if !RE_FILE_ID.is_match(file_id) {
        return Err(InvalidFileId::Charset);
    }
    if file_id.chars().all(|c| c == '.') {
        return Err(InvalidFileId::DotsOnly);
    }
    Ok(())
}

impl NewTask {
    pub fn new(
        file_id: &str,
        file_url: &str,
        finetune_args: &str,
        callback_url: Option<&str>,
        created_at: DateTime<FixedOffset>,
    ) -> Result<Self, InvalidFileId> {
        validate_file_id(file_id)?;
        Ok(Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            file_url: file_url.to_string(),
            finetune_args: finetune_args.to_string(),
            callback_url: callback_url
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            created_at,
        })
    }

    /// The record as first persisted: `(CREATED, NONE, NONE)`.
    pub fn into_task(self, id: i64) -> Task {
        Task {
            id,
            uuid: self.uuid,
            file_id: self.file_id,
            file_url: self.file_url,
            finetune_args: self.finetune_args,
            callback_url: self.callback_url,
            status: Status::Created,
            result: Phase::None,
            errors: ErrorCode::None,
            tarball_location: String::new(),
            tarball_checksum: String::new(),
            started_at: None,
            finished_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

impl Task {
    /// Returns the callback target, or `None` when absent or blank.
    pub fn callback_target(&self) -> Option<&str> {
        self.callback_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn has_archive(&self) -> bool {
        !self.tarball_location.is_empty() && !self.tarball_checksum.is_empty()
    }

    fn ensure_running(&self) -> Result<(), TransitionError> {
        match self.status {
            Status::Running => Ok(()),
            status if status.is_terminal() => Err(TransitionError::Terminal {
                id: self.id,
                status,
            }),
            status => Err(TransitionError::NotRunning {
                id: self.id,
                status,
            }),
        }
    }

    /// Enters `RUNNING`.
    ///
    /// A task that is already running was redelivered after an interrupted
    /// attempt: its phase is kept so `result` never moves backwards, and any
    /// archive recorded by the earlier attempt is discarded.
    pub fn begin(&mut self, now: DateTime<FixedOffset>) -> Result<(), TransitionError> {
        match self.status {
            Status::Created => {
                self.status = Status::Running;
                self.result = Phase::None;
                self.errors = ErrorCode::None;
                self.started_at = Some(now);
            }
            Status::Running => {
                self.errors = ErrorCode::None;
                self.tarball_location.clear();
                self.tarball_checksum.clear();
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            status => {
                return Err(TransitionError::Terminal {
                    id: self.id,
                    status,
                })
            }
        }
        Ok(())
    }

    /// Moves `result` forward to `phase`. Re-entering a phase at or behind the
    /// persisted one leaves `result` untouched.
    pub fn advance(&mut self, phase: Phase) -> Result<bool, TransitionError> {
        self.ensure_running()?;
        if phase > self.result {
            self.result = phase;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn record_archive(
        &mut self,
        location: String,
        checksum: String,
    ) -> Result<(), TransitionError> {
        self.ensure_running()?;
        if self.result != Phase::Packing {
            return Err(TransitionError::NotPacking {
                id: self.id,
                phase: self.result,
            });
        }
        if self.has_archive() {
            return Err(TransitionError::ArchiveRecorded { id: self.id });
        }
        self.tarball_location = location;
        self.tarball_checksum = checksum;
        Ok(())
    }

    /// Aborts the task with `code`, leaving `result` at the failed phase.
    pub fn terminate(&mut self, code: ErrorCode) -> Result<(), TransitionError> {
        self.ensure_running()?;
        if code == ErrorCode::None {
            return Err(TransitionError::MissingErrorCode { id: self.id });
        }
        self.status = Status::Terminated;
        self.errors = code;
        self.tarball_location.clear();
        self.tarball_checksum.clear();
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<FixedOffset>) -> Result<(), TransitionError> {
        self.ensure_running()?;
        if self.result != Phase::Cleaning || !self.has_archive() {
            return Err(TransitionError::Incomplete {
                id: self.id,
                phase: self.result,
            });
        }
        self.status = Status::Completed;
        self.result = Phase::Finished;
        self.finished_at = Some(now);
        Ok(())
    }
}
