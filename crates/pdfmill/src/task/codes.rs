//! Stable string codes persisted on the `tasks` table and exposed to callers.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Error returned when a persisted code does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} code '{value}'")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_codes {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownCode {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: UnknownCode| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

/// Coarse lifecycle stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Created,
    Running,
    Completed,
    Terminated,
}

string_codes!(Status, "status", {
    Created => "CREATED",
    Running => "RUNNING",
    Completed => "COMPLETED",
    Terminated => "TERMINATED",
});

impl Status {
    /// `COMPLETED` and `TERMINATED` admit no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Terminated)
    }
}

/// Fine-grained phase of a running task. Declaration order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    None,
    Collecting,
    Checking,
    Inferring,
    Packing,
    Cleaning,
    Finished,
}

string_codes!(Phase, "phase", {
    None => "NONE",
    Collecting => "COLLECTING",
    Checking => "CHECKING",
    Inferring => "INFERRING",
    Packing => "PACKING",
    Cleaning => "CLEANING",
    Finished => "FINISHED",
});

/// Classification recorded on a terminated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    None,
    DnsNxdomain,
    HttpUnauthorized,
    HttpForbidden,
    HttpNotFound,
    HttpNotAllowed,
    HttpOthersCases,
    GpuOutOfMemory,
    GpuRuntimeError,
    /// The engine exhausted host memory; the accelerator is unaffected.
    #[serde(rename = "PYI_MEMORY_ERROR")]
    HostMemoryError,
    FileEncryptionFound,
    FilePageRatioInvalid,
    FileMimeUnsupported,
    FileSizeTooLarge,
    FilePagesTooMany,
    SysInternalError,
}

string_codes!(ErrorCode, "error", {
    None => "NONE",
    DnsNxdomain => "DNS_NXDOMAIN",
    HttpUnauthorized => "HTTP_UNAUTHORIZED",
    HttpForbidden => "HTTP_FORBIDDEN",
    HttpNotFound => "HTTP_NOT_FOUND",
    HttpNotAllowed => "HTTP_NOT_ALLOWED",
    HttpOthersCases => "HTTP_OTHERS_CASES",
    GpuOutOfMemory => "GPU_OUT_OF_MEMORY",
    GpuRuntimeError => "GPU_RUNTIME_ERROR",
    HostMemoryError => "PYI_MEMORY_ERROR",
    FileEncryptionFound => "FILE_ENCRYPTION_FOUND",
    FilePageRatioInvalid => "FILE_PAGE_RATIO_INVALID",
    FileMimeUnsupported => "FILE_MIME_UNSUPPORTED",
    FileSizeTooLarge => "FILE_SIZE_TOO_LARGE",
    FilePagesTooMany => "FILE_PAGES_TOO_MANY",
    SysInternalError => "SYS_INTERNAL_ERROR",
});

impl ErrorCode {
    /// Maps a non-success download status to its coarse code.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::HttpUnauthorized,
            403 => ErrorCode::HttpForbidden,
            404 => ErrorCode::HttpNotFound,
            405 => ErrorCode::HttpNotAllowed,
            _ => ErrorCode::HttpOthersCases,
        }
    }

    /// Accelerator state after this failure is unusable in-process.
    pub fn requires_worker_restart(&self) -> bool {
        matches!(self, ErrorCode::GpuOutOfMemory)
    }
}
