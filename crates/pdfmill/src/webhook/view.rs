//! Public view of a task, shared by webhook payloads and status output.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::task::{ErrorCode, Phase, Status, Task};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TarballView {
    pub location: String,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub file_id: String,
    pub status: Status,
    pub result: Phase,
    pub errors: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tarball: Option<TarballView>,
}

/// Body POSTed to callback URLs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub data: TaskView,
}

/// Joins a relative location onto the application base URL. Absolute URLs
/// are returned unchanged.
pub fn absolutize(app_url: &str, location: &str) -> String {
    if location.contains("://") || app_url.is_empty() {
        return location.to_string();
    }
    format!(
        "{}/{}",
        app_url.trim_end_matches('/'),
        location.trim_start_matches('/')
    )
}

impl TaskView {
    /// Builds the view of `task`; `tarball` is only exposed once completed.
    pub fn from_task(task: &Task, app_url: &str) -> Self {
        let tarball = (task.status == Status::Completed && task.has_archive()).then(|| {
            TarballView {
                location: absolutize(app_url, &task.tarball_location),
                checksum: task.tarball_checksum.clone(),
            }
        });

        Self {
            file_id: task.file_id.clone(),
            status: task.status,
            result: task.result,
            errors: task.errors,
            started_at: task.started_at,
            finished_at: task.finished_at,
            tarball,
        }
    }
}
