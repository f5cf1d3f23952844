//! Best-effort POST of a task's view to its callback URL.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::sanitize;
use crate::task::Task;

use super::view::{TaskView, WebhookPayload};

/// Attempts per notification. Attempts follow each other immediately.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Callback URL '{0}' has no scheme or host")]
    InvalidUrl(String),

    #[error("Callback responded with HTTP {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// No usable callback URL on the task.
    Skipped,
    Delivered { attempts: u32 },
    GaveUp { attempts: u32 },
}

pub trait Notifier: Send + Sync {
    /// Never fails: delivery problems are logged and reported, not raised.
    fn notify(&self, task: &Task) -> Delivery;
}

pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    app_url: String,
}

impl WebhookNotifier {
    pub fn new(app_url: &str, timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pdfmill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WebhookError::Client(e.to_string()))?;
        Ok(Self {
            client,
            app_url: app_url.to_string(),
        })
    }

    fn post(&self, url: &reqwest::Url, payload: &WebhookPayload) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(url.clone())
            .json(payload)
            .send()
            .map_err(|e| WebhookError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Status(status.as_u16()))
        }
    }
}

/// Parses a callback URL, accepting only http(s) URLs with a host.
pub fn parse_callback(raw: &str) -> Result<reqwest::Url, WebhookError> {
    let invalid = || WebhookError::InvalidUrl(sanitize::redact_url(raw));
    let url = reqwest::Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

impl Notifier for WebhookNotifier {
    fn notify(&self, task: &Task) -> Delivery {
        let Some(target) = task.callback_target() else {
            debug!("Task {} has no callback URL", task.id);
            return Delivery::Skipped;
        };
        let url = match parse_callback(target) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping webhook for task {}: {}", task.id, e);
                return Delivery::Skipped;
            }
        };

        let _span = info_span!("webhook",
            task_id = task.id,
            url = %sanitize::redact_url(target),
        )
        .entered();

        let payload = WebhookPayload {
            data: TaskView::from_task(task, &self.app_url),
        };

        for attempt in 1..=MAX_ATTEMPTS {
            match self.post(&url, &payload) {
                Ok(()) => {
                    info!(attempt, "Webhook delivered");
                    return Delivery::Delivered { attempts: attempt };
                }
                Err(e) => warn!(attempt, "Webhook attempt failed: {}", e),
            }
        }

        warn!("Giving up on webhook after {} attempts", MAX_ATTEMPTS);
        Delivery::GaveUp {
            attempts: MAX_ATTEMPTS,
        }
    }
}
