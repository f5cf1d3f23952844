//! Completion notifications sent to caller-supplied callback URLs.

pub mod delivery;
pub mod view;

pub use delivery::{Delivery, Notifier, WebhookError, WebhookNotifier, MAX_ATTEMPTS};
pub use view::{TaskView, TarballView, WebhookPayload};
