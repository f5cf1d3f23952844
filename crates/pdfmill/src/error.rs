use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfmillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Janitor error: {0}")]
    Janitor(#[from] crate::janitor::JanitorError),

    #[error("Invalid task: {0}")]
    InvalidTask(#[from] crate::task::InvalidFileId),

    #[error("Download client error: {0}")]
    Fetch(#[from] crate::processor::FetchError),

    #[error("Webhook client error: {0}")]
    Webhook(#[from] crate::webhook::WebhookError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Unknown time zone '{0}'")]
    InvalidTimezone(String),

    #[error("Invalid sweep time '{value}' for {field}, expected HH:MM")]
    InvalidSweepTime { field: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove directory '{path}': {source}")]
    RemoveDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Failed to install signal handler: {0}")]
    SignalHandler(String),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PdfmillError>;
