use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root holding `cache/`, `archives/` and, by default, the database.
    pub instance_path: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_app_url")]
    pub app_url: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_app_url() -> String {
    "http://localhost:5000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    100
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_page_ratio")]
    pub max_page_ratio: f64,
}

fn default_max_file_size() -> u64 {
    200 * 1024 * 1024
}

fn default_max_pages() -> usize {
    1000
}

fn default_max_page_ratio() -> f64 {
    5.0
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_pages: default_max_pages(),
            max_page_ratio: default_max_page_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

fn default_download_timeout() -> u64 {
    300
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_engine_program() -> String {
    "mineru".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
    /// Also notify callers about terminated tasks.
    #[serde(default)]
    pub notify_on_failure: bool,
}

fn default_webhook_timeout() -> u64 {
    10
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout(),
            notify_on_failure: false,
        }
    }
}

/// Keep windows in days (0 disables a sweep) and local `HH:MM` triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_archive_keep_days")]
    pub archive_keep_days: u32,
    #[serde(default = "default_workdir_keep_days")]
    pub workdir_keep_days: u32,
    #[serde(default = "default_archive_sweep_at")]
    pub archive_sweep_at: String,
    #[serde(default = "default_workdir_sweep_at")]
    pub workdir_sweep_at: String,
}

fn default_archive_keep_days() -> u32 {
    30
}

fn default_workdir_keep_days() -> u32 {
    3
}

fn default_archive_sweep_at() -> String {
    "03:00".to_string()
}

fn default_workdir_sweep_at() -> String {
    "03:30".to_string()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            archive_keep_days: default_archive_keep_days(),
            workdir_keep_days: default_workdir_keep_days(),
            archive_sweep_at: default_archive_sweep_at(),
            workdir_sweep_at: default_workdir_sweep_at(),
        }
    }
}
