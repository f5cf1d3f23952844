pub mod loader;
pub mod schema;

pub use loader::{
    default_config_path, load_config, load_config_from_str, parse_sweep_time, parse_timezone,
    CONFIG_ENV,
};
pub use schema::{
    Config, DispatchConfig, DownloadConfig, EngineConfig, LimitsConfig, RetentionConfig,
    WebhookConfig,
};
