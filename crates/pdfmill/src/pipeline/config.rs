use chrono_tz::Tz;

use crate::config::Config;
use crate::error::ConfigError;
use crate::processor::Limits;
use crate::storage::InstanceLayout;

/// Settings the orchestrator needs, resolved once from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub layout: InstanceLayout,
    pub timezone: Tz,
    pub limits: Limits,
    pub notify_on_failure: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            layout: InstanceLayout::new(&config.instance_path),
            timezone: config.tz()?,
            limits: Limits {
                max_file_size: config.limits.max_file_size,
                max_pages: config.limits.max_pages,
                max_page_ratio: config.limits.max_page_ratio,
            },
            notify_on_failure: config.webhook.notify_on_failure,
        })
    }
}
