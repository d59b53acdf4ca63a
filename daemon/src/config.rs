use crate::retry::RetryPolicy;
use buildfarm_common::build_config::BuildConfigSet;
use buildfarm_common::config::{ConfigFile, GithubConfig};
use buildfarm_common::errors::*;
use buildfarm_common::Toolchain;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub build_configs: BuildConfigSet,
    pub toolchains: Vec<Toolchain>,
    pub retry: RetryPolicy,
    pub cancel_retry_max: u32,
    pub tick_interval: Duration,
    pub queued_notification_delay: chrono::Duration,
    pub retention_days: i64,
    pub github: GithubConfig,
}

impl Config {
    pub fn has_toolchain(&self, toolchain: &Toolchain) -> bool {
        self.toolchains.contains(toolchain)
    }

    pub fn cancel_retry(&self) -> RetryPolicy {
        RetryPolicy::no_backoff(self.cancel_retry_max)
    }
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let config = buildfarm_common::config::load(path)?;
    from_struct(config)
}

pub fn from_struct(config: ConfigFile) -> Result<Config> {
    let build_configs = BuildConfigSet::from_declared(config.target_configs)
        .context("Invalid target configurations")?;

    let mut toolchains: Vec<Toolchain> = Vec::with_capacity(config.toolchains.len());
    for toolchain in config.toolchains {
        if toolchains.contains(&toolchain) {
            bail!("Duplicate toolchain: {}", toolchain);
        }
        toolchains.push(toolchain);
    }

    Ok(Config {
        database_path: config.database.path().to_string(),
        build_configs,
        toolchains,
        retry: RetryPolicy::from_config(&config.database),
        cancel_retry_max: config.database.cancel_retry_max(),
        tick_interval: Duration::from_secs(config.schedule.tick_interval()),
        queued_notification_delay: chrono::Duration::seconds(
            config.schedule.queued_notification_delay(),
        ),
        retention_days: config.retention.days(),
        github: config.github,
    })
}
