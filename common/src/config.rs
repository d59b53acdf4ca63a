use crate::build_config::TargetConfig;
use crate::build_id::Toolchain;
use crate::errors::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_PATH: &str = "buildfarm.db";
pub const DEFAULT_RETRY_MAX: u32 = 10;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 20;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 2_000;
pub const DEFAULT_CANCEL_RETRY_MAX: u32 = 5;

pub const DEFAULT_TICK_INTERVAL: u64 = 30;
pub const DEFAULT_QUEUED_NOTIFICATION_DELAY: i64 = 10;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;
pub const GC_INTERVAL: u64 = 3600;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<ConfigFile> {
    let mut config = ConfigFile::default();

    if let Some(c) = load_from("/etc/buildfarm.conf")? {
        config.update(c);
    }

    if let Ok(path) = config_path() {
        if let Some(c) = load_from(path)? {
            config.update(c);
        }
    }

    if let Some(path) = path {
        let c = load_from(path)?.ok_or_else(|| format_err!("Failed to read config file"))?;
        config.update(c);
    }

    Ok(config)
}

fn config_path() -> Result<PathBuf> {
    let config_dir =
        dirs_next::config_dir().ok_or_else(|| format_err!("Failed to find config dir"))?;
    Ok(config_dir.join("buildfarm.conf"))
}

fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<ConfigFile>> {
    if let Ok(buf) = fs::read_to_string(path.as_ref()) {
        debug!("loading config file {:?}", path.as_ref());
        let config = toml::from_str(&buf).context("Failed to load config")?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub target_configs: Vec<TargetConfig>,
    #[serde(default)]
    pub toolchains: Vec<Toolchain>,
    #[serde(default)]
    pub github: GithubConfig,
}

impl ConfigFile {
    pub fn update(&mut self, c: ConfigFile) {
        self.database.update(c.database);
        self.schedule.update(c.schedule);
        self.retention.update(c.retention);
        if !c.target_configs.is_empty() {
            self.target_configs = c.target_configs;
        }
        if !c.toolchains.is_empty() {
            self.toolchains = c.toolchains;
        }
        self.github.update(c.github);
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
    pub retry_max: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub cancel_retry_max: Option<u32>,
}

impl DatabaseConfig {
    pub fn update(&mut self, c: DatabaseConfig) {
        if c.path.is_some() {
            self.path = c.path;
        }
        if c.retry_max.is_some() {
            self.retry_max = c.retry_max;
        }
        if c.retry_delay_ms.is_some() {
            self.retry_delay_ms = c.retry_delay_ms;
        }
        if c.max_retry_delay_ms.is_some() {
            self.max_retry_delay_ms = c.max_retry_delay_ms;
        }
        if c.cancel_retry_max.is_some() {
            self.cancel_retry_max = c.cancel_retry_max;
        }
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_DATABASE_PATH)
    }

    pub fn retry_max(&self) -> u32 {
        self.retry_max.unwrap_or(DEFAULT_RETRY_MAX)
    }

    pub fn retry_delay_ms(&self) -> u64 {
        self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS)
    }

    pub fn max_retry_delay_ms(&self) -> u64 {
        self.max_retry_delay_ms.unwrap_or(DEFAULT_MAX_RETRY_DELAY_MS)
    }

    pub fn cancel_retry_max(&self) -> u32 {
        self.cancel_retry_max.unwrap_or(DEFAULT_CANCEL_RETRY_MAX)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    tick_interval: Option<u64>,
    queued_notification_delay: Option<i64>,
}

impl ScheduleConfig {
    pub fn update(&mut self, c: ScheduleConfig) {
        if c.tick_interval.is_some() {
            self.tick_interval = c.tick_interval;
        }
        if c.queued_notification_delay.is_some() {
            self.queued_notification_delay = c.queued_notification_delay;
        }
    }

    /// Seconds between scheduler passes.
    pub fn tick_interval(&self) -> u64 {
        self.tick_interval.unwrap_or(DEFAULT_TICK_INTERVAL)
    }

    /// Seconds a tenant is left alone after a queued notification was sent
    /// for it.
    pub fn queued_notification_delay(&self) -> i64 {
        self.queued_notification_delay
            .unwrap_or(DEFAULT_QUEUED_NOTIFICATION_DELAY)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    days: Option<i64>,
}

impl RetentionConfig {
    pub fn update(&mut self, c: RetentionConfig) {
        if c.days.is_some() {
            self.days = c.days;
        }
    }

    pub fn days(&self) -> i64 {
        self.days.unwrap_or(DEFAULT_RETENTION_DAYS)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: Option<String>,
    pub app_id: Option<u64>,
    pub private_key_file: Option<PathBuf>,
    #[serde(default)]
    pub warning_success: bool,
    pub details_url: Option<String>,
}

impl GithubConfig {
    pub fn update(&mut self, c: GithubConfig) {
        if c.api_url.is_some() {
            self.api_url = c.api_url;
        }
        if c.app_id.is_some() {
            self.app_id = c.app_id;
        }
        if c.private_key_file.is_some() {
            self.private_key_file = c.private_key_file;
        }
        if c.warning_success {
            self.warning_success = true;
        }
        if c.details_url.is_some() {
            self.details_url = c.details_url;
        }
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_GITHUB_API_URL)
    }
}
