//! Configuration management for promocast
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. Every section has defaults so a config file only needs to name
//! what it changes.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channels::webhook::WebhookConfig;
use crate::models::PlatformScope;

/// Posting hours used when no schedule is configured
pub const DEFAULT_POSTING_HOURS: [u8; 7] = [8, 10, 12, 14, 16, 18, 20];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine timing and identity
    pub engine: EngineConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Named posting schedules
    pub schedules: Vec<ScheduleConfig>,

    /// Channel adapter configuration
    pub channels: ChannelsConfig,

    /// Site key to URL overrides, merged over the built-in table
    pub sites: BTreeMap<String, String>,

    /// Content category to image filenames, merged over the built-in table
    pub image_categories: BTreeMap<String, Vec<String>>,

    /// Read API server
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Engine timing and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between trigger ticks
    pub tick_interval_secs: u64,

    /// Seconds between insights refreshes
    pub insights_interval_secs: u64,

    /// Seconds between integration bootstrap runs
    pub housekeeping_interval_secs: u64,

    /// Reference timezone as a fixed offset from UTC, in hours
    pub utc_offset_hours: i32,

    /// Public base URL that image paths are joined to
    pub base_url: String,

    /// Tenant whose channel integration is used
    pub tenant_id: String,

    /// Site key used for unknown target sites
    pub default_site: String,

    /// Ledger rows loaded per page during an insights refresh
    pub insights_page_size: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// One named posting schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Unique schedule name
    pub name: String,

    /// Hours of the reference day (0-23) at which the schedule fires
    pub hours: Vec<u8>,

    /// Platform scope requested from the content pool
    #[serde(default)]
    pub platform: PlatformScope,

    /// Optional content category filter
    #[serde(default)]
    pub category: Option<String>,

    /// Ignore per-channel hour gating for this schedule's cycles
    #[serde(default)]
    pub force_channels: bool,
}

impl ScheduleConfig {
    /// Create a schedule for all platforms
    pub fn new(name: impl Into<String>, hours: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            hours: hours.into(),
            platform: PlatformScope::All,
            category: None,
            force_channels: false,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<PlatformScope>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_force_channels(mut self, force: bool) -> Self {
        self.force_channels = force;
        self
    }
}

/// Per-platform adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformChannelConfig {
    /// Register the adapter at all
    pub enabled: bool,

    /// Override the platform's character limit
    pub max_chars: Option<usize>,

    /// Restrict publishing to these hours of the reference day
    pub allowed_hours: Option<Vec<u8>>,

    /// Override the API base URL
    pub api_base_url: Option<String>,
}

impl Default for PlatformChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: None,
            allowed_hours: None,
            api_base_url: None,
        }
    }
}

/// Channel adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// HTTP client timeout for platform calls, in seconds
    pub http_timeout_secs: u64,

    pub facebook: PlatformChannelConfig,

    pub instagram: PlatformChannelConfig,

    pub x: PlatformChannelConfig,

    /// Generic webhook broadcast channels
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            facebook: PlatformChannelConfig::default(),
            instagram: PlatformChannelConfig::default(),
            x: PlatformChannelConfig::default(),
            webhooks: Vec::new(),
        }
    }
}

/// Read API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to
    pub bind_address: SocketAddr,

    /// Enable permissive CORS
    pub enable_cors: bool,

    /// Enable request tracing
    pub enable_request_logging: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let tick_interval_secs = env_parse("PROMOCAST_TICK_INTERVAL").unwrap_or(defaults.engine.tick_interval_secs);

        let insights_interval_secs =
            env_parse("PROMOCAST_INSIGHTS_INTERVAL").unwrap_or(defaults.engine.insights_interval_secs);

        let housekeeping_interval_secs =
            env_parse("PROMOCAST_HOUSEKEEPING_INTERVAL").unwrap_or(defaults.engine.housekeeping_interval_secs);

        let utc_offset_hours = env_parse("PROMOCAST_UTC_OFFSET").unwrap_or(defaults.engine.utc_offset_hours);

        let base_url = std::env::var("PROMOCAST_BASE_URL").unwrap_or(defaults.engine.base_url);

        let tenant_id = std::env::var("PROMOCAST_TENANT").unwrap_or(defaults.engine.tenant_id);

        let sqlite_path = std::env::var("PROMOCAST_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database.sqlite_path);

        let bind_address = match std::env::var("PROMOCAST_BIND") {
            Ok(addr) => addr
                .parse()
                .with_context(|| format!("Invalid PROMOCAST_BIND address: {addr}"))?,
            Err(_) => defaults.server.bind_address,
        };

        let mut webhooks = Vec::new();
        if let Ok(url) = std::env::var("PROMOCAST_WEBHOOK_URL") {
            let mut webhook = WebhookConfig::new(url);
            if let Ok(token) = std::env::var("PROMOCAST_WEBHOOK_TOKEN") {
                webhook = webhook.with_auth_token(token);
            }
            webhooks.push(webhook);
        }

        let level = std::env::var("PROMOCAST_LOG_LEVEL").unwrap_or(defaults.logging.level);
        let format = std::env::var("PROMOCAST_LOG_FORMAT").unwrap_or(defaults.logging.format);

        Ok(Self {
            engine: EngineConfig {
                tick_interval_secs,
                insights_interval_secs,
                housekeeping_interval_secs,
                utc_offset_hours,
                base_url,
                tenant_id,
                ..defaults.engine
            },
            database: DatabaseConfig { sqlite_path },
            channels: ChannelsConfig {
                webhooks,
                ..defaults.channels
            },
            server: ServerConfig {
                bind_address,
                ..defaults.server
            },
            logging: LoggingConfig { level, format },
            ..Self::default()
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be greater than 0");
        }

        if self.engine.insights_interval_secs == 0 {
            anyhow::bail!("insights_interval_secs must be greater than 0");
        }

        if self.engine.housekeeping_interval_secs == 0 {
            anyhow::bail!("housekeeping_interval_secs must be greater than 0");
        }

        if self.engine.insights_page_size == 0 {
            anyhow::bail!("insights_page_size must be greater than 0");
        }

        self.reference_offset()?;

        url::Url::parse(&self.engine.base_url)
            .with_context(|| format!("base_url is not a valid URL: {}", self.engine.base_url))?;

        if self.engine.tenant_id.trim().is_empty() {
            anyhow::bail!("tenant_id cannot be empty");
        }

        let mut names = HashSet::new();
        for schedule in &self.schedules {
            if schedule.name.trim().is_empty() {
                anyhow::bail!("schedule name cannot be empty");
            }
            if !names.insert(schedule.name.as_str()) {
                anyhow::bail!("duplicate schedule name '{}'", schedule.name);
            }
            if schedule.hours.is_empty() {
                anyhow::bail!("schedule '{}' has no hours", schedule.name);
            }
            validate_hours(&schedule.hours).with_context(|| format!("schedule '{}'", schedule.name))?;
        }

        for (name, channel) in [
            ("facebook", &self.channels.facebook),
            ("instagram", &self.channels.instagram),
            ("x", &self.channels.x),
        ] {
            if let Some(max) = channel.max_chars {
                if max <= 3 {
                    anyhow::bail!("channels.{name}.max_chars must be greater than 3");
                }
            }
            if let Some(hours) = &channel.allowed_hours {
                validate_hours(hours).with_context(|| format!("channels.{name}.allowed_hours"))?;
            }
        }

        for webhook in &self.channels.webhooks {
            webhook
                .validate()
                .map_err(|e| anyhow::anyhow!("webhook '{}': {e}", webhook.name))?;
        }

        for (key, site) in &self.sites {
            url::Url::parse(site).with_context(|| format!("site '{key}' has an invalid URL: {site}"))?;
        }

        Ok(())
    }

    /// Reference timezone used for hour-of-day decisions
    pub fn reference_offset(&self) -> Result<FixedOffset> {
        let hours = self.engine.utc_offset_hours;
        if !(-14..=14).contains(&hours) {
            anyhow::bail!("utc_offset_hours must be within -14..=14, got {hours}");
        }
        FixedOffset::east_opt(hours * 3600).with_context(|| format!("invalid UTC offset: {hours}h"))
    }

    /// Get tick interval as Duration
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.engine.tick_interval_secs)
    }

    /// Get insights interval as Duration
    #[must_use]
    pub fn insights_interval(&self) -> Duration {
        Duration::from_secs(self.engine.insights_interval_secs)
    }

    /// Get housekeeping interval as Duration
    #[must_use]
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.engine.housekeeping_interval_secs)
    }

    /// Get HTTP client timeout as Duration
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.channels.http_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn validate_hours(hours: &[u8]) -> Result<()> {
    if let Some(bad) = hours.iter().find(|h| **h > 23) {
        anyhow::bail!("hour {bad} is out of range 0-23");
    }
    Ok(())
}

fn default_schedules() -> Vec<ScheduleConfig> {
    vec![ScheduleConfig::new("marketing", DEFAULT_POSTING_HOURS.to_vec())]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            database: DatabaseConfig::default(),
            schedules: default_schedules(),
            channels: ChannelsConfig::default(),
            sites: BTreeMap::new(),
            image_categories: BTreeMap::new(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            insights_interval_secs: 30 * 60,
            housekeeping_interval_secs: 6 * 60 * 60,
            utc_offset_hours: 0,
            base_url: String::from("https://garagebot.io"),
            tenant_id: String::from("garagebot"),
            default_site: String::from("garagebot"),
            insights_page_size: 200,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/promocast.db"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
