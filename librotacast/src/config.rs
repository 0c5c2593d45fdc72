//! Configuration management for Rotacast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::logging::LogFormat;
use crate::scheduling::Schedule;
use crate::types::OnEmpty;

pub const CONFIG_ENV: &str = "ROTACAST_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub twitter: Option<ChannelConfig>,
    pub discord: Option<ChannelConfig>,

    /// Directory relative paths resolve against (the config file's directory)
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub log_format: String,
    pub state_path: String,
    /// Run every enabled channel once at startup
    pub run_on_start: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            state_path: "~/.local/share/rotacast/state.json".to_string(),
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    /// CSV content source; defaults to the channel's conventional file name
    pub content: Option<String>,
    #[serde(default, alias = "behavior_on_empty")]
    pub on_empty: OnEmpty,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub schedule: Option<ScheduleConfig>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl ChannelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The channel's schedule, or `None` if none is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a configured schedule is malformed.
    pub fn schedule(&self) -> std::result::Result<Option<Schedule>, ConfigError> {
        match &self.schedule {
            Some(schedule) => schedule.build(),
            None => Ok(None),
        }
    }
}

/// Daily `times`, or an interval as `interval_hours` or a humantime `interval`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub times: Vec<String>,
    pub interval_hours: Option<f64>,
    pub interval: Option<String>,
}

impl ScheduleConfig {
    /// Daily times win over an interval when both are set.
    pub fn build(&self) -> std::result::Result<Option<Schedule>, ConfigError> {
        if !self.times.is_empty() {
            return Schedule::daily(&self.times).map(Some);
        }
        if let Some(hours) = self.interval_hours {
            return Schedule::every_hours(hours).map(Some);
        }
        if let Some(interval) = &self.interval {
            return Schedule::parse_interval(interval).map(Some);
        }
        Ok(None)
    }
}

/// Supported delivery channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Twitter,
    Discord,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Twitter, ChannelKind::Discord];

    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Twitter => "twitter",
            ChannelKind::Discord => "discord",
        }
    }

    fn default_content(&self) -> &'static str {
        match self {
            ChannelKind::Twitter => "tweets.csv",
            ChannelKind::Discord => "reminders.csv",
        }
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(ChannelKind::Twitter),
            "discord" => Ok(ChannelKind::Discord),
            _ => Err(format!(
                "Unknown channel: '{}'. Valid options: twitter, discord",
                s
            )),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Config {
    /// Load configuration from `explicit`, or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config_path(explicit)?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable.
    ///
    /// A channel without any schedule is not an error here; the daemon warns
    /// and skips it.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.general
            .log_format
            .parse::<LogFormat>()
            .map_err(|reason| ConfigError::InvalidValue {
                field: "general.log_format".to_string(),
                reason,
            })?;

        let enabled = self.enabled_channels();
        if enabled.is_empty() {
            return Err(ConfigError::NoChannelEnabled);
        }

        for (kind, channel) in enabled {
            if channel.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.timeout_secs", kind),
                    reason: "must be greater than zero".to_string(),
                });
            }
            channel.schedule().map_err(|e| match e {
                ConfigError::InvalidValue { field, reason } => ConfigError::InvalidValue {
                    field: format!("{}.{}", kind, field),
                    reason,
                },
                other => other,
            })?;
        }

        Ok(())
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelConfig> {
        match kind {
            ChannelKind::Twitter => self.twitter.as_ref(),
            ChannelKind::Discord => self.discord.as_ref(),
        }
    }

    /// Enabled channels in a fixed order (twitter, then discord)
    pub fn enabled_channels(&self) -> Vec<(ChannelKind, &ChannelConfig)> {
        ChannelKind::ALL
            .iter()
            .filter_map(|kind| {
                self.channel(*kind)
                    .filter(|c| c.enabled)
                    .map(|c| (*kind, c))
            })
            .collect()
    }

    /// Content source path for `kind`
    pub fn content_path(&self, kind: ChannelKind) -> PathBuf {
        let raw = self
            .channel(kind)
            .and_then(|c| c.content.as_deref())
            .unwrap_or(kind.default_content());
        self.resolve_path(raw)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve_path(&self.general.state_path)
    }

    /// `.env` file consulted for credentials
    pub fn dotenv_path(&self) -> PathBuf {
        self.base_dir.join(".env")
    }

    /// Expand `~` and resolve relative paths against the config directory
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(raw).to_string());
        if expanded.is_relative() {
            self.base_dir.join(expanded)
        } else {
            expanded
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
///
/// Order: `explicit`, then `ROTACAST_CONFIG`, then
/// `$XDG_CONFIG_HOME/rotacast/config.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(
            shellexpand::tilde(&path.to_string_lossy()).to_string(),
        ));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("rotacast").join("config.toml"))
}
