use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Minimum interval between background metadata refreshes of one item
    #[serde(default = "default_refresh_cooldown")]
    pub metadata_refresh_cooldown_secs: u64,

    /// Background refresh requests allowed in flight at once
    #[serde(default = "default_max_concurrent_refreshes")]
    pub max_concurrent_refreshes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_guard_band")]
    pub resume_guard_band: f64,

    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Config {
    /// Load from the user config directory, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        info!("Config loaded successfully");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.playback.resume_guard_band) {
            return Err(crate::utils::AppError::Configuration(format!(
                "resume_guard_band must be in [0, 1), got {}",
                self.playback.resume_guard_band
            ))
            .into());
        }
        let threshold = self.playback.completion_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(crate::utils::AppError::Configuration(format!(
                "completion_threshold must be in (0, 1], got {threshold}"
            ))
            .into());
        }
        if self.cache.max_concurrent_refreshes == 0 {
            return Err(crate::utils::AppError::Configuration(
                "max_concurrent_refreshes must be positive".to_string(),
            )
            .into());
        }
        if self.events.channel_capacity == 0 {
            return Err(crate::utils::AppError::Configuration(
                "channel_capacity must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.cache.metadata_refresh_cooldown_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("media-library-client").join("config.toml"))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            auth_token: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_refresh_cooldown_secs: default_refresh_cooldown(),
            max_concurrent_refreshes: default_max_concurrent_refreshes(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            resume_guard_band: default_guard_band(),
            completion_threshold: default_completion_threshold(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            history_size: default_history_size(),
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:9191/api/media-library".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_refresh_cooldown() -> u64 {
    60
}
fn default_max_concurrent_refreshes() -> usize {
    4
}
fn default_guard_band() -> f64 {
    crate::models::RESUME_GUARD_BAND
}
fn default_completion_threshold() -> f64 {
    crate::models::COMPLETION_THRESHOLD
}
fn default_channel_capacity() -> usize {
    1000
}
fn default_history_size() -> usize {
    100
}
