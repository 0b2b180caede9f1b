use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::services::clock::DEFAULT_TIMEZONE;

pub const APP_ID: &str = "uk.ac.ewa.EssayAssistant";
pub const APP_DIR: &str = "essay-assistant";
pub const API_KEY_ENV: &str = "EWA_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: Option<PathBuf>,
    pub provider: ProviderConfig,
    pub chat: ChatConfig,
    pub session: SessionConfig,
    pub titles: TitleConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

/// How user input moves the session between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Digit choice from `initial`, then keyword steps in workflow order.
    #[default]
    Sequential,
    /// As `Sequential`, plus any review keyword jumps to review from any stage.
    ReviewKeywords,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub guidance_max_tokens: u32,
    pub review_max_tokens: u32,
    pub guidance_temperature: f32,
    pub review_temperature: f32,
    pub transition_policy: TransitionPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            guidance_max_tokens: 400,
            review_max_tokens: 5000,
            guidance_temperature: 0.0,
            review_temperature: 0.0,
            transition_policy: TransitionPolicy::Sequential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timeout_secs: u64,
    pub page_size: usize,
    /// IANA zone name used for every displayed timestamp.
    pub timezone: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            page_size: 10,
            timezone: DEFAULT_TIMEZONE.name().to_string(),
        }
    }
}

impl SessionConfig {
    /// Inactivity limit; must be positive and representable.
    pub fn timeout(&self) -> Result<chrono::Duration> {
        if self.timeout_secs == 0 {
            bail!("session.timeout_secs must be greater than 0");
        }
        i64::try_from(self.timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .with_context(|| format!("session.timeout_secs is too large: {}", self.timeout_secs))
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Unknown session.timezone {:?}: {}", self.timezone, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStrategyKind {
    #[default]
    LeadingWords,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub strategy: TitleStrategyKind,
    pub words: usize,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            strategy: TitleStrategyKind::LeadingWords,
            words: 6,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// 0 disables the sidebar cache.
    pub cache_ttl_secs: u64,
}

impl AppConfig {
    /// Load from `path`, or from the default location when `None`. A missing
    /// file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(config_dir()?.join(APP_DIR).join("config.toml"))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir()?.join(APP_DIR).join("ewa.db")),
        }
    }

    /// API key from the environment, falling back to the config file.
    /// The keyring is consulted separately by the caller.
    pub fn api_key_from_env_or_file(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.provider.api_key.clone())
    }
}

fn home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .context("HOME not set")
}

fn config_dir() -> Result<PathBuf> {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) => Ok(PathBuf::from(dir)),
        Err(_) => Ok(home_dir()?.join(".config")),
    }
}

fn data_dir() -> Result<PathBuf> {
    match std::env::var("XDG_DATA_HOME") {
        Ok(dir) => Ok(PathBuf::from(dir)),
        Err(_) => Ok(home_dir()?.join(".local/share")),
    }
}
