use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::store::DEFAULT_STORE_PATH;

pub const DEFAULT_CONFIG_PATH: &str = ".textlift/config.toml";

/// Runtime settings. Provider credentials live in the provider store, not here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub attempt_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub max_text_chars: usize,
    pub chat_context_chars: usize,
    pub store_path: PathBuf,
    pub capture: CaptureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 60,
            test_timeout_secs: 10,
            max_text_chars: 10_000,
            chat_context_chars: 12_000,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            capture: CaptureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub tool_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_ms: 100,
            tool_timeout_ms: 2_000,
        }
    }
}

impl Config {
    /// Load from `TEXTLIFT_CONFIG` or the default path, then apply env overrides.
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("TEXTLIFT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source: Box::new(source),
        })
    }

    /// Overrides from the environment. Unparseable numbers are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TEXTLIFT_ATTEMPT_TIMEOUT_SECS") {
            match v.trim().parse() {
                Ok(secs) => self.attempt_timeout_secs = secs,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid TEXTLIFT_ATTEMPT_TIMEOUT_SECS"),
            }
        }
        if let Some(v) = lookup("TEXTLIFT_MAX_TEXT_CHARS") {
            match v.trim().parse() {
                Ok(n) => self.max_text_chars = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid TEXTLIFT_MAX_TEXT_CHARS"),
            }
        }
        if let Some(v) = lookup("TEXTLIFT_STORE_PATH")
            && !v.trim().is_empty()
        {
            self.store_path = PathBuf::from(v.trim());
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs.max(1))
    }
}
