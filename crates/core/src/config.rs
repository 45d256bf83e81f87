//! Application configuration.
//!
//! Values are layered: built-in defaults, then `~/.config/gamehub/config.toml`,
//! then `GAMEHUB_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::query::{Backoff, FetchPolicy};

/// Directory under the user's config root holding `config.toml`.
pub const CONFIG_DIR: &str = "gamehub";

const DEFAULT_CONFIG: &str = r#"# gamehub configuration
#
# Every value can also be set through GAMEHUB_<FIELD> environment variables,
# e.g. GAMEHUB_API_KEY.

base_url = "https://api.rawg.io/api"
api_key = ""

# Extra attempts after a failed list request.
retries = 2
backoff_base_ms = 1000
backoff_max_ms = 30000

# Freshness windows.
games_stale_secs = 3600
reference_stale_secs = 86400
# Inactive filter combinations are dropped from memory after this long.
cache_secs = 300

request_timeout_secs = 15
# page_size = 20
"#;

/// Runtime settings for the catalog client and fetch layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Catalog API base address.
    pub base_url: String,
    /// API key attached to every request as `key`.
    pub api_key: String,
    /// Retries after the first failed attempt.
    pub retries: u32,
    /// First retry delay in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Upper bound for the retry delay in milliseconds.
    pub backoff_max_ms: u64,
    /// Freshness window for game listings.
    pub games_stale_secs: u64,
    /// Freshness window for genre and platform lists.
    pub reference_stale_secs: u64,
    /// How long an inactive query keeps its pages.
    pub cache_secs: u64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Optional `page_size` sent with list requests.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.rawg.io/api".to_string(),
            api_key: String::new(),
            retries: 2,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            games_stale_secs: 60 * 60,
            reference_stale_secs: 24 * 60 * 60,
            cache_secs: 5 * 60,
            request_timeout_secs: 15,
            page_size: None,
        }
    }
}

impl AppConfig {
    /// Load from the default location plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional on disk) plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::layered(path.as_ref(), true)
    }

    fn layered(path: &Path, with_env: bool) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("base_url", defaults.base_url)?
            .set_default("api_key", defaults.api_key)?
            .set_default("retries", i64::from(defaults.retries))?
            .set_default("backoff_base_ms", defaults.backoff_base_ms as i64)?
            .set_default("backoff_max_ms", defaults.backoff_max_ms as i64)?
            .set_default("games_stale_secs", defaults.games_stale_secs as i64)?
            .set_default("reference_stale_secs", defaults.reference_stale_secs as i64)?
            .set_default("cache_secs", defaults.cache_secs as i64)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .add_source(File::from(path.to_path_buf()).required(false));
        if with_env {
            builder = builder.add_source(Environment::with_prefix("GAMEHUB"));
        }
        let settings = builder
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    /// Retry and freshness policy for game listings.
    pub fn games_policy(&self) -> FetchPolicy {
        self.policy(self.games_stale_secs)
    }

    /// Retry and freshness policy for genre and platform lists.
    pub fn reference_policy(&self) -> FetchPolicy {
        self.policy(self.reference_stale_secs)
    }

    fn policy(&self, stale_secs: u64) -> FetchPolicy {
        FetchPolicy {
            retries: self.retries,
            backoff: self.backoff(),
            stale_time: Duration::from_secs(stale_secs),
            cache_time: Duration::from_secs(self.cache_secs),
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.backoff_base_ms),
            max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

/// Location of the user configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join("config.toml")
}

/// Write the commented default configuration if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(config_path())
}

fn write_default_config(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::layered(&dir.path().join("absent.toml"), false)?;
        assert_eq!(config.base_url, AppConfig::default().base_url);
        assert_eq!(config.retries, 2);
        assert_eq!(config.page_size, None);
        Ok(())
    }

    #[test]
    fn default_file_parses_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        write_default_config(&path)?;
        assert!(path.exists());

        let config = AppConfig::layered(&path, false)?;
        assert_eq!(config.games_stale_secs, 3600);
        assert_eq!(config.reference_stale_secs, 86_400);
        assert_eq!(config.backoff_max_ms, 30_000);
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "api_key = \"secret\"\nretries = 0\npage_size = 40\nbase_url = \"http://localhost:8080\"\n",
        )?;

        let config = AppConfig::layered(&path, false)?;
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.retries, 0);
        assert_eq!(config.page_size, Some(40));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.request_timeout_secs, 15);
        Ok(())
    }

    #[test]
    fn existing_file_is_not_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_key = \"mine\"\n")?;
        write_default_config(&path)?;
        assert_eq!(fs::read_to_string(&path)?, "api_key = \"mine\"\n");
        Ok(())
    }

    #[test]
    fn policies_follow_config() {
        let config = AppConfig {
            retries: 1,
            backoff_base_ms: 10,
            backoff_max_ms: 50,
            ..AppConfig::default()
        };
        let games = config.games_policy();
        assert_eq!(games.retries, 1);
        assert_eq!(games.stale_time, Duration::from_secs(3600));
        assert_eq!(games.backoff.max, Duration::from_millis(50));
        assert_eq!(games.cache_time, Duration::from_secs(300));
        assert_eq!(
            config.reference_policy().stale_time,
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn cache_time_comes_from_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "cache_secs = 60\n")?;

        let file_only = AppConfig::layered(&path, false)?;
        assert_eq!(file_only.cache_secs, 60);
        assert_eq!(file_only.api_key, "");
        assert_eq!(file_only.games_policy().cache_time, Duration::from_secs(60));
        Ok(())
    }
}
