//! Configuration management for Sharekit

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result, SocialError};

/// Environment variable pointing at an alternate config file
pub const CONFIG_ENV: &str = "SHAREKIT_CONFIG";
pub const TWITTER_CONSUMER_KEY_ENV: &str = "SHAREKIT_TWITTER_CONSUMER_KEY";
pub const TWITTER_CONSUMER_SECRET_ENV: &str = "SHAREKIT_TWITTER_CONSUMER_SECRET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub twitter: Option<TwitterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub path: String,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            path: "~/.config/sharekit/accounts.toml".to_string(),
        }
    }
}

impl AccountsConfig {
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Transport settings; the core itself enforces no timeout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: Option<u64>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Build the HTTP client the binaries share across operations
    ///
    /// # Errors
    ///
    /// Returns `SocialError::Network` if the TLS backend cannot be set up.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout() {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| SocialError::network("building HTTP client", e))
    }
}

/// Consumer credentials and optional endpoint overrides for Twitter
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TwitterConfig {
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
    pub callback_url: Option<String>,
    pub request_token_url: Option<String>,
    pub authorize_url: Option<String>,
    pub access_token_url: Option<String>,
    pub update_url: Option<String>,
    pub upload_url: Option<String>,
}

impl std::fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterConfig")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("callback_url", &self.callback_url)
            .field("request_token_url", &self.request_token_url)
            .field("authorize_url", &self.authorize_url)
            .field("access_token_url", &self.access_token_url)
            .field("update_url", &self.update_url)
            .field("upload_url", &self.upload_url)
            .finish()
    }
}

impl Config {
    /// Load configuration from the default location, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = Self::load_from_path(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::ReadError)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        std::fs::write(path, content).map_err(ConfigError::ReadError)?;
        Ok(())
    }

    /// Configuration with an empty Twitter section, ready to be filled in
    pub fn default_config() -> Self {
        Self {
            accounts: AccountsConfig::default(),
            http: HttpConfig {
                timeout_secs: Some(30),
            },
            twitter: Some(TwitterConfig::default()),
        }
    }

    /// Consumer credentials from the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        let key = std::env::var(TWITTER_CONSUMER_KEY_ENV).ok();
        let secret = std::env::var(TWITTER_CONSUMER_SECRET_ENV).ok();
        if key.is_none() && secret.is_none() {
            return;
        }

        let twitter = self.twitter.get_or_insert_with(TwitterConfig::default);
        if let Some(key) = key {
            twitter.consumer_key = key;
        }
        if let Some(secret) = secret {
            twitter.consumer_secret = secret;
        }
    }

    pub fn twitter(&self) -> Result<&TwitterConfig> {
        self.twitter
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("twitter".to_string()).into())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("sharekit").join("config.toml"))
}
