//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The corp secret is loaded from the WECOM_CORP_SECRET env var or
//! corp_secret_file, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wecom_auth::{DEFAULT_API_BASE, MAX_REFRESH_INTERVAL_SECS, default_token_path};
use wecom_message::{ClientConfig, DefaultFields};

/// Env var holding the application secret
pub const SECRET_ENV: &str = "WECOM_CORP_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub corp: CorpConfig,
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Corp and application identity
#[derive(Debug, Deserialize)]
pub struct CorpConfig {
    pub corp_id: String,
    pub agent_id: u64,
    #[serde(skip)]
    pub corp_secret: Option<Secret<String>>,
    /// Path to a file containing the secret (alternative to WECOM_CORP_SECRET)
    #[serde(default)]
    pub corp_secret_file: Option<PathBuf>,
}

/// HTTP and token cache settings
#[derive(Debug, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Token file location; defaults to a per-corp file under the temp dir
    #[serde(default)]
    pub token_cache_path: Option<PathBuf>,
    #[serde(default = "default_persist_token")]
    pub persist_token: bool,
}

/// Fields merged into every message
#[derive(Debug, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_to_user")]
    pub to_user: String,
    #[serde(default)]
    pub to_party: String,
    #[serde(default)]
    pub to_tag: String,
    #[serde(default)]
    pub enable_duplicate_check: bool,
    #[serde(default)]
    pub duplicate_check_interval: Option<u32>,
}

fn default_refresh_interval() -> u64 {
    MAX_REFRESH_INTERVAL_SECS
}

fn default_retry() -> u32 {
    2
}

fn default_timeout() -> u64 {
    10
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_persist_token() -> bool {
    true
}

fn default_to_user() -> String {
    "@all".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            retry: default_retry(),
            timeout_secs: default_timeout(),
            api_base: default_api_base(),
            token_cache_path: None,
            persist_token: default_persist_token(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            to_user: default_to_user(),
            to_party: String::new(),
            to_tag: String::new(),
            enable_duplicate_check: false,
            duplicate_check_interval: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order:
    /// 1. WECOM_CORP_SECRET env var
    /// 2. corp_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.corp.corp_id.trim().is_empty() {
            return Err(common::Error::Config("corp_id must not be empty".into()));
        }

        if !config.client.api_base.starts_with("http://")
            && !config.client.api_base.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api_base must start with http:// or https://, got: {}",
                config.client.api_base
            )));
        }

        if config.client.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        let env_secret = std::env::var(SECRET_ENV)
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());

        if let Some(secret) = env_secret {
            config.corp.corp_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.corp.corp_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read corp_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.corp.corp_secret = Some(Secret::new(secret));
            }
        }

        if config.corp.corp_secret.is_none() {
            return Err(common::Error::Config(format!(
                "corp secret missing: set {SECRET_ENV} or corp_secret_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("wecom-notify.toml")
    }

    /// Token file the client should use, if persistence is enabled.
    pub fn token_cache_path(&self) -> Option<PathBuf> {
        if !self.client.persist_token {
            return None;
        }
        Some(
            self.client
                .token_cache_path
                .clone()
                .unwrap_or_else(|| default_token_path(&self.corp.corp_id)),
        )
    }

    /// Build the library client configuration. Requires a loaded secret.
    pub fn client_config(&self) -> common::Result<ClientConfig> {
        let secret = self
            .corp
            .corp_secret
            .clone()
            .ok_or_else(|| common::Error::Config("corp secret not loaded".into()))?;

        let mut client = ClientConfig::new(self.corp.corp_id.clone(), secret, self.corp.agent_id);
        client.refresh_interval = Duration::from_secs(self.client.refresh_interval_secs);
        client.retry = self.client.retry;
        client.timeout = Duration::from_secs(self.client.timeout_secs);
        client.api_base = self.client.api_base.clone();
        client.token_cache_path = self.token_cache_path();
        Ok(client)
    }

    /// Message defaults from the `[defaults]` table.
    pub fn default_fields(&self) -> DefaultFields {
        DefaultFields {
            to_user: self.defaults.to_user.clone(),
            to_party: self.defaults.to_party.clone(),
            to_tag: self.defaults.to_tag.clone(),
            agent_id: self.corp.agent_id,
            enable_duplicate_check: self.defaults.enable_duplicate_check,
            duplicate_check_interval: self.defaults.duplicate_check_interval,
        }
    }
}
