/*!
common/src/lib.rs

Shared configuration types and helpers for the Aletheia relay.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default file with an override file
- Environment overrides (`BACKEND_URL`) and secret lookup by env var name
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Backend URL used when neither the config file nor `BACKEND_URL` set one.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Environment variable overriding `backend.url`.
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.facebook.com/v18.0";

/// Analysis backend section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the analysis backend (e.g. "http://localhost:8000")
    pub url: Option<String>,
    /// Per-request timeout. Unset means no timeout.
    pub timeout_seconds: Option<u64>,
}

/// HTTP server (webhook) section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// WhatsApp Business Cloud API channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// `Some(false)` disables the channel; `None` enables it when a token is present.
    pub enabled: Option<bool>,
    pub phone_number_id: Option<String>,
    /// The business number messages are sent from; used to drop our own echoes.
    pub business_number: Option<String>,
    pub graph_api_url: Option<String>,
    pub access_token_env: Option<String>,
    pub verify_token_env: Option<String>,
    pub app_secret_env: Option<String>,
}

/// Telegram Bot API channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// `Some(false)` disables the channel; `None` enables it when a token is present.
    pub enabled: Option<bool>,
    pub token_env: Option<String>,
    /// Long-polling timeout passed to getUpdates
    pub poll_timeout_seconds: Option<u32>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl WhatsAppConfig {
    pub fn access_token_env(&self) -> &str {
        self.access_token_env.as_deref().unwrap_or("WHATSAPP_ACCESS_TOKEN")
    }

    pub fn verify_token_env(&self) -> &str {
        self.verify_token_env.as_deref().unwrap_or("WHATSAPP_VERIFY_TOKEN")
    }

    pub fn app_secret_env(&self) -> &str {
        self.app_secret_env.as_deref().unwrap_or("WHATSAPP_APP_SECRET")
    }

    pub fn graph_api_url(&self) -> &str {
        self.graph_api_url
            .as_deref()
            .unwrap_or(DEFAULT_GRAPH_API_URL)
            .trim_end_matches('/')
    }
}

impl TelegramConfig {
    pub fn token_env(&self) -> &str {
        self.token_env.as_deref().unwrap_or("TELEGRAM_BOT_TOKEN")
    }
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    /// Missing files are skipped, so with neither present the result is `Config::default()`.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path).await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using the given lookup. Empty values are ignored.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.is_empty()) {
            self.backend.url = Some(url);
        }
    }

    /// The backend base URL, validated.
    pub fn backend_url(&self) -> Result<Url> {
        let raw = self.backend.url.as_deref().unwrap_or(DEFAULT_BACKEND_URL);
        let url = Url::parse(raw).with_context(|| format!("Invalid backend URL: {}", raw))?;
        if url.cannot_be_a_base() {
            anyhow::bail!("Backend URL cannot be used as a base: {}", raw);
        }
        Ok(url)
    }
}

/// Read a secret from the environment variable named `env_name`.
/// Unset and empty variables both yield `None`.
pub fn resolve_secret(env_name: &str) -> Option<String> {
    std::env::var(env_name).ok().filter(|v| !v.trim().is_empty())
}

/// Decide whether a channel runs and with which token.
///
/// An explicit `enabled = false` always wins; an explicit `enabled = true`
/// without a token is a configuration error; otherwise the channel runs
/// exactly when its token is available.
pub fn channel_token(channel: &str, enabled: Option<bool>, token: Option<String>) -> Result<Option<String>> {
    match (enabled, token) {
        (Some(false), _) => Ok(None),
        (_, Some(token)) => Ok(Some(token)),
        (Some(true), None) => anyhow::bail!("{} channel is enabled but its token is not set", channel),
        (None, None) => Ok(None),
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
