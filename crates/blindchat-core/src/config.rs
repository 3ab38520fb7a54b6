//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{BlindchatError, Result};

/// Top-level Blindchat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// How the Telegram transport receives updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    #[default]
    Polling,
    Webhook,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token_env: Option<String>,

    #[serde(default)]
    pub mode: UpdateMode,

    /// Public URL Telegram should POST updates to (webhook mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Shared secret echoed in `X-Telegram-Bot-Api-Secret-Token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token_env: Option<String>,

    /// Long-poll timeout in seconds (default: 30).
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Register the command menu with `setMyCommands` at startup.
    #[serde(default = "default_true")]
    pub register_commands: bool,

    /// Bot API base URL, overridable for local Bot API servers.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "https://api.telegram.org".into()
}

impl TelegramConfig {
    /// Resolve the bot token: check `bot_token` first, then `bot_token_env`.
    pub fn resolve_bot_token(&self) -> Option<String> {
        resolve_secret_field(&self.bot_token, &self.bot_token_env)
    }

    pub fn resolve_secret_token(&self) -> Option<String> {
        resolve_secret_field(&self.secret_token, &self.secret_token_env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "blindchat_core=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

static ENV_VAR_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let substituted = substitute_env_vars(raw);
        json5::from_str(&substituted).map_err(|e| BlindchatError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(8080)
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.telegram.as_ref().map(|t| t.mode).unwrap_or_default()
    }

    /// Get a config value by dotted path (e.g. "gateway.port").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a value by dotted path directly in the config file at `path`.
    ///
    /// The file is edited as raw JSON, so `${ENV_VAR}` references are written
    /// back unexpanded. The result must still load as a valid config.
    pub fn set_in_file(path: &Path, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let raw = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            "{}".to_string()
        };
        let mut json: serde_json::Value =
            json5::from_str(&raw).map_err(|e| anyhow::anyhow!("Config parse error: {e}"))?;
        set_value_path(&mut json, key, value)?;

        let text = serde_json::to_string_pretty(&json)?;
        Self::parse(&text).map_err(|e| anyhow::anyhow!("Refusing to write invalid config: {e}"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        match &self.telegram {
            None => warnings.push("No telegram section configured; nothing to serve".to_string()),
            Some(tg) => {
                if tg.resolve_bot_token().is_none() {
                    errors.push("Telegram bot token is not configured".to_string());
                }
                if tg.mode == UpdateMode::Webhook {
                    match tg.webhook_url.as_deref() {
                        None | Some("") => {
                            errors.push("Webhook mode requires telegram.webhook_url".to_string())
                        }
                        Some(url) if !url.starts_with("https://") => {
                            warnings.push(format!("Telegram only delivers to HTTPS webhooks: {url}"))
                        }
                        Some(_) => {}
                    }
                    if tg.resolve_secret_token().is_none() {
                        warnings.push("Webhook has no secret token; any caller can post updates".to_string());
                    }
                }
                if tg.poll_timeout_secs == 0 {
                    warnings.push("poll_timeout_secs = 0 turns long polling into busy polling".to_string());
                }
            }
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        if let Some(logging) = &self.logging {
            if !matches!(logging.format.as_str(), "plain" | "json") {
                warnings.push(format!("Unknown log format '{}', using plain", logging.format));
            }
        }

        (warnings, errors)
    }
}

fn set_value_path(json: &mut serde_json::Value, path: &str, value: serde_json::Value) -> anyhow::Result<()> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        anyhow::bail!("Empty path");
    };

    let mut current = json;
    for segment in parents {
        let object = current
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("'{segment}' is not inside an object"))?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::json!({}));
    }
    let object = current
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("'{last}' is not inside an object"))?;
    object.insert(last.to_string(), value);
    Ok(())
}

/// Base directory for Blindchat data: `~/.blindchat/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".blindchat")
}
