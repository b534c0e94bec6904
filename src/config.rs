use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::platform::lock::DEFAULT_LOCK_FILE;

/// Agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub vault: VaultConfig,

    /// File the secret is mirrored into
    pub output_file: PathBuf,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vault connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultConfig {
    /// Falls back to `VAULT_ADDR`
    #[serde(default = "default_vault_address")]
    pub address: String,

    /// Falls back to `VAULT_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Path as used by the HTTP API, e.g. `secret/data/myapp` for KV v2
    pub secret_path: String,

    /// Vault Enterprise namespace (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Agent settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    /// How often to check for changes (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Delay after a failed fetch (seconds)
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,

    /// Random jitter added to every delay (seconds)
    #[serde(default)]
    pub poll_jitter: u64,

    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    /// Also set every secret key as an environment variable of the agent
    #[serde(default = "default_export_env")]
    pub export_env: bool,

    /// Permissions of the output file (Unix only)
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Default values
fn default_vault_address() -> String {
    std::env::var("VAULT_ADDR").unwrap_or_default()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_retry_interval() -> u64 {
    10
}

fn default_lock_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_FILE)
}

fn default_export_env() -> bool {
    true
}

fn default_file_mode() -> u32 {
    0o600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            retry_interval: default_retry_interval(),
            poll_jitter: 0,
            lock_file: default_lock_file(),
            export_env: default_export_env(),
            file_mode: default_file_mode(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

impl AgentConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_str_with_format(&content, ConfigFormat::from_path(path))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Validate config
        config.validate()?;

        Ok(config)
    }

    fn from_str_with_format(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: AgentConfig = match format {
            ConfigFormat::Toml => toml::from_str(content).context("Invalid TOML")?,
            ConfigFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML")?,
            ConfigFormat::Json => serde_json::from_str(content).context("Invalid JSON")?,
        };
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.vault.address.trim().is_empty() {
            anyhow::bail!("Vault address is required (set vault.address or VAULT_ADDR)");
        }

        url::Url::parse(&self.vault.address)
            .with_context(|| format!("Invalid Vault address: {}", self.vault.address))?;

        self.vault.resolved_token()?;

        if self.vault.secret_path.trim().is_empty() {
            anyhow::bail!("vault.secret_path must not be empty");
        }

        if self.output_file.as_os_str().is_empty() {
            anyhow::bail!("output_file must not be empty");
        }

        if self.agent.poll_interval == 0 {
            anyhow::bail!("Poll interval must be at least 1 second");
        }

        if self.agent.retry_interval == 0 {
            anyhow::bail!("Retry interval must be at least 1 second");
        }

        if self.agent.file_mode > 0o777 {
            anyhow::bail!("file_mode must be a permission mode such as 0o600 (got: {:o})", self.agent.file_mode);
        }

        Ok(())
    }
}

impl VaultConfig {
    /// Token from the config file, or `VAULT_TOKEN`
    pub fn resolved_token(&self) -> Result<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("VAULT_TOKEN").ok().filter(|t| !t.trim().is_empty()))
            .context("Vault token is required (set vault.token or VAULT_TOKEN)")
    }
}
