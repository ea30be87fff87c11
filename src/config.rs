//! WolfDrive Configuration
//!
//! This module provides configuration structures for the WolfDrive
//! storage gateway.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main WolfDrive configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WolfDriveConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Token broker configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Upload staging configuration
    #[serde(default)]
    pub staging: StagingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,

    /// Directory with the web client, served for unmatched paths
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

/// Token broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token lifetime in seconds (0 = tokens never expire)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Interval between expired-token sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Which storage backend implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One directory per account on the local filesystem
    #[default]
    Local,
    /// In-process node graph, lost on restart
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// An account the backend accepts
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Login identity
    pub email: String,

    /// Login secret
    pub password: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend implementation
    #[serde(default)]
    pub kind: BackendKind,

    /// Root directory holding one subdirectory per account (local backend)
    #[serde(default = "default_backend_root")]
    pub root: PathBuf,

    /// Session establishment timeout in seconds (0 = no limit)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upload completion timeout in seconds (0 = no limit)
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,

    /// Maximum wait for the next download chunk in seconds (0 = no limit)
    #[serde(default = "default_transfer_idle_timeout")]
    pub transfer_idle_timeout_secs: u64,

    /// Accounts accepted by the backend
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Upload staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Directory for staged upload files
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,

    /// Maximum accepted multipart body size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_token_ttl() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_backend_root() -> PathBuf {
    PathBuf::from("/var/lib/wolfdrive/accounts")
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_transfer_timeout() -> u64 {
    3600
}

fn default_transfer_idle_timeout() -> u64 {
    300
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("wolfdrive-staging")
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
            static_dir: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            root: default_backend_root(),
            connect_timeout_secs: default_connect_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
            transfer_idle_timeout_secs: default_transfer_idle_timeout(),
            accounts: Vec::new(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Convert a seconds setting where 0 means "unbounded"
fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl WolfDriveConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfDriveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(crate::Error::Config("server.bind_address cannot be empty".into()));
        }

        if self.auth.sweep_interval_secs == 0 {
            return Err(crate::Error::Config("auth.sweep_interval_secs must be positive".into()));
        }

        if self.backend.accounts.is_empty() {
            return Err(crate::Error::Config("backend.accounts must list at least one account".into()));
        }

        let mut seen = HashSet::new();
        for account in &self.backend.accounts {
            if account.email.trim().is_empty() || account.password.is_empty() {
                return Err(crate::Error::Config(
                    "backend.accounts entries need a non-empty email and password".into(),
                ));
            }
            if !seen.insert(account.email.to_lowercase()) {
                return Err(crate::Error::Config(format!(
                    "duplicate backend account: {}",
                    account.email
                )));
            }
        }

        if self.staging.dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("staging.dir cannot be empty".into()));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::Error::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Token lifetime, `None` when tokens never expire
    pub fn token_ttl(&self) -> Option<Duration> {
        optional_secs(self.auth.token_ttl_secs)
    }

    /// Get the sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.auth.sweep_interval_secs)
    }

    /// Backend connect timeout, `None` when unbounded
    pub fn connect_timeout(&self) -> Option<Duration> {
        optional_secs(self.backend.connect_timeout_secs)
    }

    /// Upload completion timeout, `None` when unbounded
    pub fn transfer_timeout(&self) -> Option<Duration> {
        optional_secs(self.backend.transfer_timeout_secs)
    }

    /// Download chunk idle timeout, `None` when unbounded
    pub fn transfer_idle_timeout(&self) -> Option<Duration> {
        optional_secs(self.backend.transfer_idle_timeout_secs)
    }
}
