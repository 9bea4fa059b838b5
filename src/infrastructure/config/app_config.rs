//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::args::CliArgs;
use crate::infrastructure::connectivity::DEFAULT_PROBE_TIMEOUT;

pub(crate) const APP_NAME: &str = "fieldsync";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "fieldsync";

/// Environment variable that overrides `remote.api_key`.
pub const API_KEY_ENV: &str = "FIELDSYNC_API_KEY";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Top-level configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Root directory for the thumbnail cache and upload queue.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Backend endpoint and credentials.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Thumbnail cache limits.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upload retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Reachability polling.
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

/// Backend configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the hosted backend.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Storage bucket that receives photos.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Anonymous API key. Prefer the environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_url", &self.api_url)
            .field("bucket", &self.bucket)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            bucket: default_bucket(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteConfig {
    /// Picks the API key, preferring `env_value` over the file.
    #[must_use]
    pub fn resolve_api_key(&self, env_value: Option<String>) -> Option<String> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }
}

/// Thumbnail cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disk quota across all cached variants.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,

    /// Entries kept in the in-memory tier.
    #[serde(default = "default_memory_entries")]
    pub memory_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota_bytes(),
            memory_entries: default_memory_entries(),
        }
    }
}

/// Upload retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before an upload is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of random extra delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

/// Connectivity monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// URL probed for reachability. Defaults to the API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,

    /// Time between reachability checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a changed reading must hold before it is reported.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Timeout of a single check.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_bucket() -> String {
    "photos".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_quota_bytes() -> u64 {
    50 * 1024 * 1024
}

const fn default_memory_entries() -> usize {
    64
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_delay_ms() -> u64 {
    2_000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

const fn default_jitter_ms() -> u64 {
    500
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_debounce_ms() -> u64 {
    2_000
}

#[allow(clippy::cast_possible_truncation)]
const fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(data_dir) = &args.data_dir {
            self.data_dir = Some(data_dir.clone());
        }
        if let Some(api_url) = &args.api_url {
            self.remote.api_url.clone_from(api_url);
        }
        if let Some(bucket) = &args.bucket {
            self.remote.bucket.clone_from(bucket);
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default data directory.
    #[must_use]
    pub fn default_data_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective data directory.
    #[must_use]
    pub fn effective_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(Self::default_data_dir)
    }

    /// Directory of the persistent thumbnail cache.
    #[must_use]
    pub fn thumbnails_dir(&self) -> Option<PathBuf> {
        self.effective_data_dir().map(|dir| dir.join("thumbnails"))
    }

    /// Directory of the pending-upload store.
    #[must_use]
    pub fn queue_dir(&self) -> Option<PathBuf> {
        self.effective_data_dir().map(|dir| dir.join("queue"))
    }

    /// URL the reachability probe hits.
    #[must_use]
    pub fn probe_url(&self) -> String {
        self.connectivity
            .probe_url
            .clone()
            .unwrap_or_else(|| self.remote.api_url.clone())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            data_dir: None,
            remote: RemoteConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            connectivity: ConnectivityConfig::default(),
        }
    }
}
