//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{
    API_KEY_ENV, AppConfig, CacheConfig, ConnectivityConfig, LogLevel, RemoteConfig, RetryConfig,
};
pub use args::{CliArgs, Command};
pub use storage::{ConfigError, StorageManager};
