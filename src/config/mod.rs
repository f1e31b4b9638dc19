// Configuration management module
// TOML settings with validation, stored under the application base directory

pub mod settings;

pub use settings::{Config, ConfigError, IngestConfig, OllamaConfig, QueryConfig, WikiConfig};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_base_dir()
}
