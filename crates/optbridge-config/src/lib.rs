//! optbridge configuration
//!
//! Provides configuration for the optimization bridge:
//! - Bridge configuration (optbridge.toml)
//! - User configuration (~/.optbridge/config.toml)
//! - Environment overrides (OPTBRIDGE_*)
//! - Resolution into a flat [`Settings`] snapshot
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. User config (~/.optbridge/config.toml)
//! 2. Bridge config (./optbridge.toml, searched upwards)
//! 3. Environment variables (OPTBRIDGE_*)
//!
//! # Example
//!
//! ```no_run
//! use optbridge_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! let settings = config.settings();
//! assert!(settings.fd_epsilon > 0.0);
//! ```

pub mod bridge;
pub mod loader;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use bridge::{
    BridgeConfig, EvaluationConfig, FiniteDifferenceRule, LoggingConfig, ParametersConfig,
    SolverConfig,
};
pub use loader::{Config, ConfigLoader, CONFIG_FILE_NAME};
pub use settings::Settings;
