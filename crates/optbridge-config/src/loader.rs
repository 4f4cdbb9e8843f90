//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::bridge::{BridgeConfig, EvaluationConfig, LoggingConfig, ParametersConfig};
use crate::settings::Settings;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// File name searched for when walking up from a start directory
pub const CONFIG_FILE_NAME: &str = "optbridge.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. User config (~/.optbridge/config.toml) - lowest priority
/// 2. Bridge config (./optbridge.toml) - overrides user config
/// 3. Environment variables (OPTBRIDGE_*) - overrides everything
pub struct ConfigLoader {
    /// Cached user config path
    user_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Merged configuration (user, then bridge file, then environment)
    pub merged: BridgeConfig,

    /// Directory where optbridge.toml was found
    pub config_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            user_config_path: None,
        }
    }

    /// Use an explicit user config file instead of ~/.optbridge/config.toml
    pub fn with_user_config(path: impl Into<PathBuf>) -> Self {
        Self {
            user_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find optbridge.toml, merges it over the
    /// user config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (config_root, bridge_config) = self.find_bridge_config(start_dir)?;
        self.assemble(config_root, bridge_config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let bridge_config = BridgeConfig::load_from_file(config_path)?;
        let config_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(config_root, bridge_config)
    }

    fn assemble(
        &mut self,
        config_root: Option<PathBuf>,
        bridge_config: BridgeConfig,
    ) -> ConfigResult<Config> {
        let mut merged = self.load_user_config().unwrap_or_default();
        merged.merge(&bridge_config);

        let merged = self.apply_env_overrides(merged)?;
        merged.validate()?;

        Ok(Config {
            merged,
            config_root,
        })
    }

    /// Find the bridge configuration by walking up the directory tree
    ///
    /// Returns (config_root, config); the default config when none is found
    fn find_bridge_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = BridgeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BridgeConfig::default())),
            }
        }
    }

    /// Load the user configuration; a missing file yields the default
    fn load_user_config(&mut self) -> ConfigResult<BridgeConfig> {
        let path = match &self.user_config_path {
            Some(path) => path.clone(),
            None => {
                let path = BridgeConfig::user_config_path()?;
                self.user_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(BridgeConfig::default());
        }

        BridgeConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// Recognized variables:
    /// - OPTBRIDGE_SOLVER: default solver plugin
    /// - OPTBRIDGE_FD_EPSILON: finite-difference step
    /// - OPTBRIDGE_STRICT_PARAMETERS: reject malformed parameter entries
    /// - OPTBRIDGE_LOG: comma-separated filter directives
    /// - OPTBRIDGE_LOG_ROOT: optimization logger root directory
    fn apply_env_overrides(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if let Ok(plugin) = env::var("OPTBRIDGE_SOLVER") {
            config
                .solver
                .get_or_insert_with(Default::default)
                .default_plugin = Some(plugin);
        }

        if let Ok(eps) = env::var("OPTBRIDGE_FD_EPSILON") {
            let value: f64 = eps.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "OPTBRIDGE_FD_EPSILON".to_string(),
                reason: format!("'{}' is not a number", eps),
            })?;
            config
                .evaluation
                .get_or_insert_with(EvaluationConfig::default)
                .finite_difference_epsilon = Some(value);
        }

        if let Ok(strict) = env::var("OPTBRIDGE_STRICT_PARAMETERS") {
            let strict_bool = matches!(strict.to_lowercase().as_str(), "true" | "1" | "yes");
            config
                .parameters
                .get_or_insert_with(ParametersConfig::default)
                .strict = Some(strict_bool);
        }

        if let Ok(directives) = env::var("OPTBRIDGE_LOG") {
            let directives: Vec<String> = directives
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
            config
                .logging
                .get_or_insert_with(LoggingConfig::default)
                .directives = Some(directives);
        }

        if let Ok(root) = env::var("OPTBRIDGE_LOG_ROOT") {
            config
                .logging
                .get_or_insert_with(LoggingConfig::default)
                .log_root = Some(PathBuf::from(root));
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Resolve into flat settings
    pub fn settings(&self) -> Settings {
        Settings::resolve(&self.merged, self.config_root.as_deref())
    }

    /// Directory where optbridge.toml was found
    pub fn config_root(&self) -> Option<&Path> {
        self.config_root.as_deref()
    }

    /// Whether a bridge config file was found
    pub fn has_config_file(&self) -> bool {
        self.config_root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FiniteDifferenceRule;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn loader_without_user_config(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::with_user_config(dir.path().join("no-such-user-config.toml"))
    }

    #[test]
    #[serial]
    fn test_load_bridge_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[evaluation]
finite_difference_rule = "five-points"
"#,
        );

        let mut loader = loader_without_user_config(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert!(config.has_config_file());
        assert_eq!(config.settings().fd_rule, FiniteDifferenceRule::FivePoints);
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[parameters]\nstrict = true\n");

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let mut loader = loader_without_user_config(&temp_dir);
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert!(config.settings().strict_parameters);
        assert_eq!(config.config_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_env_override_epsilon() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            "[evaluation]\nfinite_difference_epsilon = 1e-4\n",
        );

        env::set_var("OPTBRIDGE_FD_EPSILON", "1e-6");

        let mut loader = loader_without_user_config(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.settings().fd_epsilon, 1e-6);

        env::remove_var("OPTBRIDGE_FD_EPSILON");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_epsilon() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("OPTBRIDGE_FD_EPSILON", "tiny");

        let mut loader = loader_without_user_config(&temp_dir);
        let result = loader.load_from_directory(temp_dir.path());

        env::remove_var("OPTBRIDGE_FD_EPSILON");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
