//! Bridge configuration file (optbridge.toml)
//!
//! The same schema is used for the user-level file in `~/.optbridge/config.toml`.
//! Every field is optional; unset fields fall back to [`crate::Settings`] defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of an optbridge.toml file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Solver defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverConfig>,

    /// Evaluation settings (finite differences)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationConfig>,

    /// Parameter map handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParametersConfig>,

    /// Logging settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Solver defaults applied when a solver is created
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    /// Plugin used when the host does not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_plugin: Option<String>,

    /// Iteration limit for iterative plugins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Convergence tolerance on the gradient norm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,

    /// Fixed step size for descent plugins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_size: Option<f64>,
}

/// Finite-difference settings used for default jacobians and gradient wrappers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EvaluationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finite_difference_epsilon: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finite_difference_rule: Option<FiniteDifferenceRule>,
}

/// Finite-difference rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FiniteDifferenceRule {
    /// Forward difference, one extra evaluation per variable
    #[default]
    Simple,
    /// Five-point stencil, four extra evaluations per variable
    FivePoints,
}

/// Parameter map handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ParametersConfig {
    /// Reject malformed entries in bulk parameter maps instead of skipping them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `["info", "optbridge_runtime::dispatch=trace"]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directives: Option<Vec<String>>,

    /// Colored output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ansi: Option<bool>,

    /// Root directory for optimization logger output given as a relative path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_root: Option<PathBuf>,
}

impl BridgeConfig {
    /// Load a configuration file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(evaluation) = &self.evaluation {
            if let Some(eps) = evaluation.finite_difference_epsilon {
                validate_positive("evaluation.finite_difference_epsilon", eps)?;
            }
        }

        if let Some(solver) = &self.solver {
            if let Some(tolerance) = solver.tolerance {
                validate_positive("solver.tolerance", tolerance)?;
            }
            if let Some(step) = solver.step_size {
                validate_positive("solver.step_size", step)?;
            }
            if solver.max_iterations == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "solver.max_iterations".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            if let Some(plugin) = &solver.default_plugin {
                if plugin.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "solver.default_plugin".to_string(),
                        reason: "plugin name cannot be empty".to_string(),
                    });
                }
            }
        }

        if let Some(logging) = &self.logging {
            if let Some(directives) = &logging.directives {
                if directives.iter().any(|d| d.trim().is_empty()) {
                    return Err(ConfigError::ValidationError(
                        "logging.directives cannot contain empty entries".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Merge another config into this one.
    /// Other config takes precedence for non-None values, field by field.
    pub fn merge(&mut self, other: &BridgeConfig) {
        if let Some(o) = &other.solver {
            let s = self.solver.get_or_insert_with(Default::default);
            merge_opt(&mut s.default_plugin, &o.default_plugin);
            merge_opt(&mut s.max_iterations, &o.max_iterations);
            merge_opt(&mut s.tolerance, &o.tolerance);
            merge_opt(&mut s.step_size, &o.step_size);
        }
        if let Some(o) = &other.evaluation {
            let e = self.evaluation.get_or_insert_with(Default::default);
            merge_opt(
                &mut e.finite_difference_epsilon,
                &o.finite_difference_epsilon,
            );
            merge_opt(&mut e.finite_difference_rule, &o.finite_difference_rule);
        }
        if let Some(o) = &other.parameters {
            let p = self.parameters.get_or_insert_with(Default::default);
            merge_opt(&mut p.strict, &o.strict);
        }
        if let Some(o) = &other.logging {
            let l = self.logging.get_or_insert_with(Default::default);
            merge_opt(&mut l.directives, &o.directives);
            merge_opt(&mut l.ansi, &o.ansi);
            merge_opt(&mut l.log_root, &o.log_root);
        }
    }

    /// Path of the user-level configuration file (~/.optbridge/config.toml)
    pub fn user_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".optbridge").join("config.toml"))
    }
}

fn merge_opt<T: Clone>(target: &mut Option<T>, other: &Option<T>) {
    if other.is_some() {
        *target = other.clone();
    }
}

fn validate_positive(field: &str, value: f64) -> ConfigResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be a positive finite number, got {}", value),
        });
    }
    Ok(())
}
