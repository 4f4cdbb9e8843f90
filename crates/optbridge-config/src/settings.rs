//! Resolved settings
//!
//! [`Settings`] is the flat view the runtime reads. It is derived from a merged
//! [`BridgeConfig`] with every unset field replaced by its default.

use crate::bridge::{BridgeConfig, FiniteDifferenceRule};
use std::path::PathBuf;

/// Default finite-difference step
pub const DEFAULT_FD_EPSILON: f64 = 1e-8;

/// Flat, fully-resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_plugin: String,
    pub max_iterations: Option<u32>,
    pub tolerance: Option<f64>,
    pub step_size: Option<f64>,
    pub fd_epsilon: f64,
    pub fd_rule: FiniteDifferenceRule,
    pub strict_parameters: bool,
    pub log_directives: Vec<String>,
    pub log_ansi: bool,
    /// Absolute when the config file was found, relative otherwise
    pub log_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_plugin: "gradient-descent".to_string(),
            max_iterations: None,
            tolerance: None,
            step_size: None,
            fd_epsilon: DEFAULT_FD_EPSILON,
            fd_rule: FiniteDifferenceRule::Simple,
            strict_parameters: false,
            log_directives: vec!["warn".to_string()],
            log_ansi: true,
            log_root: None,
        }
    }
}

impl Settings {
    /// Resolve a merged configuration. Relative `log_root` paths are anchored at `root`.
    pub fn resolve(config: &BridgeConfig, root: Option<&std::path::Path>) -> Self {
        let mut settings = Settings::default();

        if let Some(solver) = &config.solver {
            if let Some(plugin) = &solver.default_plugin {
                settings.default_plugin = plugin.clone();
            }
            settings.max_iterations = solver.max_iterations;
            settings.tolerance = solver.tolerance;
            settings.step_size = solver.step_size;
        }

        if let Some(evaluation) = &config.evaluation {
            if let Some(eps) = evaluation.finite_difference_epsilon {
                settings.fd_epsilon = eps;
            }
            if let Some(rule) = evaluation.finite_difference_rule {
                settings.fd_rule = rule;
            }
        }

        if let Some(strict) = config.parameters.as_ref().and_then(|p| p.strict) {
            settings.strict_parameters = strict;
        }

        if let Some(logging) = &config.logging {
            if let Some(directives) = &logging.directives {
                settings.log_directives = directives.clone();
            }
            if let Some(ansi) = logging.ansi {
                settings.log_ansi = ansi;
            }
            settings.log_root = logging.log_root.as_ref().map(|path| match root {
                Some(root) if path.is_relative() => root.join(path),
                _ => path.clone(),
            });
        }

        settings
    }
}
