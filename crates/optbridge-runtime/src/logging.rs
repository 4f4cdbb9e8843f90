//! Log subscriber setup
//!
//! The bridge only emits `tracing` events. Embedders that want them printed
//! call [`init`] once with the resolved settings.

use optbridge_config::Settings;
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log directive '{directives}': {reason}")]
    InvalidFilter { directives: String, reason: String },
}

/// Filter for `settings`; a set `RUST_LOG` takes precedence
pub fn filter(settings: &Settings) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = settings.log_directives.join(",");
    EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter {
        directives,
        reason: e.to_string(),
    })
}

/// Install the global subscriber
///
/// Returns `Ok(false)` when a subscriber was already installed, by this
/// function or by the embedding application.
pub fn init(settings: &Settings) -> Result<bool, LoggingError> {
    let filter = filter(settings)?;
    let layer = fmt::layer()
        .with_target(true)
        .with_ansi(settings.log_ansi)
        .with_writer(std::io::stderr);
    match Registry::default().with(layer).with(filter).try_init() {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::debug!(error = %e, "log subscriber already installed");
            Ok(false)
        }
    }
}
