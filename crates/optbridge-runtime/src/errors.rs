//! Bridge errors
//!
//! [`BridgeError`] is what entry points fail with. Each variant maps to a host
//! exception class. Errors that happen below a native call site that cannot
//! return a `BridgeError` (function evaluations invoked by a solver) are
//! parked on a thread-local deferred channel with [`report`] and raised by
//! the entry point that started the evaluation.

use crate::host::{Frame, HostException};
use optbridge_engine::EngineError;
use std::cell::RefCell;
use std::fmt;
use thiserror::Error;

/// A host exception surfaced through a native evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct HostCallbackError {
    pub class: String,
    pub message: String,
    pub traceback: Vec<Frame>,
}

impl From<HostException> for HostCallbackError {
    fn from(e: HostException) -> Self {
        Self {
            class: e.class,
            message: e.message,
            traceback: e.traceback,
        }
    }
}

impl fmt::Display for HostCallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Error occurred in host code: {}: {}",
            self.class, self.message
        )?;
        writeln!(f, "Host stack trace:")?;
        for frame in &self.traceback {
            writeln!(f, "    {}", frame)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("{expected} object expected but another type was passed")]
    TypeMismatch { expected: String, found: String },

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("{0} callback not set")]
    CallbackNotSet(String),

    #[error("Shape mismatch for {what}: expected {expected}, got {found}")]
    ShapeMismatch {
        what: String,
        expected: String,
        found: String,
    },

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Failed to construct {what}: {reason}")]
    ConstructionFailure { what: String, reason: String },

    #[error("{0}")]
    HostCallback(HostCallbackError),

    #[error("No solution: the solver has not been run")]
    NoSolution,

    #[error("{name}() takes {expected} arguments ({found} given)")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A host exception raised while the bridge manipulated host values
    #[error("{0}")]
    Host(HostException),

    #[error("{0}")]
    Engine(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn shape(what: impl Into<String>, expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        BridgeError::ShapeMismatch {
            what: what.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Host exception class this error is raised as
    pub fn exception_class(&self) -> &str {
        match self {
            BridgeError::TypeMismatch { .. }
            | BridgeError::NotCallable(_)
            | BridgeError::CallbackNotSet(_)
            | BridgeError::Arity { .. } => "TypeError",
            BridgeError::ShapeMismatch { .. } | BridgeError::Conversion(_) => "ValueError",
            BridgeError::IndexOutOfRange { .. } => "IndexError",
            BridgeError::Host(e) => &e.class,
            BridgeError::ConstructionFailure { .. }
            | BridgeError::HostCallback(_)
            | BridgeError::NoSolution
            | BridgeError::Engine(_) => "RuntimeError",
        }
    }

    pub fn to_exception(&self) -> HostException {
        match self {
            BridgeError::Host(e) => e.clone(),
            other => HostException::new(other.exception_class(), other.to_string()),
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::SizeMismatch {
                what,
                expected,
                found,
            } => BridgeError::shape(what, expected, found),
            EngineError::NotDifferentiable(name) => {
                BridgeError::type_mismatch("DifferentiableFunction", name)
            }
            EngineError::IndexOutOfRange { index, len } => {
                BridgeError::IndexOutOfRange { index, len }
            }
            EngineError::UnknownPlugin(name) => BridgeError::ConstructionFailure {
                what: "solver".to_string(),
                reason: format!("unknown solver plugin '{}'", name),
            },
            other => BridgeError::Engine(other.to_string()),
        }
    }
}

impl From<HostException> for BridgeError {
    fn from(e: HostException) -> Self {
        BridgeError::Host(e)
    }
}

thread_local! {
    static DEFERRED: RefCell<Option<BridgeError>> = RefCell::new(None);
}

/// Park an error for the entry point that started the current evaluation
///
/// The first error reported wins; later ones are consequences of it.
pub fn report(error: BridgeError) {
    tracing::debug!(error = %error, "error reported on deferred channel");
    DEFERRED.with(|d| {
        let mut slot = d.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
    });
}

/// Take the parked error, if any
pub fn take_reported() -> Option<BridgeError> {
    DEFERRED.with(|d| d.borrow_mut().take())
}
