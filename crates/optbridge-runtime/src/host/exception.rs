//! Host exceptions and warnings

use std::fmt;
use thiserror::Error;

/// One entry of a host traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}): {}", self.file, self.line, self.function)
    }
}

/// An exception raised in host code
///
/// `traceback` lists frames outermost first. It is filled from the host call
/// stack the first time the exception is observed by [`super::call`] or
/// [`super::raise`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{class}: {message}")]
pub struct HostException {
    pub class: String,
    pub message: String,
    pub traceback: Vec<Frame>,
}

impl HostException {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            traceback: Vec::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }
}

/// A warning emitted towards the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostWarning {
    pub category: String,
    pub message: String,
}
