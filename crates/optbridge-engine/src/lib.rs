//! optbridge engine - native optimization objects
//!
//! This library provides the native side driven by the bridge:
//! - Functions with compute, gradient and jacobian evaluation
//! - Finite-difference gradients and function pools
//! - Problems with bounds, scales and constraints
//! - Parameter maps and solver state
//! - Solver plugins, outcomes and iteration callbacks
//!
//! Everything here is single-threaded: shared data uses `Rc` and `RefCell`.

pub mod callback;
pub mod finite_difference;
pub mod function;
pub mod outcome;
pub mod parameter;
pub mod plugins;
pub mod pool;
pub mod problem;
pub mod solver;
pub mod state;

use thiserror::Error;

/// Errors raised by native engine objects
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Size mismatch for {what}: expected {expected}, got {found}")]
    SizeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("Function '{0}' is not differentiable")]
    NotDifferentiable(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown solver plugin '{0}'")]
    UnknownPlugin(String),

    #[error("Iteration callback failed: {0}")]
    Callback(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Fail with `SizeMismatch` unless `found == expected`
pub fn check_size(what: &str, expected: usize, found: usize) -> EngineResult<()> {
    if expected != found {
        return Err(EngineError::SizeMismatch {
            what: what.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Format a vector as `[a, b, c]`
pub fn format_vector(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

// Re-export commonly used types
pub use callback::{IterationCallback, IterationRecord, Multiplexer, OptimizationLogger};
pub use finite_difference::{FiniteDifferenceGradient, FiniteDifferenceRule, DEFAULT_EPSILON};
pub use function::{Function, FunctionKind};
pub use outcome::{OptimResult, ResultWithWarnings, SolverError, SolverOutcome};
pub use parameter::{
    Parameter, ParameterValue, Parameters, SharedVector, StateParameter, StateParameterValue,
    StateParameters,
};
pub use pool::FunctionPool;
pub use problem::{Constraint, Interval, Problem};
pub use solver::{Solver, SolverFactory, SolverPlugin};
pub use state::SolverState;
