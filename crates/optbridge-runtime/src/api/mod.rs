//! Host entry points
//!
//! Each entry point takes the raw host arguments and returns a host value.
//! Arity is checked by [`crate::module`] before they run; argument types are
//! checked here.

pub mod callbacks;
pub mod functions;
pub mod inspect;
pub mod problem;
pub mod solver;
pub mod state;

pub use callbacks::{LoggerObject, MultiplexerObject, SolverCallbackObject};
pub use functions::FunctionObject;
pub use problem::ProblemObject;
pub use solver::SolverObject;
pub use state::StateObject;

use crate::codec::FromHost;
use crate::errors::{BridgeError, BridgeResult};
use crate::host::{NdArray, Value};

/// Convert argument `index`, naming it in conversion errors
pub(crate) fn arg<T: FromHost>(args: &[Value], index: usize, name: &str) -> BridgeResult<T> {
    T::from_host(&args[index]).map_err(|e| match e {
        BridgeError::Conversion(msg) => {
            BridgeError::Conversion(format!("argument '{}': {}", name, msg))
        }
        other => other,
    })
}

/// Argument `index` unless it is missing or `None`
pub(crate) fn optional(args: &[Value], index: usize) -> Option<&Value> {
    args.get(index).filter(|v| !v.is_none())
}

pub(crate) fn array<'a>(args: &'a [Value], index: usize, name: &str) -> BridgeResult<&'a NdArray> {
    match &args[index] {
        Value::Array(array) => Ok(array),
        other => Err(BridgeError::Conversion(format!(
            "argument '{}': expected an ndarray, got '{}'",
            name,
            other.type_name()
        ))),
    }
}

/// A native object already borrowed by a running operation
pub(crate) fn busy(what: &str) -> BridgeError {
    BridgeError::Engine(format!("{} is in use by a running operation", what))
}
