//! optbridge runtime - host bridge for the optimization engine
//!
//! This library exposes the native engine to a dynamically-typed host:
//! - A registry of opaque handles with typed unwrapping
//! - Shared ownership between host values and native objects
//! - Conversion of numbers, strings, arrays and parameter dicts
//! - Dispatch of function evaluations and iteration callbacks to host callables
//! - Marshaling of solver outcomes into tagged handles and dicts
//!
//! The host model lives in [`host`]; the method table the host imports is
//! [`module::BridgeModule`]. Everything is single-threaded and reentrant.

/// optbridge runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod codec;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod glue;
pub mod host;
pub mod logging;
pub mod marshal;
pub mod module;
pub mod registry;

// Re-export commonly used types
pub use codec::{FromHost, ParameterReport, ToHost};
pub use context::{configure, settings, ExecutionToken};
pub use dispatch::{HostFunction, Slot};
pub use errors::{BridgeError, BridgeResult, HostCallbackError};
pub use glue::{Borrowed, HostRef, SharedRef};
pub use host::{Callable, HostException, NdArray, Shape, Value};
pub use module::{BridgeModule, Method, MethodBuilder};
pub use optbridge_config::Settings;
pub use registry::{Capsule, NativeObject, TypeTag};
