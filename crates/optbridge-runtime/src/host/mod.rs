//! Host model
//!
//! The bridge talks to a dynamically-typed host through this module: values,
//! numeric arrays, callables, the host call stack, the pending-error flag and
//! the warning channel. All state is thread-local.
//!
//! Host callables report failure two ways, and both end in the pending-error
//! flag: returning `Err(HostException)`, or calling [`raise`] and returning
//! normally. Native code must therefore check [`error_occurred`] after every
//! call into the host rather than trusting the return value.

pub mod array;
pub mod exception;
pub mod value;

pub use array::{NdArray, Shape, ViewScope};
pub use exception::{Frame, HostException, HostWarning};
pub use value::{Callable, Dict, HostFn, HostObject, Value};

use std::cell::RefCell;

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
    static PENDING: RefCell<Option<HostException>> = RefCell::new(None);
    static WARNINGS: RefCell<Vec<HostWarning>> = RefCell::new(Vec::new());
}

/// Set the pending exception, replacing any previous one
///
/// An empty traceback is filled from the current host call stack.
pub fn raise(mut exception: HostException) {
    if exception.traceback.is_empty() {
        exception.traceback = call_stack();
    }
    PENDING.with(|p| *p.borrow_mut() = Some(exception));
}

/// True when an exception is pending
pub fn error_occurred() -> bool {
    PENDING.with(|p| p.borrow().is_some())
}

/// Take and clear the pending exception
pub fn take_error() -> Option<HostException> {
    PENDING.with(|p| p.borrow_mut().take())
}

pub fn clear_error() {
    PENDING.with(|p| *p.borrow_mut() = None);
}

/// Emit a warning towards the host
pub fn warn(category: &str, message: impl Into<String>) {
    let warning = HostWarning {
        category: category.to_string(),
        message: message.into(),
    };
    WARNINGS.with(|w| w.borrow_mut().push(warning));
}

/// Drain the warnings emitted so far
pub fn take_warnings() -> Vec<HostWarning> {
    WARNINGS.with(|w| std::mem::take(&mut *w.borrow_mut()))
}

/// Frames of the host functions currently executing, outermost first
pub fn call_stack() -> Vec<Frame> {
    FRAMES.with(|f| f.borrow().clone())
}

/// Resolve `value` to the function that calling it would run
///
/// Functions call themselves; objects call their `__call__` attribute.
pub fn resolve_callable(value: &Value) -> Option<Callable> {
    match value {
        Value::Function(c) => Some(c.clone()),
        Value::Object(o) => match o.get_attr("__call__") {
            Some(Value::Function(c)) => Some(c),
            _ => None,
        },
        _ => None,
    }
}

pub fn is_callable(value: &Value) -> bool {
    resolve_callable(value).is_some()
}

struct FrameGuard;

impl FrameGuard {
    fn push(callable: &Callable) -> Self {
        let frame = Frame {
            file: callable.file().to_string(),
            line: callable.line(),
            function: callable.name().to_string(),
        };
        FRAMES.with(|f| f.borrow_mut().push(frame));
        FrameGuard
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|f| {
            f.borrow_mut().pop();
        });
    }
}

/// Call a host value
///
/// Returns `None` when the call failed; the exception is then pending. A
/// callable can also leave an exception pending and still return a value.
pub fn call(target: &Value, args: &[Value]) -> Option<Value> {
    let Some(callable) = resolve_callable(target) else {
        raise(HostException::type_error(format!(
            "'{}' object is not callable",
            target.type_name()
        )));
        return None;
    };

    let _frame = FrameGuard::push(&callable);
    match callable.invoke(args) {
        Ok(value) => Some(value),
        Err(exception) => {
            raise(exception);
            None
        }
    }
}
