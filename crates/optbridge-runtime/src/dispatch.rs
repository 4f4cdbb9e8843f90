//! Host-backed functions
//!
//! A [`HostFunction`] is a native [`Function`] whose evaluations call host
//! callables bound to its compute, gradient and jacobian slots. Every call
//! follows the same protocol:
//!
//! 1. the slot must be bound and still callable; otherwise the failure is
//!    reported on the deferred channel and the evaluation returns an engine
//!    error without touching the buffers
//! 2. native buffers are lent to the host as array views (output writable,
//!    input read-only, jacobian as an `m x n` matrix)
//! 3. after the call the host pending-error flag is checked explicitly; a
//!    pending exception becomes a `HostCallback` error
//! 4. the views are invalidated when the call returns, on every path
//!
//! An unbound jacobian is not an error: it falls back to finite differences
//! over compute.

use crate::context;
use crate::errors::{self, BridgeError, BridgeResult, HostCallbackError};
use crate::glue::HostRef;
use crate::host::{self, Shape, Value, ViewScope};
use optbridge_engine::{finite_difference, EngineError, EngineResult, Function, FunctionKind, FiniteDifferenceRule};
use std::cell::RefCell;
use std::fmt;

/// Evaluation slot of a host function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Compute,
    Gradient,
    Jacobian,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::Compute => "compute",
            Slot::Gradient => "gradient",
            Slot::Jacobian => "jacobian",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct HostFunction {
    kind: FunctionKind,
    input_size: usize,
    output_size: usize,
    name: String,
    compute: RefCell<Option<HostRef>>,
    gradient: RefCell<Option<HostRef>>,
    jacobian: RefCell<Option<HostRef>>,
}

impl HostFunction {
    pub fn new(kind: FunctionKind, input_size: usize, output_size: usize, name: impl Into<String>) -> Self {
        Self {
            kind,
            input_size,
            output_size,
            name: name.into(),
            compute: RefCell::new(None),
            gradient: RefCell::new(None),
            jacobian: RefCell::new(None),
        }
    }

    fn slot(&self, slot: Slot) -> &RefCell<Option<HostRef>> {
        match slot {
            Slot::Compute => &self.compute,
            Slot::Gradient => &self.gradient,
            Slot::Jacobian => &self.jacobian,
        }
    }

    /// Bind `callable` to `slot`
    ///
    /// Rebinding the object already bound does nothing. Binding another
    /// object releases the previous one.
    pub fn bind(&self, slot: Slot, callable: &Value) -> BridgeResult<()> {
        if !host::is_callable(callable) {
            return Err(BridgeError::NotCallable(format!(
                "{} callback of type '{}'",
                slot,
                callable.type_name()
            )));
        }
        if slot != Slot::Compute && !self.kind.is_differentiable() {
            return Err(BridgeError::type_mismatch(
                FunctionKind::Differentiable.label(),
                self.kind.label(),
            ));
        }

        let previous = {
            let mut cell = self
                .slot(slot)
                .try_borrow_mut()
                .map_err(|_| BridgeError::Engine(format!("{} slot is in use", slot)))?;
            if cell.as_ref().map_or(false, |bound| bound.holds(callable)) {
                return Ok(());
            }
            cell.replace(HostRef::acquire(callable))
        };
        tracing::debug!(function = %self.name, slot = slot.name(), "callback bound");
        // The old hold may be the last reference to host objects whose release re-enters the bridge.
        drop(previous);
        Ok(())
    }

    /// The host object bound to `slot`
    pub fn bound(&self, slot: Slot) -> Option<Value> {
        self.slot(slot).borrow().as_ref().map(|h| h.value().clone())
    }

    fn callable(&self, slot: Slot) -> EngineResult<Value> {
        let bound = self.slot(slot).borrow().clone();
        let Some(bound) = bound else {
            return Err(fail(BridgeError::CallbackNotSet(slot.name().to_string())));
        };
        if !host::is_callable(bound.value()) {
            return Err(fail(BridgeError::NotCallable(format!(
                "{} callback of '{}'",
                slot,
                self.display_name()
            ))));
        }
        Ok(bound.value().clone())
    }

    fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unnamed function"
        } else {
            &self.name
        }
    }

    fn invoke(
        &self,
        slot: Slot,
        out: &mut [f64],
        out_shape: Shape,
        x: &[f64],
        function_id: Option<usize>,
    ) -> EngineResult<()> {
        let callable = self.callable(slot)?;
        tracing::trace!(function = %self.name, slot = slot.name(), "dispatching to host");

        ViewScope::scoped(|scope| {
            let out = out;
            let mut args = vec![
                Value::Array(scope.writable(out, out_shape)),
                Value::Array(scope.read_only(x, Shape::Vector(x.len()))),
            ];
            if let Some(id) = function_id {
                args.push(Value::Int(id as i64));
            }
            host::call(&callable, &args);
        });

        check_host_error()
    }
}

/// Report `error` on the deferred channel and return the engine error the evaluation fails with
fn fail(error: BridgeError) -> EngineError {
    let message = error.to_string();
    errors::report(error);
    EngineError::Evaluation(message)
}

/// Turn a pending host exception into an evaluation failure
pub(crate) fn check_host_error() -> EngineResult<()> {
    match host::take_error() {
        None => Ok(()),
        Some(exception) => {
            let error = HostCallbackError::from(exception);
            tracing::debug!(class = %error.class, message = %error.message, "host callback raised");
            Err(fail(BridgeError::HostCallback(error)))
        }
    }
}

impl Function for HostFunction {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FunctionKind {
        self.kind
    }

    fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
        self.invoke(Slot::Compute, result, Shape::Vector(self.output_size), x, None)
    }

    fn impl_gradient(&self, gradient: &mut [f64], x: &[f64], function_id: usize) -> EngineResult<()> {
        if !self.kind.is_differentiable() {
            return Err(EngineError::NotDifferentiable(self.name.clone()));
        }
        self.invoke(
            Slot::Gradient,
            gradient,
            Shape::Vector(self.input_size),
            x,
            Some(function_id),
        )
    }

    fn impl_jacobian(&self, jacobian: &mut [f64], x: &[f64]) -> EngineResult<()> {
        if !self.kind.is_differentiable() {
            return Err(EngineError::NotDifferentiable(self.name.clone()));
        }
        if self.jacobian.borrow().is_some() {
            let shape = Shape::Matrix(self.output_size, self.input_size);
            return self.invoke(Slot::Jacobian, jacobian, shape, x, None);
        }

        let settings = context::settings();
        match context::fd_rule() {
            FiniteDifferenceRule::Simple => {
                finite_difference::forward_jacobian(self, jacobian, x, settings.fd_epsilon)
            }
            rule => {
                let n = self.input_size;
                for (row, chunk) in jacobian.chunks_mut(n.max(1)).enumerate().take(self.output_size) {
                    finite_difference::gradient(self, rule, chunk, x, row, settings.fd_epsilon)?;
                }
                Ok(())
            }
        }
    }
}
