//! Ownership glue between native and host reference counting
//!
//! Native structures that keep a host object must keep its host reference
//! count raised for as long as they hold it. [`HostRef`] is one such hold:
//! acquiring it raises the count once, clones share the hold, and the count
//! drops once when the last clone goes away. [`SharedRef`] pairs a hold with
//! the native object the host value stands for, so it can be stored wherever
//! the native type is expected.
//!
//! [`Borrowed`] is the other direction: a native object taken from a host
//! argument for the duration of one call, with no hold at all.

use crate::errors::BridgeResult;
use crate::host::Value;
use crate::registry::{self, NativeObject};
use optbridge_engine::{EngineResult, Function, FunctionKind, IterationCallback, Problem, SolverState};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

struct Hold {
    owner: Value,
}

impl Drop for Hold {
    fn drop(&mut self) {
        tracing::trace!(owner = self.owner.type_name(), "host reference released");
    }
}

/// One host reference, shared by all clones
#[derive(Clone)]
pub struct HostRef(Rc<Hold>);

impl HostRef {
    /// Raise the host reference count of `owner` by one
    pub fn acquire(owner: &Value) -> Self {
        tracing::trace!(owner = owner.type_name(), "host reference acquired");
        HostRef(Rc::new(Hold {
            owner: owner.clone(),
        }))
    }

    pub fn value(&self) -> &Value {
        &self.0.owner
    }

    /// True when this hold is on `value` itself
    pub fn holds(&self, value: &Value) -> bool {
        self.0.owner.is(value)
    }

    /// Number of native copies sharing this hold
    pub fn copies(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostRef").field(&self.0.owner).finish()
    }
}

/// A native object kept together with one hold on its host owner
pub struct SharedRef<T: ?Sized> {
    native: Rc<T>,
    owner: HostRef,
}

impl<T: ?Sized> SharedRef<T> {
    /// Pair `native` with a new hold on `owner`
    pub fn acquire(native: Rc<T>, owner: &Value) -> Self {
        Self {
            native,
            owner: HostRef::acquire(owner),
        }
    }

    pub fn native(&self) -> &Rc<T> {
        &self.native
    }

    pub fn owner(&self) -> &Value {
        self.owner.value()
    }

    pub fn host_ref(&self) -> &HostRef {
        &self.owner
    }
}

impl<T: NativeObject> SharedRef<T> {
    /// Unwrap the handle `owner` and take a hold on it
    pub fn from_handle(owner: &Value) -> BridgeResult<Self> {
        let native = registry::unwrap::<T>(owner)?;
        Ok(Self::acquire(native, owner))
    }
}

impl<T: ?Sized> Clone for SharedRef<T> {
    fn clone(&self) -> Self {
        Self {
            native: Rc::clone(&self.native),
            owner: self.owner.clone(),
        }
    }
}

impl<T: ?Sized> Deref for SharedRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.native
    }
}

impl<T: Function + ?Sized> Function for SharedRef<T> {
    fn input_size(&self) -> usize {
        self.native.input_size()
    }

    fn output_size(&self) -> usize {
        self.native.output_size()
    }

    fn name(&self) -> &str {
        self.native.name()
    }

    fn kind(&self) -> FunctionKind {
        self.native.kind()
    }

    fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
        self.native.impl_compute(result, x)
    }

    fn impl_gradient(&self, gradient: &mut [f64], x: &[f64], function_id: usize) -> EngineResult<()> {
        self.native.impl_gradient(gradient, x, function_id)
    }

    fn impl_jacobian(&self, jacobian: &mut [f64], x: &[f64]) -> EngineResult<()> {
        self.native.impl_jacobian(jacobian, x)
    }

    fn print(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.native.print(f)
    }
}

impl<T: IterationCallback + ?Sized> IterationCallback for SharedRef<T> {
    fn on_iteration(&self, problem: &Problem, state: &mut SolverState) -> EngineResult<()> {
        self.native.on_iteration(problem, state)
    }
}

/// Native object borrowed from a host argument for one call
pub struct Borrowed<'a, T: ?Sized> {
    native: Rc<T>,
    owner: &'a Value,
}

impl<'a, T: NativeObject> Borrowed<'a, T> {
    pub fn from_value(value: &'a Value) -> BridgeResult<Self> {
        Ok(Self {
            native: registry::unwrap::<T>(value)?,
            owner: value,
        })
    }
}

impl<'a, T: ?Sized> Borrowed<'a, T> {
    pub fn owner(&self) -> &'a Value {
        self.owner
    }

    pub fn native(&self) -> &Rc<T> {
        &self.native
    }

    /// Keep the object beyond this call
    pub fn share(&self) -> SharedRef<T> {
        SharedRef::acquire(Rc::clone(&self.native), self.owner)
    }
}

impl<T: ?Sized> Deref for Borrowed<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.native
    }
}

/// Borrow argument `value` as a `T` for the current call
pub fn borrow<T: NativeObject>(value: &Value) -> BridgeResult<Borrowed<'_, T>> {
    Borrowed::from_value(value)
}
