//! Solver state handles
//!
//! A state handle is only handed to iteration callbacks and is revoked when
//! the callback returns. Edits made through it are what the solver sees next.

use super::{arg, busy};
use crate::codec::{self, FromHost, ToHost};
use crate::context;
use crate::errors::BridgeResult;
use crate::glue::borrow;
use crate::host::Value;
use crate::registry::{NativeObject, TypeTag};
use optbridge_engine::SolverState;
use std::cell::RefCell;

pub struct StateObject {
    state: RefCell<SolverState>,
}

impl NativeObject for StateObject {
    const TAG: TypeTag = TypeTag::SolverState;
}

impl StateObject {
    pub fn new(state: SolverState) -> Self {
        Self {
            state: RefCell::new(state),
        }
    }

    /// Move the state out, leaving an empty one
    pub fn take(&self) -> SolverState {
        self.state.take()
    }

    fn read<R>(&self, f: impl FnOnce(&SolverState) -> R) -> BridgeResult<R> {
        Ok(f(&*self.state.try_borrow().map_err(|_| busy("SolverState"))?))
    }

    fn write<R>(&self, f: impl FnOnce(&mut SolverState) -> R) -> BridgeResult<R> {
        Ok(f(&mut *self.state.try_borrow_mut().map_err(|_| busy("SolverState"))?))
    }
}

fn optional_real(value: Option<f64>) -> Value {
    value.map_or(Value::None, Value::Float)
}

/// Copy of the current iterate
pub fn get_solver_state_x(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    s.read(|state| state.x.to_host())
}

pub fn set_solver_state_x(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    let x: Vec<f64> = arg(args, 1, "x")?;
    s.write(|state| state.x = x)?;
    Ok(Value::None)
}

pub fn get_solver_state_cost(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    s.read(|state| optional_real(state.cost))
}

pub fn set_solver_state_cost(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    let cost = match &args[1] {
        Value::None => None,
        value => Some(f64::from_host(value)?),
    };
    s.write(|state| state.cost = cost)?;
    Ok(Value::None)
}

pub fn get_solver_state_constraint_violation(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    s.read(|state| optional_real(state.constraint_violation))
}

pub fn set_solver_state_constraint_violation(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    let violation = match &args[1] {
        Value::None => None,
        value => Some(f64::from_host(value)?),
    };
    s.write(|state| state.constraint_violation = violation)?;
    Ok(Value::None)
}

pub fn get_solver_state_parameters(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    s.read(|state| codec::state_parameters_to_host(&state.parameters))
}

/// `setSolverStateParameters(state, dict)`; replaces the whole map
pub fn set_solver_state_parameters(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    let strict = context::settings().strict_parameters;
    let (parameters, report) = codec::state_parameters_from_host(&args[1], strict)?;
    s.write(|state| state.parameters = parameters)?;
    Ok(report.to_host())
}

pub fn str_solver_state(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<StateObject>(&args[0])?;
    s.read(|state| Value::str(&state.to_string()))
}
