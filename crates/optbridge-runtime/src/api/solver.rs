//! Solver handles

use super::{arg, busy};
use crate::api::problem::ProblemObject;
use crate::codec::{self, FromHost, ToHost};
use crate::context;
use crate::errors::{BridgeError, BridgeResult};
use crate::glue::borrow;
use crate::host::{self, Value};
use crate::marshal;
use crate::registry::{self, NativeObject, TypeTag};
use optbridge_config::Settings;
use optbridge_engine::{Parameter, ParameterValue, Solver, SolverFactory};
use std::cell::RefCell;
use std::rc::Rc;

pub struct SolverObject {
    solver: RefCell<Solver>,
}

impl NativeObject for SolverObject {
    const TAG: TypeTag = TypeTag::Solver;
}

impl SolverObject {
    pub fn new(solver: Solver) -> Self {
        Self {
            solver: RefCell::new(solver),
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Solver) -> R) -> BridgeResult<R> {
        Ok(f(&*self.solver.try_borrow().map_err(|_| busy("Solver"))?))
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Solver) -> R) -> BridgeResult<R> {
        Ok(f(&mut *self.solver.try_borrow_mut().map_err(|_| busy("Solver"))?))
    }

    /// Mutable access if the solver is idle
    pub(crate) fn try_write<R>(&self, f: impl FnOnce(&mut Solver) -> R) -> Option<R> {
        self.solver.try_borrow_mut().ok().map(|mut s| f(&mut s))
    }
}

/// Override plugin defaults with configured values, for keys the plugin knows
fn apply_configured_defaults(solver: &mut Solver, settings: &Settings) {
    let overrides = [
        (
            "max-iterations",
            settings
                .max_iterations
                .map(|n| ParameterValue::Int(i32::try_from(n).unwrap_or(i32::MAX))),
        ),
        ("tolerance", settings.tolerance.map(ParameterValue::Real)),
        ("step-size", settings.step_size.map(ParameterValue::Real)),
    ];
    for (key, value) in overrides {
        let Some(value) = value else { continue };
        let Some(description) = solver.parameters().get(key).map(|p| p.description.clone()) else {
            continue;
        };
        solver.set_parameter(key, Parameter::new(description, value));
    }
}

/// `Solver([plugin,] problem)`
///
/// Returns `None` when the solver cannot be constructed; the reason is
/// logged and emitted as a host warning.
pub fn solver(args: &[Value]) -> BridgeResult<Value> {
    let settings = context::settings();
    let (plugin, problem) = match args {
        [problem] => (settings.default_plugin.clone(), problem),
        [plugin, problem] if plugin.is_none() => (settings.default_plugin.clone(), problem),
        [plugin, problem] => (String::from_host(plugin)?, problem),
        _ => {
            return Err(BridgeError::Arity {
                name: "Solver".to_string(),
                expected: "1 to 2".to_string(),
                found: args.len(),
            })
        }
    };
    let problem = borrow::<ProblemObject>(problem)?.snapshot()?;

    let mut solver = match SolverFactory::create(&plugin, &problem) {
        Ok(solver) => solver,
        Err(e) => {
            let reason = BridgeError::from(e);
            tracing::warn!(plugin = %plugin, error = %reason, "solver construction failed");
            host::warn("RuntimeWarning", reason.to_string());
            return Ok(Value::None);
        }
    };
    apply_configured_defaults(&mut solver, &settings);
    Ok(registry::wrap_value(Rc::new(SolverObject::new(solver))))
}

/// `solve(solver)`
pub fn solve(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<SolverObject>(&args[0])?;
    let status = s.write(|solver| solver.solve().status())?;
    tracing::debug!(status, "solve returned");
    Ok(Value::None)
}

/// `minimum(solver)` as `(tag, handle)`
pub fn minimum(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<SolverObject>(&args[0])?;
    s.read(|solver| marshal::outcome_to_host(solver.minimum()))?
}

pub fn get_solver_parameters(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<SolverObject>(&args[0])?;
    s.read(|solver| codec::parameters_to_host(solver.parameters()))
}

/// `setSolverParameters(solver, dict)`; replaces the whole map
pub fn set_solver_parameters(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<SolverObject>(&args[0])?;
    let strict = context::settings().strict_parameters;
    let (parameters, report) = codec::parameters_from_host(&args[1], strict)?;
    s.write(|solver| solver.set_parameters(parameters))?;
    Ok(report.to_host())
}

/// `setSolverParameter(solver, key, value, description)`
pub fn set_solver_parameter(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<SolverObject>(&args[0])?;
    let key: String = arg(args, 1, "key")?;
    let value: ParameterValue = arg(args, 2, "value")?;
    let description: String = arg(args, 3, "description")?;
    s.write(|solver| solver.set_parameter(key, Parameter::new(description, value)))?;
    Ok(Value::None)
}

pub fn str_solver(args: &[Value]) -> BridgeResult<Value> {
    let s = borrow::<SolverObject>(&args[0])?;
    s.read(|solver| Value::str(&solver.to_string()))
}
