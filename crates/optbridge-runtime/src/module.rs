//! Host-facing method table
//!
//! [`BridgeModule`] is what the host imports: a table of named methods, each
//! with an arity range. Methods are built with [`MethodBuilder`]:
//!
//! ```rust
//! use optbridge_runtime::module::MethodBuilder;
//! use optbridge_runtime::host::Value;
//!
//! let identity = MethodBuilder::new("identity", |args| Ok(args[0].clone()))
//!     .with_arity(1)
//!     .build();
//! assert!(identity.invoke(&[Value::Int(3)]).is_ok());
//! assert!(identity.invoke(&[]).is_err());
//! ```
//!
//! Every invocation holds an [`ExecutionToken`]. An error parked on the
//! deferred channel during the call (a host callback failing deep inside a
//! solve, say) takes priority over the method's own return value.

use crate::api::{callbacks, functions, inspect, problem, solver, state};
use crate::context::{self, ExecutionToken};
use crate::errors::{self, BridgeError, BridgeResult};
use crate::host::{self, Callable, Dict, HostException, Value};
use std::collections::BTreeMap;

/// Signature of a method implementation
pub type MethodFn = fn(&[Value]) -> BridgeResult<Value>;

/// Builder for a [`Method`]
pub struct MethodBuilder {
    name: &'static str,
    implementation: MethodFn,
    min_args: usize,
    max_args: usize,
}

impl MethodBuilder {
    /// Start a method taking no arguments
    pub fn new(name: &'static str, implementation: MethodFn) -> Self {
        Self {
            name,
            implementation,
            min_args: 0,
            max_args: 0,
        }
    }

    /// Require exactly `arity` arguments
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.min_args = arity;
        self.max_args = arity;
        self
    }

    /// Accept between `min` and `max` arguments; missing trailing ones are optional
    pub fn with_arity_range(mut self, min: usize, max: usize) -> Self {
        self.min_args = min;
        self.max_args = max.max(min);
        self
    }

    pub fn build(self) -> Method {
        Method {
            name: self.name,
            implementation: self.implementation,
            min_args: self.min_args,
            max_args: self.max_args,
        }
    }
}

/// One entry of the method table
#[derive(Clone, Copy)]
pub struct Method {
    name: &'static str,
    implementation: MethodFn,
    min_args: usize,
    max_args: usize,
}

impl Method {
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn check_arity(&self, found: usize) -> BridgeResult<()> {
        if (self.min_args..=self.max_args).contains(&found) {
            return Ok(());
        }
        let expected = if self.min_args == self.max_args {
            self.min_args.to_string()
        } else {
            format!("{} to {}", self.min_args, self.max_args)
        };
        Err(BridgeError::Arity {
            name: self.name.to_string(),
            expected,
            found,
        })
    }

    /// Run the method under an execution token
    pub fn invoke(&self, args: &[Value]) -> BridgeResult<Value> {
        let _token = ExecutionToken::acquire();
        if context::depth() == 1 {
            if let Some(stale) = errors::take_reported() {
                tracing::debug!(error = %stale, "discarding stale deferred error");
            }
        }
        self.check_arity(args.len())?;

        let span = tracing::debug_span!("method", name = self.name, depth = context::depth());
        let _enter = span.enter();
        let result = (self.implementation)(args);
        match errors::take_reported() {
            Some(error) => Err(error),
            None => result,
        }
    }
}

/// The bridge module: every host-visible method by name
pub struct BridgeModule {
    methods: BTreeMap<&'static str, Method>,
}

impl Default for BridgeModule {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeModule {
    pub fn new() -> Self {
        let table = [
            // Functions
            MethodBuilder::new("Function", functions::function).with_arity_range(2, 3),
            MethodBuilder::new("DifferentiableFunction", functions::differentiable_function)
                .with_arity_range(2, 3),
            MethodBuilder::new(
                "TwiceDifferentiableFunction",
                functions::twice_differentiable_function,
            )
            .with_arity_range(2, 3),
            MethodBuilder::new("FunctionPool", functions::function_pool).with_arity_range(2, 3),
            MethodBuilder::new(
                "SimpleFiniteDifferenceGradient",
                functions::simple_finite_difference_gradient,
            )
            .with_arity_range(1, 2),
            MethodBuilder::new(
                "FivePointsFiniteDifferenceGradient",
                functions::five_points_finite_difference_gradient,
            )
            .with_arity_range(1, 2),
            MethodBuilder::new("inputSize", functions::input_size).with_arity(1),
            MethodBuilder::new("outputSize", functions::output_size).with_arity(1),
            MethodBuilder::new("getName", functions::get_name).with_arity(1),
            MethodBuilder::new("compute", functions::compute).with_arity(3),
            MethodBuilder::new("gradient", functions::gradient).with_arity(4),
            MethodBuilder::new("jacobian", functions::jacobian).with_arity(3),
            MethodBuilder::new("bindCompute", functions::bind_compute).with_arity(2),
            MethodBuilder::new("bindGradient", functions::bind_gradient).with_arity(2),
            MethodBuilder::new("bindJacobian", functions::bind_jacobian).with_arity(2),
            // Problem
            MethodBuilder::new("Problem", problem::problem).with_arity(1),
            MethodBuilder::new("getStartingPoint", problem::get_starting_point).with_arity(1),
            MethodBuilder::new("setStartingPoint", problem::set_starting_point).with_arity(2),
            MethodBuilder::new("getArgumentBounds", problem::get_argument_bounds).with_arity(1),
            MethodBuilder::new("setArgumentBounds", problem::set_argument_bounds).with_arity(2),
            MethodBuilder::new("getArgumentScales", problem::get_argument_scales).with_arity(1),
            MethodBuilder::new("setArgumentScales", problem::set_argument_scales).with_arity(2),
            MethodBuilder::new("addConstraint", problem::add_constraint).with_arity_range(3, 4),
            // Solver
            MethodBuilder::new("Solver", solver::solver).with_arity_range(1, 2),
            MethodBuilder::new("solve", solver::solve).with_arity(1),
            MethodBuilder::new("minimum", solver::minimum).with_arity(1),
            MethodBuilder::new("getSolverParameters", solver::get_solver_parameters).with_arity(1),
            MethodBuilder::new("setSolverParameters", solver::set_solver_parameters).with_arity(2),
            MethodBuilder::new("setSolverParameter", solver::set_solver_parameter).with_arity(4),
            // Callbacks
            MethodBuilder::new("Multiplexer", callbacks::multiplexer).with_arity(1),
            MethodBuilder::new("SolverCallback", callbacks::solver_callback).with_arity(1),
            MethodBuilder::new("bindSolverCallback", callbacks::bind_solver_callback).with_arity(2),
            MethodBuilder::new("addIterationCallback", callbacks::add_iteration_callback)
                .with_arity(2),
            MethodBuilder::new("removeIterationCallback", callbacks::remove_iteration_callback)
                .with_arity(2),
            MethodBuilder::new("addOptimizationLogger", callbacks::add_optimization_logger)
                .with_arity(3),
            // State
            MethodBuilder::new("getSolverStateX", state::get_solver_state_x).with_arity(1),
            MethodBuilder::new("setSolverStateX", state::set_solver_state_x).with_arity(2),
            MethodBuilder::new("getSolverStateCost", state::get_solver_state_cost).with_arity(1),
            MethodBuilder::new("setSolverStateCost", state::set_solver_state_cost).with_arity(2),
            MethodBuilder::new(
                "getSolverStateConstraintViolation",
                state::get_solver_state_constraint_violation,
            )
            .with_arity(1),
            MethodBuilder::new(
                "setSolverStateConstraintViolation",
                state::set_solver_state_constraint_violation,
            )
            .with_arity(2),
            MethodBuilder::new("getSolverStateParameters", state::get_solver_state_parameters)
                .with_arity(1),
            MethodBuilder::new("setSolverStateParameters", state::set_solver_state_parameters)
                .with_arity(2),
            // Results
            MethodBuilder::new("resultToDict", inspect::result_to_dict).with_arity(1),
            MethodBuilder::new("resultWithWarningsToDict", inspect::result_with_warnings_to_dict)
                .with_arity(1),
            MethodBuilder::new("solverErrorToDict", inspect::solver_error_to_dict).with_arity(1),
            // Printing
            MethodBuilder::new("strFunction", inspect::str_function).with_arity(1),
            MethodBuilder::new("strProblem", problem::str_problem).with_arity(1),
            MethodBuilder::new("strSolver", solver::str_solver).with_arity(1),
            MethodBuilder::new("strSolverState", state::str_solver_state).with_arity(1),
            MethodBuilder::new("strResult", inspect::str_result).with_arity(1),
            MethodBuilder::new("strResultWithWarnings", inspect::str_result_with_warnings)
                .with_arity(1),
            MethodBuilder::new("strSolverError", inspect::str_solver_error).with_arity(1),
        ];

        let methods = table
            .into_iter()
            .map(|builder| {
                let method = builder.build();
                (method.name(), method)
            })
            .collect();
        Self { methods }
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Method names in sorted order
    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.keys().copied().collect()
    }

    /// Call `name`, returning the error instead of raising it
    pub fn try_call(&self, name: &str, args: &[Value]) -> BridgeResult<Value> {
        let method = self.method(name).ok_or_else(|| {
            BridgeError::Host(HostException::new(
                "AttributeError",
                format!("module 'optbridge' has no attribute '{}'", name),
            ))
        })?;
        method.invoke(args)
    }

    /// Call `name` the way the host does
    ///
    /// On failure the host pending exception is set and `None` is returned.
    pub fn call(&self, name: &str, args: &[Value]) -> Value {
        match self.try_call(name, args) {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(method = name, error = %error, "method failed");
                host::raise(error.to_exception());
                Value::None
            }
        }
    }

    /// The module as a host namespace of callables
    pub fn namespace(&self) -> Dict {
        let dict = Dict::new();
        for method in self.methods.values().copied() {
            let callable = Callable::new(method.name(), move |args: &[Value]| {
                method.invoke(args).map_err(|e| e.to_exception())
            });
            dict.insert(Value::str(method.name()), Value::Function(callable));
        }
        dict
    }
}
