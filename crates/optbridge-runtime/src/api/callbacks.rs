//! Iteration callbacks: multiplexers, host callbacks and optimization loggers

use super::{arg, busy};
use crate::api::problem::ProblemObject;
use crate::api::solver::SolverObject;
use crate::api::state::StateObject;
use crate::context;
use crate::errors::{self, BridgeError, BridgeResult, HostCallbackError};
use crate::glue::{borrow, HostRef, SharedRef};
use crate::host::{self, Value};
use crate::registry::{self, NativeObject, TypeTag};
use optbridge_engine::{EngineError, EngineResult, IterationCallback, Multiplexer, OptimizationLogger, Problem, SolverState};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

/// Multiplexer installed as the iteration callback of one solver
///
/// The multiplexer keeps its solver alive. Releasing it detaches it from the
/// solver unless another callback was installed since.
pub struct MultiplexerObject {
    solver: SharedRef<SolverObject>,
    mux: Rc<Multiplexer>,
}

impl NativeObject for MultiplexerObject {
    const TAG: TypeTag = TypeTag::Multiplexer;
}

impl MultiplexerObject {
    pub fn attach(solver: SharedRef<SolverObject>) -> BridgeResult<Self> {
        let mux = Rc::new(Multiplexer::new());
        let callback = Rc::clone(&mux) as Rc<dyn IterationCallback>;
        solver.write(|s| s.set_iteration_callback(Some(callback)))?;
        Ok(Self { solver, mux })
    }

    pub fn multiplexer(&self) -> &Rc<Multiplexer> {
        &self.mux
    }

    fn installed(&self, callback: &Rc<dyn IterationCallback>) -> bool {
        Rc::as_ptr(callback) as *const () == Rc::as_ptr(&self.mux) as *const ()
    }
}

impl Drop for MultiplexerObject {
    fn drop(&mut self) {
        let detached = self.solver.try_write(|solver| {
            let ours = solver
                .iteration_callback()
                .map_or(false, |callback| self.installed(callback));
            if ours {
                solver.set_iteration_callback(None);
            }
            ours
        });
        match detached {
            Some(true) => tracing::debug!("multiplexer detached from solver"),
            Some(false) => {}
            None => tracing::warn!("multiplexer released while its solver is running"),
        }
    }
}

/// Iteration callback dispatching to a host callable
///
/// The callable receives the problem handle and a state handle valid for the
/// duration of the call.
pub struct SolverCallbackObject {
    problem: SharedRef<ProblemObject>,
    callable: RefCell<Option<HostRef>>,
}

impl NativeObject for SolverCallbackObject {
    const TAG: TypeTag = TypeTag::SolverCallback;
}

impl SolverCallbackObject {
    pub fn new(problem: SharedRef<ProblemObject>) -> Self {
        Self {
            problem,
            callable: RefCell::new(None),
        }
    }

    /// Bind `callable`; rebinding the same object does nothing
    pub fn bind(&self, callable: &Value) -> BridgeResult<()> {
        if !host::is_callable(callable) {
            return Err(BridgeError::NotCallable(format!(
                "solver callback of type '{}'",
                callable.type_name()
            )));
        }
        let previous = {
            let mut cell = self.callable.try_borrow_mut().map_err(|_| busy("SolverCallback"))?;
            if cell.as_ref().map_or(false, |bound| bound.holds(callable)) {
                return Ok(());
            }
            cell.replace(HostRef::acquire(callable))
        };
        drop(previous);
        Ok(())
    }

    pub fn bound(&self) -> Option<Value> {
        self.callable.borrow().as_ref().map(|h| h.value().clone())
    }

    fn callable(&self) -> EngineResult<Value> {
        let bound = self.callable.borrow().clone();
        let Some(bound) = bound else {
            return Err(fail(BridgeError::CallbackNotSet("solver".to_string())));
        };
        if !host::is_callable(bound.value()) {
            return Err(fail(BridgeError::NotCallable("solver callback".to_string())));
        }
        Ok(bound.value().clone())
    }
}

impl IterationCallback for SolverCallbackObject {
    fn on_iteration(&self, _problem: &Problem, state: &mut SolverState) -> EngineResult<()> {
        let callable = self.callable()?;

        let object = Rc::new(StateObject::new(std::mem::take(state)));
        let capsule = registry::wrap(Rc::clone(&object));
        host::call(&callable, &[self.problem.owner().clone(), Value::Capsule(capsule.clone())]);
        registry::revoke(&capsule);
        *state = object.take();

        match host::take_error() {
            None => Ok(()),
            Some(exception) => {
                let error = HostCallbackError::from(exception);
                tracing::debug!(class = %error.class, message = %error.message, "solver callback raised");
                Err(fail(BridgeError::HostCallback(error)))
            }
        }
    }
}

fn fail(error: BridgeError) -> EngineError {
    let message = error.to_string();
    errors::report(error);
    EngineError::Callback(message)
}

/// Host handle owning an optimization logger
///
/// Multiplexers only hold the logger weakly: the log is written when this
/// handle is released.
pub struct LoggerObject {
    logger: Rc<OptimizationLogger>,
}

impl NativeObject for LoggerObject {
    const TAG: TypeTag = TypeTag::Logger;
}

impl LoggerObject {
    pub fn logger(&self) -> &Rc<OptimizationLogger> {
        &self.logger
    }
}

struct LoggerLink(Weak<OptimizationLogger>);

impl IterationCallback for LoggerLink {
    fn on_iteration(&self, problem: &Problem, state: &mut SolverState) -> EngineResult<()> {
        match self.0.upgrade() {
            Some(logger) => logger.on_iteration(problem, state),
            None => Ok(()),
        }
    }
}

/// `Multiplexer(solver)`
pub fn multiplexer(args: &[Value]) -> BridgeResult<Value> {
    let solver = SharedRef::<SolverObject>::from_handle(&args[0])?;
    let object = MultiplexerObject::attach(solver)?;
    Ok(registry::wrap_value(Rc::new(object)))
}

/// `SolverCallback(problem)`
pub fn solver_callback(args: &[Value]) -> BridgeResult<Value> {
    let problem = SharedRef::<ProblemObject>::from_handle(&args[0])?;
    Ok(registry::wrap_value(Rc::new(SolverCallbackObject::new(problem))))
}

/// `bindSolverCallback(callback, callable)`
pub fn bind_solver_callback(args: &[Value]) -> BridgeResult<Value> {
    let callback = borrow::<SolverCallbackObject>(&args[0])?;
    callback.bind(&args[1])?;
    Ok(Value::None)
}

/// `addIterationCallback(multiplexer, callback)`
pub fn add_iteration_callback(args: &[Value]) -> BridgeResult<Value> {
    let mux = borrow::<MultiplexerObject>(&args[0])?;
    let callback = SharedRef::<SolverCallbackObject>::from_handle(&args[1])?;
    mux.multiplexer().add(Rc::new(callback));
    Ok(Value::None)
}

/// `removeIterationCallback(multiplexer, index)`
pub fn remove_iteration_callback(args: &[Value]) -> BridgeResult<Value> {
    let mux = borrow::<MultiplexerObject>(&args[0])?;
    let index: usize = arg(args, 1, "index")?;
    let removed = mux.multiplexer().remove(index)?;
    drop(mux);
    drop(removed);
    Ok(Value::None)
}

/// `addOptimizationLogger(solver, multiplexer, directory)`
///
/// Relative directories are placed under the configured log root. Returns
/// `(tag, logger)`; the log is written when the logger handle is released.
pub fn add_optimization_logger(args: &[Value]) -> BridgeResult<Value> {
    let solver = borrow::<SolverObject>(&args[0])?;
    let mux = borrow::<MultiplexerObject>(&args[1])?;
    let directory: String = arg(args, 2, "directory")?;

    let mut path = PathBuf::from(directory);
    if path.is_relative() {
        if let Some(root) = &context::settings().log_root {
            path = root.join(path);
        }
    }
    let header = solver.read(|s| s.to_string())?;
    let logger = Rc::new(OptimizationLogger::new(&path, header)?);
    mux.multiplexer()
        .add(Rc::new(LoggerLink(Rc::downgrade(&logger))));
    tracing::info!(directory = %path.display(), "optimization logger added");

    let handle = registry::wrap_value(Rc::new(LoggerObject { logger }));
    Ok(Value::tuple(vec![Value::str(TypeTag::Logger.name()), handle]))
}
