//! Solving through the method table, with iteration callbacks and loggers

mod common;

use common::*;
#[allow(unused_imports)]
use common::{assert_eq, assert_ne};
use optbridge_runtime::host::{self, Callable, HostException, Value};
use optbridge_runtime::registry::{self, TypeTag};
use optbridge_runtime::{configure, BridgeError, BridgeModule, Settings};
use std::cell::{Cell, RefCell};
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

fn solver(m: &BridgeModule, plugin: &str, start: &[f64]) -> Value {
    let problem = sphere_problem(m, start);
    call(m, "Solver", &[Value::str(plugin), problem])
}

/// Attach a solver callback running `body` and return the multiplexer
fn with_callback<F>(m: &BridgeModule, solver: &Value, problem: &Value, body: F) -> Value
where
    F: Fn(&[Value]) -> Result<Value, HostException> + 'static,
{
    let mux = call(m, "Multiplexer", &[solver.clone()]);
    let callback = call(m, "SolverCallback", &[problem.clone()]);
    let callable = Callable::at("on_iteration", "callbacks.py", 4, body);
    call(m, "bindSolverCallback", &[callback.clone(), callable.into()]);
    call(m, "addIterationCallback", &[mux.clone(), callback]);
    mux
}

fn stop(state: &Value) -> Result<Value, HostException> {
    reenter(
        "setSolverStateParameters",
        &[state.clone(), dict(vec![("stop", entry("stop", Value::Bool(true)))])],
    )
}

#[test]
fn test_gradient_descent_on_sphere() {
    let m = module();
    let s = solver(&m, "gradient-descent", &[3.0, 4.0]);
    call(&m, "solve", &[s.clone()]);

    let (tag, result) = minimum(&m, &s);
    assert_eq!(tag, "Result");
    let record = call(&m, "resultToDict", &[result]);
    let x = values(&field(&record, "x"));
    assert!(x.iter().all(|v| v.abs() < 1e-6), "x = {:?}", x);
    assert!(values(&field(&record, "value"))[0] < 1e-12);
    assert!(values(&field(&record, "constraints")).is_empty());
}

#[test]
fn test_default_plugin() {
    let m = module();
    let problem = sphere_problem(&m, &[1.0, 1.0]);
    for s in [
        call(&m, "Solver", &[problem.clone()]),
        call(&m, "Solver", &[Value::None, problem.clone()]),
    ] {
        let text = call(&m, "strSolver", &[s]).as_text().unwrap();
        assert!(text.starts_with("Solver:\n  Plugin: gradient-descent"), "{}", text);
    }
}

#[test]
fn test_minimum_before_solve() {
    let m = module();
    let s = solver(&m, "gradient-descent", &[1.0, 1.0]);
    let err = call_err(&m, "minimum", &[s]);
    assert_eq!(err, BridgeError::NoSolution);
    assert_eq!(err.to_string(), "No solution: the solver has not been run");
    assert_eq!(err.exception_class(), "RuntimeError");
}

#[test]
fn test_unknown_plugin_returns_none_with_warning() {
    let m = module();
    host::take_warnings();
    let s = solver(&m, "simplex", &[1.0, 1.0]);
    assert!(s.is_none());

    let warnings = host::take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].category, "RuntimeWarning");
    assert_eq!(
        warnings[0].message,
        "Failed to construct solver: unknown solver plugin 'simplex'"
    );
}

#[test]
fn test_solver_needs_a_problem() {
    let m = module();
    let err = call_err(&m, "Solver", &[Value::str("dummy"), sphere(&m)]);
    assert_eq!(err.to_string(), "Problem object expected but another type was passed");
}

#[test]
fn test_dummy_solver_error() {
    let m = module();
    let s = solver(&m, "dummy", &[1.0, 2.0]);
    call(&m, "solve", &[s.clone()]);

    let (tag, error) = minimum(&m, &s);
    assert_eq!(tag, "SolverError");
    let record = call(&m, "solverErrorToDict", &[error.clone()]);
    assert_eq!(format!("{:?}", record), r#"{"error": "The dummy solver always fails."}"#);

    let text = call(&m, "strSolverError", &[error]).as_text().unwrap();
    insta::assert_snapshot!(text, @"Solver error: The dummy solver always fails.");
}

#[test]
fn test_dummy_solver_last_state() {
    let m = module();
    let s = solver(&m, "dummy-laststate", &[1.0, 2.0]);
    call(&m, "solve", &[s.clone()]);

    let (tag, error) = minimum(&m, &s);
    assert_eq!(tag, "SolverError");
    let record = call(&m, "solverErrorToDict", &[error]);
    let last = field(&record, "lastState");
    assert_eq!(values(&field(&last, "x")), vec![1.0, 2.0]);
    assert_eq!(values(&field(&last, "value")), vec![5.0]);
}

#[test]
fn test_callback_sees_state() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let _mux = with_callback(&m, &s, &problem, {
        let seen = Rc::clone(&seen);
        move |args| {
            let state = &args[1];
            let cost = reenter("getSolverStateCost", &[state.clone()])?;
            let params = reenter("getSolverStateParameters", &[state.clone()])?;
            let iteration = field(&params, "iteration").as_sequence().unwrap()[1].clone();
            seen.borrow_mut().push((format!("{:?}", iteration), cost.as_float()));
            if seen.borrow().len() == 2 {
                stop(state)?;
            }
            Ok(Value::None)
        }
    });
    call(&m, "solve", &[s]);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("0".to_string(), Some(25.0)));
    assert_eq!(seen[1].0, "1");
    assert!((seen[1].1.unwrap() - 16.0).abs() < 1e-9);
}

#[test]
fn test_callback_edits_reach_the_solver() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let _mux = with_callback(&m, &s, &problem, |args| {
        reenter("setSolverStateX", &[args[1].clone(), vector(&[1.0, -1.0])])?;
        stop(&args[1])
    });
    call(&m, "solve", &[s.clone()]);

    let (tag, result) = minimum(&m, &s);
    assert_eq!(tag, "ResultWithWarnings");
    let record = call(&m, "resultWithWarningsToDict", &[result]);
    assert_eq!(values(&field(&record, "x")), vec![1.0, -1.0]);
    assert_eq!(values(&field(&record, "value")), vec![2.0]);
    assert_eq!(
        format!("{:?}", field(&record, "warnings")),
        r#"["optimization stopped by an iteration callback"]"#
    );
}

#[test]
fn test_state_x_is_a_copy() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let _mux = with_callback(&m, &s, &problem, |args| {
        let x = reenter("getSolverStateX", &[args[1].clone()])?;
        if let Value::Array(x) = &x {
            x.set(0, 100.0)?;
        }
        let again = reenter("getSolverStateX", &[args[1].clone()])?;
        if values(&again) != vec![3.0, 4.0] {
            return Err(HostException::value_error("state was modified through a copy"));
        }
        stop(&args[1])
    });
    call(&m, "solve", &[s.clone()]);
    assert_eq!(minimum(&m, &s).0, "ResultWithWarnings");
}

#[test]
fn test_raising_callback_fails_the_solve() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let _mux = with_callback(&m, &s, &problem, |_| {
        Err(HostException::value_error("diverged"))
    });

    let err = call_err(&m, "solve", &[s.clone()]);
    assert_eq!(
        err.to_string(),
        "Error occurred in host code: ValueError: diverged\nHost stack trace:\n    callbacks.py(4): on_iteration\n"
    );
    assert_eq!(err.exception_class(), "RuntimeError");

    let (tag, error) = minimum(&m, &s);
    assert_eq!(tag, "SolverError");
    let record = call(&m, "solverErrorToDict", &[error]);
    let message = field(&record, "error").as_text().unwrap();
    assert!(
        message.starts_with("Iteration callback failed: Error occurred in host code: ValueError: diverged"),
        "{}",
        message
    );
    assert_eq!(values(&field(&field(&record, "lastState"), "x")), vec![3.0, 4.0]);
}

#[test]
fn test_raising_callback_sets_host_error() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let _mux = with_callback(&m, &s, &problem, |_| {
        host::raise(HostException::new("KeyError", "'missing'"));
        Ok(Value::None)
    });

    host::clear_error();
    assert!(m.call("solve", &[s]).is_none());
    let exc = host::take_error().expect("solve should raise");
    assert_eq!(exc.class, "RuntimeError");
    assert!(exc.message.starts_with("Error occurred in host code: KeyError: 'missing'"));
}

#[test]
fn test_unbound_solver_callback() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let mux = call(&m, "Multiplexer", &[s.clone()]);
    let callback = call(&m, "SolverCallback", &[problem]);
    call(&m, "addIterationCallback", &[mux.clone(), callback]);

    let err = call_err(&m, "solve", &[s]);
    assert_eq!(err, BridgeError::CallbackNotSet("solver".to_string()));
}

#[test]
fn test_bind_rejects_non_callable() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let callback = call(&m, "SolverCallback", &[problem]);
    let err = call_err(&m, "bindSolverCallback", &[callback, Value::Int(1)]);
    assert_eq!(err.to_string(), "solver callback of type 'int' is not callable");
}

#[test]
fn test_state_handle_revoked_after_callback() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let kept = Rc::new(RefCell::new(None));
    let _mux = with_callback(&m, &s, &problem, {
        let kept = Rc::clone(&kept);
        move |args| {
            *kept.borrow_mut() = Some(args[1].clone());
            stop(&args[1])
        }
    });
    call(&m, "solve", &[s]);

    let state = kept.borrow_mut().take().expect("callback ran");
    assert_eq!(registry::live_handles_of(TypeTag::SolverState), 0);
    let err = call_err(&m, "getSolverStateX", &[state]);
    assert_eq!(
        err.to_string(),
        "SolverState object expected but another type was passed"
    );
}

#[test]
fn test_released_multiplexer_detaches() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let calls = Rc::new(Cell::new(0u32));
    let mux = with_callback(&m, &s, &problem, {
        let calls = Rc::clone(&calls);
        move |args| {
            calls.set(calls.get() + 1);
            stop(&args[1])
        }
    });

    call(&m, "solve", &[s.clone()]);
    assert_eq!(calls.get(), 1);

    drop(mux);
    assert_eq!(registry::live_handles_of(TypeTag::Multiplexer), 0);
    assert_eq!(registry::live_handles_of(TypeTag::SolverCallback), 0);
    call(&m, "solve", &[s.clone()]);
    assert_eq!(calls.get(), 1);
    assert_eq!(minimum(&m, &s).0, "Result");
}

#[test]
fn test_remove_iteration_callback() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let s = call(&m, "Solver", &[problem.clone()]);
    let calls = Rc::new(Cell::new(0u32));
    let mux = with_callback(&m, &s, &problem, {
        let calls = Rc::clone(&calls);
        move |_| {
            calls.set(calls.get() + 1);
            Ok(Value::None)
        }
    });

    let err = call_err(&m, "removeIterationCallback", &[mux.clone(), Value::Int(1)]);
    assert_eq!(err.to_string(), "Index 1 out of range (length 1)");
    assert_eq!(err.exception_class(), "IndexError");

    let err = call_err(&m, "removeIterationCallback", &[mux.clone(), Value::Int(-1)]);
    assert_eq!(
        err.to_string(),
        "Conversion error: argument 'index': expected a non-negative integer, got -1"
    );

    call(&m, "removeIterationCallback", &[mux.clone(), Value::Int(0)]);
    assert_eq!(registry::live_handles_of(TypeTag::SolverCallback), 0);
    call(&m, "solve", &[s]);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_configured_iteration_limit() {
    configure(Settings {
        max_iterations: Some(3),
        ..Settings::default()
    });
    let m = module();
    let s = solver(&m, "gradient-descent", &[3.0, 4.0]);
    let params = call(&m, "getSolverParameters", &[s.clone()]);
    assert_eq!(
        format!("{:?}", field(&params, "max-iterations")),
        r#"("maximum number of iterations", 3)"#
    );

    call(&m, "solve", &[s.clone()]);
    let (tag, result) = minimum(&m, &s);
    assert_eq!(tag, "ResultWithWarnings");
    let record = call(&m, "resultWithWarningsToDict", &[result]);
    assert_eq!(
        format!("{:?}", field(&record, "warnings")),
        r#"["maximum number of iterations reached (3)"]"#
    );
    configure(Settings::default());
}

#[test]
fn test_set_solver_parameter_changes_the_run() {
    let m = module();
    let s = solver(&m, "gradient-descent", &[3.0, 4.0]);
    call(
        &m,
        "setSolverParameter",
        &[s.clone(), Value::str("step-size"), Value::Float(0.5), Value::str("fixed step length")],
    );
    call(&m, "solve", &[s.clone()]);

    let (tag, result) = minimum(&m, &s);
    assert_eq!(tag, "Result");
    let record = call(&m, "resultToDict", &[result]);
    assert_eq!(values(&field(&record, "x")), vec![0.0, 0.0]);
}

#[test]
fn test_optimization_logger_writes_on_release() {
    let dir = TempDir::new().unwrap();
    let run = dir.path().join("run");
    let m = module();
    let s = solver(&m, "gradient-descent", &[3.0, 4.0]);
    let mux = call(&m, "Multiplexer", &[s.clone()]);
    let [tag, logger]: [Value; 2] = call(
        &m,
        "addOptimizationLogger",
        &[s.clone(), mux.clone(), Value::str(run.to_str().unwrap())],
    )
    .as_sequence()
    .unwrap()
    .try_into()
    .unwrap();
    assert_eq!(tag.as_text().as_deref(), Some("OptimizationLogger"));
    assert_eq!(registry::live_handles_of(TypeTag::Logger), 1);
    call(&m, "solve", &[s.clone()]);
    assert!(!run.join("journal.log").exists());

    drop(logger);
    let journal = fs::read_to_string(run.join("journal.log")).unwrap();
    assert!(journal.starts_with("Solver:\n  Plugin: gradient-descent"));
    assert!(journal.contains("\nIteration 0\n  x: [3, 4]\n  Cost: 25\n"));
    let iterations = fs::read_to_string(run.join("iterations.json")).unwrap();
    assert!(iterations.contains("\"constraintViolation\": 0.0"));

    // the multiplexer only held the logger weakly
    call(&m, "solve", &[s]);
}

#[test]
fn test_relative_log_directory_uses_log_root() {
    let dir = TempDir::new().unwrap();
    configure(Settings {
        log_root: Some(dir.path().to_path_buf()),
        ..Settings::default()
    });
    let m = module();
    let s = solver(&m, "dummy-laststate", &[1.0, 1.0]);
    let mux = call(&m, "Multiplexer", &[s.clone()]);
    let [_, logger]: [Value; 2] = call(
        &m,
        "addOptimizationLogger",
        &[s.clone(), mux.clone(), Value::str("runs/first")],
    )
    .as_sequence()
    .unwrap()
    .try_into()
    .unwrap();
    call(&m, "solve", &[s]);
    drop(logger);

    let journal = fs::read_to_string(dir.path().join("runs/first/journal.log")).unwrap();
    assert!(journal.contains("Iteration 0"));
    assert!(dir.path().join("runs/first/iterations.json").exists());
    configure(Settings::default());
}
