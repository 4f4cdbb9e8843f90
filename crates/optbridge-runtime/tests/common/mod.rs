//! Shared test utilities
//!
//! Host callables here play the part of host code: they receive array views,
//! read and write them, and raise host exceptions on bad input.

#![allow(dead_code)]

use optbridge_runtime::host::{Callable, HostException, NdArray, Shape, Value};
use optbridge_runtime::{BridgeError, BridgeModule};

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

pub fn module() -> BridgeModule {
    BridgeModule::new()
}

/// Call `name`, panicking with the bridge error on failure
pub fn call(module: &BridgeModule, name: &str, args: &[Value]) -> Value {
    match module.try_call(name, args) {
        Ok(value) => value,
        Err(e) => panic!("{}() failed: {}", name, e),
    }
}

/// Call `name`, expecting a bridge error
pub fn call_err(module: &BridgeModule, name: &str, args: &[Value]) -> BridgeError {
    match module.try_call(name, args) {
        Ok(value) => panic!("{}() should fail, got {:?}", name, value),
        Err(e) => e,
    }
}

pub fn vector(data: &[f64]) -> Value {
    Value::array(data.to_vec())
}

pub fn zeros(shape: Shape) -> Value {
    Value::Array(NdArray::zeros(shape))
}

/// Contents of an array value
pub fn values(value: &Value) -> Vec<f64> {
    match value {
        Value::Array(array) => array.to_vec().unwrap(),
        other => panic!("expected an array, got {:?}", other),
    }
}

fn arrays(args: &[Value]) -> Result<(&NdArray, &NdArray), HostException> {
    match (&args[0], &args[1]) {
        (Value::Array(out), Value::Array(x)) => Ok((out, x)),
        _ => Err(HostException::type_error("expected (out, x) arrays")),
    }
}

/// Host `compute` for `x0^2 + x1^2`
pub fn sphere_compute() -> Value {
    Callable::at("sphere_compute", "model.py", 3, |args| {
        let (out, x) = arrays(args)?;
        let x = x.to_vec()?;
        out.set(0, x.iter().map(|v| v * v).sum())?;
        Ok(Value::None)
    })
    .into()
}

/// Host `gradient` for `x0^2 + x1^2`
pub fn sphere_gradient() -> Value {
    Callable::at("sphere_gradient", "model.py", 7, |args| {
        let (out, x) = arrays(args)?;
        let x = x.to_vec()?;
        out.write(|g| {
            for (gi, xi) in g.iter_mut().zip(&x) {
                *gi = 2.0 * xi;
            }
        })?;
        Ok(Value::None)
    })
    .into()
}

/// A differentiable host function `R^2 -> R` with compute and gradient bound
pub fn sphere(module: &BridgeModule) -> Value {
    let f = call(
        module,
        "DifferentiableFunction",
        &[Value::Int(2), Value::Int(1), Value::str("sphere")],
    );
    call(module, "bindCompute", &[f.clone(), sphere_compute()]);
    call(module, "bindGradient", &[f.clone(), sphere_gradient()]);
    f
}

/// A problem over [`sphere`] starting at `start`
pub fn sphere_problem(module: &BridgeModule, start: &[f64]) -> Value {
    let f = sphere(module);
    let problem = call(module, "Problem", &[f]);
    call(module, "setStartingPoint", &[problem.clone(), vector(start)]);
    problem
}

/// Split `minimum()`'s `(tag, handle)` pair
pub fn minimum(module: &BridgeModule, solver: &Value) -> (String, Value) {
    let pair = call(module, "minimum", &[solver.clone()]);
    let items = pair.as_sequence().expect("minimum returns a tuple");
    assert_eq!(items.len(), 2);
    (items[0].as_text().expect("tag is text"), items[1].clone())
}

/// Look up `key` in a dict value
pub fn field(dict: &Value, key: &str) -> Value {
    match dict {
        Value::Dict(d) => d
            .get(key)
            .unwrap_or_else(|| panic!("missing key {:?}", key)),
        other => panic!("expected a dict, got {:?}", other),
    }
}

/// Call back into the bridge from inside a host callable
pub fn reenter(name: &str, args: &[Value]) -> Result<Value, HostException> {
    BridgeModule::new()
        .try_call(name, args)
        .map_err(|e| e.to_exception())
}

/// `(description, value)` entry of a parameter dict
pub fn entry(description: &str, value: Value) -> Value {
    Value::tuple(vec![Value::str(description), value])
}

/// A dict value from `(key, value)` pairs, in order
pub fn dict(pairs: Vec<(&str, Value)>) -> Value {
    Value::Dict(pairs.into_iter().map(|(k, v)| (Value::str(k), v)).collect())
}
