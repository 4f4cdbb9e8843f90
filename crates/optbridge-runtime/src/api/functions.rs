//! Function handles: construction, evaluation and callback binding

use super::{arg, array, optional};
use crate::codec::FromHost;
use crate::context;
use crate::dispatch::{HostFunction, Slot};
use crate::errors::{BridgeError, BridgeResult};
use crate::glue::{borrow, SharedRef};
use crate::host::{NdArray, Shape, Value};
use crate::registry::{self, NativeObject, TypeTag};
use optbridge_engine::{
    EngineResult, FiniteDifferenceGradient, FiniteDifferenceRule, Function, FunctionKind, FunctionPool,
};
use std::rc::Rc;

/// Native side of a function handle
pub struct FunctionObject {
    function: Rc<dyn Function>,
    host: Option<Rc<HostFunction>>,
}

impl NativeObject for FunctionObject {
    const TAG: TypeTag = TypeTag::Function;
}

impl FunctionObject {
    /// A function evaluated through bound host callables
    pub fn host(function: Rc<HostFunction>) -> Self {
        Self {
            function: Rc::clone(&function) as Rc<dyn Function>,
            host: Some(function),
        }
    }

    /// A function implemented natively
    pub fn native(function: Rc<dyn Function>) -> Self {
        Self {
            function,
            host: None,
        }
    }

    pub fn function(&self) -> &Rc<dyn Function> {
        &self.function
    }

    pub fn host_function(&self) -> Option<&Rc<HostFunction>> {
        self.host.as_ref()
    }
}

/// The function behind `handle`, holding the handle for as long as it is used
pub(crate) fn shared_function(handle: &Value) -> BridgeResult<Rc<dyn Function>> {
    let object = registry::unwrap::<FunctionObject>(handle)?;
    Ok(Rc::new(SharedRef::acquire(Rc::clone(&object.function), handle)))
}

fn create(kind: FunctionKind, args: &[Value]) -> BridgeResult<Value> {
    let input_size: usize = arg(args, 0, "input_size")?;
    let output_size: usize = arg(args, 1, "output_size")?;
    let name = match optional(args, 2) {
        Some(name) => String::from_host(name)?,
        None => String::new(),
    };
    tracing::debug!(kind = kind.label(), input_size, output_size, name = %name, "function created");
    let function = Rc::new(HostFunction::new(kind, input_size, output_size, name));
    Ok(registry::wrap_value(Rc::new(FunctionObject::host(function))))
}

/// `Function(n, m[, name])`
pub fn function(args: &[Value]) -> BridgeResult<Value> {
    create(FunctionKind::Plain, args)
}

/// `DifferentiableFunction(n, m[, name])`
pub fn differentiable_function(args: &[Value]) -> BridgeResult<Value> {
    create(FunctionKind::Differentiable, args)
}

/// `TwiceDifferentiableFunction(n, m[, name])`
pub fn twice_differentiable_function(args: &[Value]) -> BridgeResult<Value> {
    create(FunctionKind::TwiceDifferentiable, args)
}

/// `FunctionPool(callback, functions[, name])`
pub fn function_pool(args: &[Value]) -> BridgeResult<Value> {
    let callback = shared_function(&args[0])?;
    let members = args[1].as_sequence().ok_or_else(|| {
        BridgeError::Conversion(format!(
            "argument 'functions': expected a list of Function handles, got '{}'",
            args[1].type_name()
        ))
    })?;
    let functions = members
        .iter()
        .map(shared_function)
        .collect::<BridgeResult<Vec<_>>>()?;
    let name = match optional(args, 2) {
        Some(name) => String::from_host(name)?,
        None => String::new(),
    };

    let pool = FunctionPool::new(callback, functions, name)?;
    Ok(registry::wrap_value(Rc::new(FunctionObject::native(Rc::new(pool)))))
}

fn finite_difference(rule: FiniteDifferenceRule, args: &[Value]) -> BridgeResult<Value> {
    let inner = shared_function(&args[0])?;
    let epsilon = match optional(args, 1) {
        Some(eps) => f64::from_host(eps)?,
        None => context::settings().fd_epsilon,
    };
    if !(epsilon > 0.0) {
        return Err(BridgeError::Conversion(format!(
            "finite-difference epsilon must be positive, got {}",
            epsilon
        )));
    }
    let gradient = FiniteDifferenceGradient::new(inner, rule, epsilon);
    Ok(registry::wrap_value(Rc::new(FunctionObject::native(Rc::new(gradient)))))
}

/// `SimpleFiniteDifferenceGradient(f[, epsilon])`
pub fn simple_finite_difference_gradient(args: &[Value]) -> BridgeResult<Value> {
    finite_difference(FiniteDifferenceRule::Simple, args)
}

/// `FivePointsFiniteDifferenceGradient(f[, epsilon])`
pub fn five_points_finite_difference_gradient(args: &[Value]) -> BridgeResult<Value> {
    finite_difference(FiniteDifferenceRule::FivePoints, args)
}

pub fn input_size(args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    Ok(Value::Int(f.function().input_size() as i64))
}

pub fn output_size(args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    Ok(Value::Int(f.function().output_size() as i64))
}

pub fn get_name(args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    Ok(Value::str(f.function().name()))
}

fn expect_shape(what: &str, array: &NdArray, expected: Shape) -> BridgeResult<()> {
    let actual = array.shape()?;
    if actual != expected {
        return Err(BridgeError::shape(what, expected, actual));
    }
    Ok(())
}

fn check_input(function: &dyn Function, len: usize) -> BridgeResult<()> {
    if len != function.input_size() {
        return Err(BridgeError::shape(
            "argument",
            Shape::Vector(function.input_size()),
            Shape::Vector(len),
        ));
    }
    Ok(())
}

/// Run `eval` on `out` and the `x` argument
///
/// A separate ndarray `x` is read in place; lists and arrays aliasing `out`
/// are copied first.
fn evaluate(
    args: &[Value],
    function: &dyn Function,
    out: &NdArray,
    eval: impl FnOnce(&mut [f64], &[f64]) -> EngineResult<()>,
) -> BridgeResult<()> {
    match &args[2] {
        Value::Array(x) if !x.same_buffer(out) => {
            match x.shape()? {
                Shape::Vector(len) => check_input(function, len)?,
                shape => return Err(BridgeError::shape("vector", "a 1-D array", shape)),
            }
            out.write(|out| x.read(|x| eval(out, x)))???;
        }
        _ => {
            let x: Vec<f64> = arg(args, 2, "x")?;
            check_input(function, x.len())?;
            out.write(|out| eval(out, &x))??;
        }
    }
    Ok(())
}

/// `compute(f, out, x)`
pub fn compute(args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    let function = f.function();
    let out = array(args, 1, "out")?;
    expect_shape("result", out, Shape::Vector(function.output_size()))?;
    evaluate(args, function.as_ref(), out, |out, x| function.compute(out, x))?;
    Ok(Value::None)
}

/// `gradient(f, out, x, function_id)`
pub fn gradient(args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    let function = f.function();
    if !function.kind().is_differentiable() {
        return Err(BridgeError::type_mismatch(
            FunctionKind::Differentiable.label(),
            function.kind().label(),
        ));
    }
    let out = array(args, 1, "out")?;
    expect_shape("gradient", out, Shape::Vector(function.input_size()))?;
    let function_id: usize = arg(args, 3, "function_id")?;
    evaluate(args, function.as_ref(), out, |out, x| {
        function.gradient(out, x, function_id)
    })?;
    Ok(Value::None)
}

/// `jacobian(f, out, x)` with `out` of shape `(m, n)`
pub fn jacobian(args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    let function = f.function();
    if !function.kind().is_differentiable() {
        return Err(BridgeError::type_mismatch(
            FunctionKind::Differentiable.label(),
            function.kind().label(),
        ));
    }
    let out = array(args, 1, "out")?;
    expect_shape(
        "jacobian",
        out,
        Shape::Matrix(function.output_size(), function.input_size()),
    )?;
    evaluate(args, function.as_ref(), out, |out, x| function.jacobian(out, x))?;
    Ok(Value::None)
}

fn bind(slot: Slot, args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    let host = f.host_function().ok_or_else(|| {
        BridgeError::type_mismatch("host-evaluated Function", f.function().name())
    })?;
    host.bind(slot, &args[1])?;
    Ok(Value::None)
}

/// `bindCompute(f, callable)`
pub fn bind_compute(args: &[Value]) -> BridgeResult<Value> {
    bind(Slot::Compute, args)
}

/// `bindGradient(f, callable)`
pub fn bind_gradient(args: &[Value]) -> BridgeResult<Value> {
    bind(Slot::Gradient, args)
}

/// `bindJacobian(f, callable)`
pub fn bind_jacobian(args: &[Value]) -> BridgeResult<Value> {
    bind(Slot::Jacobian, args)
}
