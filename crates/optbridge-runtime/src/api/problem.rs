//! Problem handles

use super::{arg, busy, optional};
use crate::api::functions::shared_function;
use crate::codec::ToHost;
use crate::errors::{BridgeError, BridgeResult};
use crate::glue::borrow;
use crate::host::{NdArray, Shape, Value};
use crate::registry::{self, NativeObject, TypeTag};
use optbridge_engine::{Interval, Problem};
use std::cell::RefCell;
use std::rc::Rc;

pub struct ProblemObject {
    problem: RefCell<Problem>,
}

impl NativeObject for ProblemObject {
    const TAG: TypeTag = TypeTag::Problem;
}

impl ProblemObject {
    pub fn new(problem: Problem) -> Self {
        Self {
            problem: RefCell::new(problem),
        }
    }

    /// Snapshot of the problem
    pub fn snapshot(&self) -> BridgeResult<Problem> {
        Ok(self.problem.try_borrow().map_err(|_| busy("Problem"))?.clone())
    }

    fn read<R>(&self, f: impl FnOnce(&Problem) -> R) -> BridgeResult<R> {
        Ok(f(&*self.problem.try_borrow().map_err(|_| busy("Problem"))?))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Problem) -> R) -> BridgeResult<R> {
        Ok(f(&mut *self.problem.try_borrow_mut().map_err(|_| busy("Problem"))?))
    }
}

/// Intervals from an `(rows, 2)` array or a list of `(lower, upper)` pairs
fn intervals_from_host(value: &Value, what: &str, rows: usize) -> BridgeResult<Vec<Interval>> {
    let pairs: Vec<(f64, f64)> = match value {
        Value::Array(array) => {
            let shape = array.shape()?;
            if shape != Shape::Matrix(rows, 2) {
                return Err(BridgeError::shape(what, Shape::Matrix(rows, 2), shape));
            }
            let data = array.to_vec()?;
            data.chunks(2).map(|c| (c[0], c[1])).collect()
        }
        Value::List(_) | Value::Tuple(_) => {
            let items = value.as_sequence().unwrap_or_default();
            if items.len() != rows {
                return Err(BridgeError::shape(
                    what,
                    Shape::Matrix(rows, 2),
                    format!("{} rows", items.len()),
                ));
            }
            if items.iter().any(|item| item.as_float().is_some()) {
                return Err(BridgeError::shape(
                    what,
                    Shape::Matrix(rows, 2),
                    Shape::Vector(items.len()),
                ));
            }
            items
                .iter()
                .map(|item| match <Vec<f64> as crate::codec::FromHost>::from_host(item)? {
                    pair if pair.len() == 2 => Ok((pair[0], pair[1])),
                    pair => Err(BridgeError::shape(
                        what,
                        "rows of 2 values",
                        format!("a row of {} values", pair.len()),
                    )),
                })
                .collect::<BridgeResult<_>>()?
        }
        other => {
            return Err(BridgeError::Conversion(format!(
                "{}: expected an array of shape ({}, 2), got '{}'",
                what,
                rows,
                other.type_name()
            )))
        }
    };

    pairs
        .into_iter()
        .map(|(lower, upper)| Interval::new(lower, upper).map_err(BridgeError::from))
        .collect()
}

/// Constraint bounds: a bare `(lower, upper)` pair for a scalar constraint,
/// otherwise `(m, 2)` rows
fn constraint_bounds(value: &Value, outputs: usize) -> BridgeResult<Vec<Interval>> {
    if outputs == 1 {
        if let Some(items) = value.as_sequence() {
            if let [lower, upper] = items.as_slice() {
                if let (Some(lower), Some(upper)) = (lower.as_float(), upper.as_float()) {
                    return Ok(vec![Interval::new(lower, upper)?]);
                }
            }
        }
    }
    intervals_from_host(value, "constraint bounds", outputs)
}

fn intervals_to_host(bounds: &[Interval]) -> BridgeResult<Value> {
    let data = bounds.iter().flat_map(|b| [b.lower, b.upper]).collect();
    Ok(Value::Array(NdArray::matrix(bounds.len(), 2, data)?))
}

/// `Problem(cost)`
pub fn problem(args: &[Value]) -> BridgeResult<Value> {
    let cost = shared_function(&args[0])?;
    let problem = Problem::new(cost)?;
    Ok(registry::wrap_value(Rc::new(ProblemObject::new(problem))))
}

pub fn get_starting_point(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    p.read(|problem| match problem.starting_point() {
        Some(x) => x.to_host(),
        None => Value::None,
    })
}

pub fn set_starting_point(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    let x: Vec<f64> = arg(args, 1, "x")?;
    p.write(|problem| problem.set_starting_point(x))??;
    Ok(Value::None)
}

/// `(n, 2)` array of `[lower, upper]` rows
pub fn get_argument_bounds(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    let bounds = p.read(|problem| problem.argument_bounds().to_vec())?;
    intervals_to_host(&bounds)
}

pub fn set_argument_bounds(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    let n = p.read(Problem::input_size)?;
    let bounds = intervals_from_host(&args[1], "argument bounds", n)?;
    p.write(|problem| problem.set_argument_bounds(bounds))??;
    Ok(Value::None)
}

pub fn get_argument_scales(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    p.read(|problem| problem.argument_scales().to_host())
}

pub fn set_argument_scales(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    let scales: Vec<f64> = arg(args, 1, "scales")?;
    p.write(|problem| problem.set_argument_scales(scales))??;
    Ok(Value::None)
}

/// `addConstraint(problem, f, bounds[, scales])`
///
/// `bounds` is `(lower, upper)` when `f` has one output, `(m, 2)` otherwise.
pub fn add_constraint(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    let function = shared_function(&args[1])?;
    let bounds = constraint_bounds(&args[2], function.output_size())?;
    let scales = match optional(args, 3) {
        Some(scales) => Some(<Vec<f64> as crate::codec::FromHost>::from_host(scales)?),
        None => None,
    };
    p.write(|problem| problem.add_constraint(function, bounds, scales))??;
    Ok(Value::None)
}

pub fn str_problem(args: &[Value]) -> BridgeResult<Value> {
    let p = borrow::<ProblemObject>(&args[0])?;
    p.read(|problem| Value::str(&problem.to_string()))
}
