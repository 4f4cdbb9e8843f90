//! Printed forms and result dicts

use crate::api::functions::FunctionObject;
use crate::errors::{BridgeError, BridgeResult};
use crate::glue::borrow;
use crate::host::Value;
use crate::marshal;
use crate::registry::{self, TypeTag};
use optbridge_engine::{OptimResult, ResultWithWarnings, SolverError};
use std::any::Any;
use std::rc::Rc;

fn downcast<T: Any>(object: Rc<dyn Any>, tag: TypeTag) -> BridgeResult<Rc<T>> {
    object
        .downcast::<T>()
        .map_err(|_| BridgeError::type_mismatch(tag.name(), "a mismatched native object"))
}

pub fn str_function(args: &[Value]) -> BridgeResult<Value> {
    let f = borrow::<FunctionObject>(&args[0])?;
    Ok(Value::str(&f.function().to_string()))
}

/// `strResult(result)`; a result with warnings prints its inner result
pub fn str_result(args: &[Value]) -> BridgeResult<Value> {
    let (tag, object) = registry::unwrap_any(&args[0], &[TypeTag::Result, TypeTag::ResultWithWarnings])?;
    let text = match tag {
        TypeTag::ResultWithWarnings => downcast::<ResultWithWarnings>(object, tag)?.result.to_string(),
        _ => downcast::<OptimResult>(object, tag)?.to_string(),
    };
    Ok(Value::str(&text))
}

pub fn str_result_with_warnings(args: &[Value]) -> BridgeResult<Value> {
    let r = borrow::<ResultWithWarnings>(&args[0])?;
    Ok(Value::str(&r.to_string()))
}

pub fn str_solver_error(args: &[Value]) -> BridgeResult<Value> {
    let e = borrow::<SolverError>(&args[0])?;
    Ok(Value::str(&e.to_string()))
}

/// `resultToDict(result)`
pub fn result_to_dict(args: &[Value]) -> BridgeResult<Value> {
    let r = borrow::<OptimResult>(&args[0])?;
    Ok(marshal::result_to_dict(r.native()))
}

/// `resultWithWarningsToDict(result)`
pub fn result_with_warnings_to_dict(args: &[Value]) -> BridgeResult<Value> {
    let r = borrow::<ResultWithWarnings>(&args[0])?;
    Ok(marshal::result_with_warnings_to_dict(r.native()))
}

/// `solverErrorToDict(error)`
pub fn solver_error_to_dict(args: &[Value]) -> BridgeResult<Value> {
    let e = borrow::<SolverError>(&args[0])?;
    Ok(marshal::solver_error_to_dict(&e))
}
