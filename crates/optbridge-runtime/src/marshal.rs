//! Solver outcomes as host values
//!
//! `minimum` hands the outcome of a solve to the host as `(tag, handle)`, with
//! the tag naming which of the three result records the handle holds. A solver
//! that has not produced an outcome is an error, never a result.
//!
//! Records convert to host dicts with array fields that are read-only views
//! pinned to the native record.

use crate::errors::{BridgeError, BridgeResult};
use crate::host::{Dict, NdArray, Value};
use crate::registry::{self, NativeObject, TypeTag};
use optbridge_engine::{OptimResult, ResultWithWarnings, SolverError, SolverOutcome};
use std::rc::Rc;

impl NativeObject for OptimResult {
    const TAG: TypeTag = TypeTag::Result;
}

impl NativeObject for ResultWithWarnings {
    const TAG: TypeTag = TypeTag::ResultWithWarnings;
}

impl NativeObject for SolverError {
    const TAG: TypeTag = TypeTag::SolverError;
}

/// `(tag, handle)` for a solver outcome
pub fn outcome_to_host(outcome: &SolverOutcome) -> BridgeResult<Value> {
    let (tag, handle) = match outcome {
        SolverOutcome::NoSolution => return Err(BridgeError::NoSolution),
        SolverOutcome::Value(r) => (TypeTag::Result, registry::wrap_value(Rc::new(r.clone()))),
        SolverOutcome::ValueWithWarnings(r) => (
            TypeTag::ResultWithWarnings,
            registry::wrap_value(Rc::new(r.clone())),
        ),
        SolverOutcome::Error(e) => (TypeTag::SolverError, registry::wrap_value(Rc::new(e.clone()))),
    };
    Ok(Value::tuple(vec![Value::str(tag.name()), handle]))
}

fn insert_record<T: 'static>(dict: &Dict, owner: &Rc<T>, record: fn(&T) -> &OptimResult) {
    let result = record(owner);
    dict.insert(Value::str("inputSize"), Value::Int(result.input_size as i64));
    dict.insert(Value::str("outputSize"), Value::Int(result.output_size as i64));

    let fields: [(&str, fn(&OptimResult) -> &[f64]); 4] = [
        ("x", |r| r.x.as_slice()),
        ("value", |r| r.value.as_slice()),
        ("constraints", |r| r.constraints.as_slice()),
        ("lambda", |r| r.lambda.as_slice()),
    ];
    for (name, field) in fields {
        let view = NdArray::pinned(Rc::clone(owner), move |t: &T| field(record(t)));
        dict.insert(Value::str(name), Value::Array(view));
    }
}

/// Host dict for a plain result
pub fn result_to_dict(result: &Rc<OptimResult>) -> Value {
    let dict = Dict::new();
    insert_record(&dict, result, |r| r);
    Value::Dict(dict)
}

/// Host dict for a result with warnings
pub fn result_with_warnings_to_dict(result: &Rc<ResultWithWarnings>) -> Value {
    let dict = Dict::new();
    insert_record(&dict, result, |r| &r.result);
    let warnings = result.warnings.iter().map(|w| Value::str(w)).collect();
    dict.insert(Value::str("warnings"), Value::list(warnings));
    Value::Dict(dict)
}

/// Host dict for a solver error
pub fn solver_error_to_dict(error: &SolverError) -> Value {
    let dict = Dict::new();
    dict.insert(Value::str("error"), Value::str(&error.message));
    if let Some(last) = &error.last_state {
        dict.insert(Value::str("lastState"), result_to_dict(&Rc::new(last.clone())));
    }
    Value::Dict(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OptimResult {
        OptimResult {
            input_size: 2,
            output_size: 1,
            x: vec![1.0, 2.0],
            value: vec![5.0],
            constraints: vec![],
            lambda: vec![],
        }
    }

    #[test]
    fn test_no_solution_is_an_error() {
        assert_eq!(
            outcome_to_host(&SolverOutcome::NoSolution).unwrap_err(),
            BridgeError::NoSolution
        );
    }

    #[test]
    fn test_outcome_tag() {
        let value = outcome_to_host(&SolverOutcome::Error(SolverError::new("boom"))).unwrap();
        let items = value.as_sequence().unwrap();
        assert_eq!(items[0].as_text().as_deref(), Some("SolverError"));
        assert!(registry::unwrap::<SolverError>(&items[1]).is_ok());
    }

    #[test]
    fn test_record_views_pin_result() {
        let result = Rc::new(sample());
        let dict = result_to_dict(&result);
        let Value::Dict(dict) = dict else {
            panic!("expected a dict");
        };
        assert_eq!(
            dict.keys(),
            vec!["inputSize", "outputSize", "x", "value", "constraints", "lambda"]
        );
        let Some(Value::Array(x)) = dict.get("x") else {
            panic!("expected an array");
        };
        assert_eq!(x.data_ptr().unwrap(), result.x.as_ptr());
        assert!(!x.is_writable());
        drop(result);
        assert_eq!(x.to_vec().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_error_record_with_last_state() {
        let error = SolverError::new("failed").with_last_state(sample());
        let Value::Dict(dict) = solver_error_to_dict(&error) else {
            panic!("expected a dict");
        };
        assert_eq!(dict.keys(), vec!["error", "lastState"]);
        let Some(Value::Dict(last)) = dict.get("lastState") else {
            panic!("expected a nested record");
        };
        assert!(matches!(last.get("inputSize"), Some(Value::Int(2))));
    }
}
