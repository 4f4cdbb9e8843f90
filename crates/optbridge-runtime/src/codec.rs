//! Conversion between host values and native parameters
//!
//! [`FromHost`] and [`ToHost`] convert single values. Solver parameters accept
//! text, integers (32-bit) and reals. State parameters also accept booleans and
//! 1-D arrays; an array backed by shared storage is taken without copying, and
//! native vectors go back to the host over the same storage.
//!
//! Bulk conversion reads a host dict of `key -> (description, value)`. Entries
//! with a non-text key, a value that is not a 2-element tuple or list, or a
//! non-text description are skipped with a warning; in strict mode they are
//! errors. A value of an unsupported type fails the whole call.

use crate::errors::{BridgeError, BridgeResult};
use crate::host::{self, Dict, NdArray, Shape, Value};
use optbridge_engine::{
    Parameter, ParameterValue, Parameters, StateParameter, StateParameterValue, StateParameters,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Host warning category for skipped entries
pub const CONFIGURATION_WARNING: &str = "ConfigurationWarning";

/// Convert a host value into a native value
pub trait FromHost: Sized {
    fn from_host(value: &Value) -> BridgeResult<Self>;
}

/// Convert a native value into a host value
pub trait ToHost {
    fn to_host(&self) -> Value;
}

fn conversion(expected: &str, value: &Value) -> BridgeError {
    BridgeError::Conversion(format!(
        "expected {}, got '{}'",
        expected,
        value.type_name()
    ))
}

fn text(value: &Value) -> BridgeResult<String> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        Value::Bytes(b) => std::str::from_utf8(b)
            .map(str::to_string)
            .map_err(|_| BridgeError::Conversion("bytes value is not valid UTF-8".to_string())),
        other => Err(conversion("text", other)),
    }
}

fn int32(i: i64) -> BridgeResult<i32> {
    i32::try_from(i)
        .map_err(|_| BridgeError::Conversion(format!("integer {} does not fit in 32 bits", i)))
}

impl FromHost for f64 {
    fn from_host(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(conversion("a number", other)),
        }
    }
}

impl FromHost for usize {
    fn from_host(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Int(i) => usize::try_from(*i).map_err(|_| {
                BridgeError::Conversion(format!("expected a non-negative integer, got {}", i))
            }),
            other => Err(conversion("an integer", other)),
        }
    }
}

impl FromHost for String {
    fn from_host(value: &Value) -> BridgeResult<Self> {
        text(value)
    }
}

/// Numbers from a 1-D array, list or tuple (copied)
impl FromHost for Vec<f64> {
    fn from_host(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Array(array) => match array.shape()? {
                Shape::Vector(_) => Ok(array.to_vec()?),
                shape => Err(BridgeError::shape("vector", "a 1-D array", shape)),
            },
            Value::List(_) | Value::Tuple(_) => value
                .as_sequence()
                .unwrap_or_default()
                .iter()
                .map(f64::from_host)
                .collect(),
            other => Err(conversion("an array of numbers", other)),
        }
    }
}

impl FromHost for ParameterValue {
    fn from_host(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Str(_) | Value::Bytes(_) => Ok(ParameterValue::Text(text(value)?)),
            Value::Int(i) => Ok(ParameterValue::Int(int32(*i)?)),
            Value::Float(f) => Ok(ParameterValue::Real(*f)),
            other => Err(BridgeError::Conversion(format!(
                "unsupported solver parameter type '{}'",
                other.type_name()
            ))),
        }
    }
}

impl FromHost for StateParameterValue {
    fn from_host(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Bool(b) => Ok(StateParameterValue::Bool(*b)),
            Value::Array(array) => Ok(StateParameterValue::Vector(shared_vector(array)?)),
            Value::Str(_) | Value::Bytes(_) => Ok(StateParameterValue::Text(text(value)?)),
            Value::Int(i) => Ok(StateParameterValue::Int(int32(*i)?)),
            Value::Float(f) => Ok(StateParameterValue::Real(*f)),
            other => Err(BridgeError::Conversion(format!(
                "unsupported state parameter type '{}'",
                other.type_name()
            ))),
        }
    }
}

/// Storage of a 1-D array; views and pinned arrays are copied into new storage
fn shared_vector(array: &NdArray) -> BridgeResult<optbridge_engine::SharedVector> {
    if let Shape::Matrix(..) = array.shape()? {
        return Err(BridgeError::Conversion(
            "state parameter vectors must be 1-D arrays".to_string(),
        ));
    }
    match array.shared_vector() {
        Some(data) => Ok(data),
        None => Ok(Rc::new(RefCell::new(array.to_vec()?))),
    }
}

impl ToHost for f64 {
    fn to_host(&self) -> Value {
        Value::Float(*self)
    }
}

impl ToHost for String {
    fn to_host(&self) -> Value {
        Value::str(self)
    }
}

/// Copies into a new array
impl ToHost for [f64] {
    fn to_host(&self) -> Value {
        Value::array(self.to_vec())
    }
}

impl ToHost for ParameterValue {
    fn to_host(&self) -> Value {
        match self {
            ParameterValue::Real(v) => Value::Float(*v),
            ParameterValue::Int(v) => Value::Int(i64::from(*v)),
            ParameterValue::Text(s) => Value::str(s),
        }
    }
}

impl ToHost for StateParameterValue {
    fn to_host(&self) -> Value {
        match self {
            StateParameterValue::Real(v) => Value::Float(*v),
            StateParameterValue::Int(v) => Value::Int(i64::from(*v)),
            StateParameterValue::Text(s) => Value::str(s),
            StateParameterValue::Bool(b) => Value::Bool(*b),
            StateParameterValue::Vector(data) => Value::Array(NdArray::from_shared(Rc::clone(data))),
        }
    }
}

/// Outcome of a bulk conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterReport {
    pub applied: usize,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: String,
}

impl ToHost for ParameterReport {
    fn to_host(&self) -> Value {
        let report = Dict::new();
        report.insert(Value::str("applied"), Value::Int(self.applied as i64));
        let skipped = self.skipped.iter().map(|s| Value::str(&s.key)).collect();
        report.insert(Value::str("skipped"), Value::list(skipped));
        Value::Dict(report)
    }
}

impl ParameterReport {
    fn skip(&mut self, what: &str, key: String, reason: &str, strict: bool) -> BridgeResult<()> {
        if strict {
            return Err(BridgeError::Conversion(format!(
                "malformed {} entry {}: {}",
                what, key, reason
            )));
        }
        tracing::warn!(key = %key, reason, "{} entry skipped", what);
        host::warn(
            CONFIGURATION_WARNING,
            format!("{} entry {} skipped: {}", what, key, reason),
        );
        self.skipped.push(SkippedEntry {
            key,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

fn entries_from_host<V: FromHost>(
    value: &Value,
    what: &str,
    strict: bool,
) -> BridgeResult<(BTreeMap<String, (String, V)>, ParameterReport)> {
    let Value::Dict(dict) = value else {
        return Err(BridgeError::type_mismatch("dict", value.type_name()));
    };

    let mut entries = BTreeMap::new();
    let mut report = ParameterReport::default();

    for (key, entry) in dict.entries() {
        let Some(name) = key.as_text() else {
            report.skip(what, format!("{:?}", key), "key is not a string", strict)?;
            continue;
        };
        let pair = match entry.as_sequence() {
            Some(items) if items.len() == 2 => items,
            _ => {
                report.skip(
                    what,
                    format!("'{}'", name),
                    "value is not a (description, value) pair",
                    strict,
                )?;
                continue;
            }
        };
        let Some(description) = pair[0].as_text() else {
            report.skip(what, format!("'{}'", name), "description is not a string", strict)?;
            continue;
        };
        let value = V::from_host(&pair[1]).map_err(|e| match e {
            BridgeError::Conversion(msg) => {
                BridgeError::Conversion(format!("{} '{}': {}", what, name, msg))
            }
            other => other,
        })?;
        entries.insert(name, (description, value));
        report.applied += 1;
    }

    Ok((entries, report))
}

/// Convert a host dict into solver parameters
pub fn parameters_from_host(value: &Value, strict: bool) -> BridgeResult<(Parameters, ParameterReport)> {
    let (entries, report) = entries_from_host::<ParameterValue>(value, "solver parameter", strict)?;
    let parameters = entries
        .into_iter()
        .map(|(k, (description, value))| (k, Parameter { description, value }))
        .collect();
    Ok((parameters, report))
}

/// Convert a host dict into state parameters
pub fn state_parameters_from_host(
    value: &Value,
    strict: bool,
) -> BridgeResult<(StateParameters, ParameterReport)> {
    let (entries, report) =
        entries_from_host::<StateParameterValue>(value, "state parameter", strict)?;
    let parameters = entries
        .into_iter()
        .map(|(k, (description, value))| (k, StateParameter { description, value }))
        .collect();
    Ok((parameters, report))
}

fn entry(description: &str, value: Value) -> Value {
    Value::tuple(vec![Value::str(description), value])
}

pub fn parameters_to_host(parameters: &Parameters) -> Value {
    Value::Dict(
        parameters
            .iter()
            .map(|(k, p)| (Value::str(k), entry(&p.description, p.value.to_host())))
            .collect(),
    )
}

pub fn state_parameters_to_host(parameters: &StateParameters) -> Value {
    Value::Dict(
        parameters
            .iter()
            .map(|(k, p)| (Value::str(k), entry(&p.description, p.value.to_host())))
            .collect(),
    )
}
