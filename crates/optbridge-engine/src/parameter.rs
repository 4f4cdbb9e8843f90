//! Solver parameters and solver state parameters
//!
//! Solver parameters are scalar configuration (real, integer, text). State
//! parameters describe an iteration in progress and add booleans and vectors.
//! Both maps are keyed by name and carry a human-readable description.

use crate::format_vector;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Vector storage shared with the host without copying
pub type SharedVector = Rc<RefCell<Vec<f64>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Real(f64),
    Int(i32),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub description: String,
    pub value: ParameterValue,
}

pub type Parameters = BTreeMap<String, Parameter>;

#[derive(Debug, Clone)]
pub enum StateParameterValue {
    Real(f64),
    Int(i32),
    Text(String),
    Bool(bool),
    Vector(SharedVector),
}

// Vectors compare by content
impl PartialEq for StateParameterValue {
    fn eq(&self, other: &Self) -> bool {
        use StateParameterValue::*;
        match (self, other) {
            (Real(a), Real(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Vector(a), Vector(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateParameter {
    pub description: String,
    pub value: StateParameterValue,
}

pub type StateParameters = BTreeMap<String, StateParameter>;

impl Parameter {
    pub fn new(description: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            description: description.into(),
            value,
        }
    }
}

impl StateParameter {
    pub fn new(description: impl Into<String>, value: StateParameterValue) -> Self {
        Self {
            description: description.into(),
            value,
        }
    }
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Real(_) => "real",
            ParameterValue::Int(_) => "int",
            ParameterValue::Text(_) => "text",
        }
    }

    /// Numeric view; integers widen to reals
    pub fn as_real(&self) -> Option<f64> {
        match self {
            ParameterValue::Real(v) => Some(*v),
            ParameterValue::Int(v) => Some(f64::from(*v)),
            ParameterValue::Text(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl StateParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            StateParameterValue::Real(_) => "real",
            StateParameterValue::Int(_) => "int",
            StateParameterValue::Text(_) => "text",
            StateParameterValue::Bool(_) => "bool",
            StateParameterValue::Vector(_) => "vector",
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Real(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for StateParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateParameterValue::Real(v) => write!(f, "{}", v),
            StateParameterValue::Int(v) => write!(f, "{}", v),
            StateParameterValue::Text(s) => write!(f, "{}", s),
            StateParameterValue::Bool(b) => write!(f, "{}", b),
            StateParameterValue::Vector(v) => write!(f, "{}", format_vector(&v.borrow())),
        }
    }
}

/// Real-valued parameter lookup with a fallback
pub fn real_or(parameters: &Parameters, key: &str, default: f64) -> f64 {
    parameters
        .get(key)
        .and_then(|p| p.value.as_real())
        .unwrap_or(default)
}

/// Integer-valued parameter lookup with a fallback
pub fn int_or(parameters: &Parameters, key: &str, default: i32) -> i32 {
    parameters
        .get(key)
        .and_then(|p| p.value.as_int())
        .unwrap_or(default)
}

/// Write `key (description): value` lines, one per entry
pub fn write_entries<'a, V: fmt::Display + 'a>(
    f: &mut fmt::Formatter<'_>,
    indent: &str,
    entries: impl Iterator<Item = (&'a String, &'a String, &'a V)>,
) -> fmt::Result {
    for (key, description, value) in entries {
        write!(f, "\n{}{} ({}): {}", indent, key, description, value)?;
    }
    Ok(())
}
