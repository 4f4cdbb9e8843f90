//! Host value representation
//!
//! - None, Bool, Int, Float: immediate values
//! - Str, Bytes, Tuple: immutable, reference-counted
//! - List, Dict: shared and mutable (`Rc<RefCell<..>>`)
//! - Array: numeric arrays, see [`super::array`]
//! - Function, Object: callables and attribute bags
//! - Capsule: an opaque handle to a native object
//!
//! Reference-counted variants expose their host reference count through
//! [`Value::refcount`]; that is the count native code must keep balanced.

use super::array::NdArray;
use super::exception::HostException;
use crate::registry::Capsule;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Body of a host function
pub type HostFn = dyn Fn(&[Value]) -> Result<Value, HostException>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Array(NdArray),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Dict),
    Function(Callable),
    Object(HostObject),
    Capsule(Capsule),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Rc::from(b))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn array(data: Vec<f64>) -> Self {
        Value::Array(NdArray::from_vec(data))
    }

    /// Host type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "ndarray",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Object(_) => "object",
            Value::Capsule(_) => "PyCapsule",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Host reference count of a reference-counted value
    pub fn refcount(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(Rc::strong_count(s)),
            Value::Bytes(b) => Some(Rc::strong_count(b)),
            Value::List(l) => Some(Rc::strong_count(l)),
            Value::Tuple(t) => Some(Rc::strong_count(t)),
            Value::Dict(d) => Some(Rc::strong_count(&d.0)),
            Value::Function(c) => Some(Rc::strong_count(&c.0)),
            Value::Object(o) => Some(Rc::strong_count(&o.0)),
            Value::Capsule(c) => Some(c.refcount()),
            _ => None,
        }
    }

    /// Identity comparison, like the host's `is`
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Bytes(a), Value::Bytes(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Capsule(a), Value::Capsule(b)) => a.same_handle(b),
            (Value::Array(a), Value::Array(b)) => a.same_buffer(b),
            _ => false,
        }
    }

    /// Text of a `str`, or of `bytes` holding UTF-8
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.to_string()),
            Value::Bytes(b) => std::str::from_utf8(b).ok().map(str::to_string),
            _ => None,
        }
    }

    /// Items of a tuple or list
    pub fn as_sequence(&self) -> Option<Vec<Value>> {
        match self {
            Value::Tuple(items) => Some(items.to_vec()),
            Value::List(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::Array(a) => write!(f, "{:?}", a),
            Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items.iter() {
                    t.field(item);
                }
                t.finish()
            }
            Value::Dict(d) => f
                .debug_map()
                .entries(d.entries().iter().map(|(k, v)| (k.clone(), v.clone())))
                .finish(),
            Value::Function(c) => write!(f, "<function {}>", c.name()),
            Value::Object(o) => write!(f, "<{} object>", o.class_name()),
            Value::Capsule(c) => write!(f, "<capsule {}>", c.tag().name()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<Capsule> for Value {
    fn from(c: Capsule) -> Self {
        Value::Capsule(c)
    }
}

/// Insertion-ordered dictionary
#[derive(Clone, Default)]
pub struct Dict(Rc<RefCell<Vec<(Value, Value)>>>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Keys compare by value for scalars and text.
    pub fn insert(&self, key: Value, value: Value) {
        let mut entries = self.0.borrow_mut();
        match entries.iter_mut().find(|(k, _)| keys_equal(k, &key)) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .borrow()
            .iter()
            .find(|(k, _)| matches!(k, Value::Str(s) if &**s == key))
            .map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Snapshot of the entries in insertion order
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.0.borrow().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter_map(|(k, _)| k.as_text())
            .collect()
    }
}

impl FromIterator<(Value, Value)> for Dict {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

fn keys_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => a.is(b),
    }
}

struct CallableInner {
    name: String,
    file: String,
    line: u32,
    body: Box<HostFn>,
}

/// A host function
///
/// `file` and `line` locate the definition; they appear in tracebacks.
#[derive(Clone)]
pub struct Callable(Rc<CallableInner>);

impl Callable {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostException> + 'static,
    {
        Self::at(name, "<host>", 1, body)
    }

    pub fn at<F>(name: impl Into<String>, file: impl Into<String>, line: u32, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostException> + 'static,
    {
        Callable(Rc::new(CallableInner {
            name: name.into(),
            file: file.into(),
            line,
            body: Box::new(body),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn file(&self) -> &str {
        &self.0.file
    }

    pub fn line(&self) -> u32 {
        self.0.line
    }

    pub(crate) fn invoke(&self, args: &[Value]) -> Result<Value, HostException> {
        (self.0.body)(args)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Function(c)
    }
}

struct ObjectInner {
    class_name: String,
    attrs: RefCell<Vec<(String, Value)>>,
}

/// A host object with named attributes
///
/// An object whose `__call__` attribute is a function is callable.
#[derive(Clone)]
pub struct HostObject(Rc<ObjectInner>);

impl HostObject {
    pub fn new(class_name: impl Into<String>) -> Self {
        HostObject(Rc::new(ObjectInner {
            class_name: class_name.into(),
            attrs: RefCell::new(Vec::new()),
        }))
    }

    pub fn class_name(&self) -> &str {
        &self.0.class_name
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.0
            .attrs
            .borrow()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set_attr(&self, name: &str, value: Value) {
        let mut attrs = self.0.attrs.borrow_mut();
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => attrs.push((name.to_string(), value)),
        }
    }

    /// Remove an attribute, returning it
    pub fn del_attr(&self, name: &str) -> Option<Value> {
        let mut attrs = self.0.attrs.borrow_mut();
        let index = attrs.iter().position(|(k, _)| k == name)?;
        Some(attrs.remove(index).1)
    }
}

impl From<HostObject> for Value {
    fn from(o: HostObject) -> Self {
        Value::Object(o)
    }
}
