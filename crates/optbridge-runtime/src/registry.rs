//! Handle registry
//!
//! Native objects cross into the host as [`Capsule`]s: opaque tokens tagged
//! with the object's [`TypeTag`]. The registry maps tokens to the objects and
//! runs the per-type release hook exactly once, when the last host reference
//! to the capsule goes away or when the handle is revoked.
//!
//! Tokens start at 1 and are never reused within a thread.

use crate::errors::{BridgeError, BridgeResult};
use crate::host::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Native type carried by a capsule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Function,
    Problem,
    Solver,
    SolverState,
    Logger,
    Result,
    ResultWithWarnings,
    SolverError,
    Multiplexer,
    SolverCallback,
}

impl TypeTag {
    /// Name shown to the host
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Function => "Function",
            TypeTag::Problem => "Problem",
            TypeTag::Solver => "Solver",
            TypeTag::SolverState => "SolverState",
            TypeTag::Logger => "OptimizationLogger",
            TypeTag::Result => "Result",
            TypeTag::ResultWithWarnings => "ResultWithWarnings",
            TypeTag::SolverError => "SolverError",
            TypeTag::Multiplexer => "Multiplexer",
            TypeTag::SolverCallback => "SolverCallback",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A native type that can be handed to the host
pub trait NativeObject: Any {
    const TAG: TypeTag;

    /// Runs once when the handle is released. The default just drops.
    fn release(self: Rc<Self>) {}
}

struct Entry {
    tag: TypeTag,
    object: Rc<dyn Any>,
    destructor: fn(Rc<dyn Any>),
}

struct Registry {
    next_token: u64,
    entries: HashMap<u64, Entry>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry {
        next_token: 1,
        entries: HashMap::new(),
    });
}

fn destroy<T: NativeObject>(object: Rc<dyn Any>) {
    if let Ok(object) = object.downcast::<T>() {
        object.release();
    }
}

struct CapsuleInner {
    token: u64,
    tag: TypeTag,
}

impl Drop for CapsuleInner {
    fn drop(&mut self) {
        release(self.token);
    }
}

/// Opaque host handle to a registered native object
#[derive(Clone)]
pub struct Capsule(Rc<CapsuleInner>);

impl Capsule {
    pub fn token(&self) -> u64 {
        self.0.token
    }

    pub fn tag(&self) -> TypeTag {
        self.0.tag
    }

    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn same_handle(&self, other: &Capsule) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// False once the entry has been released or revoked
    pub fn is_live(&self) -> bool {
        REGISTRY
            .try_with(|r| r.borrow().entries.contains_key(&self.0.token))
            .unwrap_or(false)
    }
}

/// Register `object` and return its host handle
pub fn wrap<T: NativeObject>(object: Rc<T>) -> Capsule {
    let tag = T::TAG;
    let token = REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        let token = registry.next_token;
        registry.next_token += 1;
        registry.entries.insert(
            token,
            Entry {
                tag,
                object,
                destructor: destroy::<T>,
            },
        );
        token
    });
    tracing::trace!(token, tag = tag.name(), "handle wrapped");
    Capsule(Rc::new(CapsuleInner { token, tag }))
}

/// Register `object` and return the handle as a host value
pub fn wrap_value<T: NativeObject>(object: Rc<T>) -> Value {
    Value::Capsule(wrap(object))
}

fn lookup(token: u64, tags: &[TypeTag]) -> Option<(TypeTag, Rc<dyn Any>)> {
    REGISTRY.with(|r| {
        r.borrow()
            .entries
            .get(&token)
            .filter(|entry| tags.contains(&entry.tag))
            .map(|entry| (entry.tag, Rc::clone(&entry.object)))
    })
}

/// Recover the native object behind a handle of type `T`
pub fn unwrap<T: NativeObject>(value: &Value) -> BridgeResult<Rc<T>> {
    let mismatch = || BridgeError::type_mismatch(T::TAG.name(), value.type_name());
    let Value::Capsule(capsule) = value else {
        return Err(mismatch());
    };
    lookup(capsule.token(), &[T::TAG])
        .and_then(|(_, object)| object.downcast::<T>().ok())
        .ok_or_else(mismatch)
}

/// Recover an object whose tag is any of `tags`
///
/// Returns the matching tag so the caller can downcast.
pub fn unwrap_any(value: &Value, tags: &[TypeTag]) -> BridgeResult<(TypeTag, Rc<dyn Any>)> {
    let expected = || {
        let names: Vec<&str> = tags.iter().map(|t| t.name()).collect();
        BridgeError::type_mismatch(names.join(" or "), value.type_name())
    };
    match value {
        Value::Capsule(capsule) => lookup(capsule.token(), tags).ok_or_else(expected),
        _ => Err(expected()),
    }
}

/// Run the release hook for `token`. Later calls are no-ops.
pub fn release(token: u64) {
    // Take the entry out first: the hook may re-enter the registry.
    let entry = REGISTRY
        .try_with(|r| r.borrow_mut().entries.remove(&token))
        .ok()
        .flatten();
    if let Some(entry) = entry {
        tracing::trace!(token, tag = entry.tag.name(), "handle released");
        (entry.destructor)(entry.object);
    }
}

/// Release a handle before the host lets go of it
///
/// Later unwraps fail with `TypeMismatch`.
pub fn revoke(capsule: &Capsule) {
    release(capsule.token());
}

/// Number of registered handles
pub fn live_handles() -> usize {
    REGISTRY.with(|r| r.borrow().entries.len())
}

pub fn live_handles_of(tag: TypeTag) -> usize {
    REGISTRY.with(|r| r.borrow().entries.values().filter(|e| e.tag == tag).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        released: Rc<Cell<u32>>,
    }

    impl NativeObject for Probe {
        const TAG: TypeTag = TypeTag::Problem;

        fn release(self: Rc<Self>) {
            self.released.set(self.released.get() + 1);
        }
    }

    struct Other;

    impl NativeObject for Other {
        const TAG: TypeTag = TypeTag::Solver;
    }

    #[test]
    fn test_wrap_unwrap_and_release_once() {
        let released = Rc::new(Cell::new(0));
        let value = wrap_value(Rc::new(Probe {
            released: Rc::clone(&released),
        }));
        let Value::Capsule(capsule) = &value else {
            panic!("expected a capsule");
        };
        assert!(capsule.token() > 0);
        assert_eq!(capsule.tag(), TypeTag::Problem);

        assert!(unwrap::<Probe>(&value).is_ok());
        let err = unwrap::<Other>(&value).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Solver object expected but another type was passed"
        );

        let copy = value.clone();
        drop(value);
        assert_eq!(released.get(), 0);
        drop(copy);
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_revoke_invalidates_handle() {
        let released = Rc::new(Cell::new(0));
        let value = wrap_value(Rc::new(Probe {
            released: Rc::clone(&released),
        }));
        let Value::Capsule(capsule) = value.clone() else {
            panic!("expected a capsule");
        };

        revoke(&capsule);
        assert_eq!(released.get(), 1);
        assert!(!capsule.is_live());
        assert!(unwrap::<Probe>(&value).is_err());

        drop(capsule);
        drop(value);
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_non_capsule_is_type_mismatch() {
        let err = unwrap::<Probe>(&Value::Int(4)).err().unwrap();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unwrap_any() {
        let value = wrap_value(Rc::new(Other));
        let (tag, _) = unwrap_any(&value, &[TypeTag::Problem, TypeTag::Solver]).unwrap();
        assert_eq!(tag, TypeTag::Solver);
        let err = unwrap_any(&value, &[TypeTag::Result, TypeTag::ResultWithWarnings])
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Result or ResultWithWarnings object expected but another type was passed"
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = wrap(Rc::new(Other));
        let b = wrap(Rc::new(Other));
        assert_ne!(a.token(), b.token());
        assert!(live_handles_of(TypeTag::Solver) >= 2);
    }
}
