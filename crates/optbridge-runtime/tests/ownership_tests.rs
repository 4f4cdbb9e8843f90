//! Handle lifetimes and host reference balance

mod common;

use common::*;
#[allow(unused_imports)]
use common::{assert_eq, assert_ne};
use optbridge_runtime::glue::{HostRef, SharedRef};
use optbridge_runtime::host::{Callable, Value};
use optbridge_runtime::registry::{self, NativeObject, TypeTag};
use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

struct Counted {
    released: Rc<Cell<u32>>,
}

impl NativeObject for Counted {
    const TAG: TypeTag = TypeTag::SolverCallback;

    fn release(self: Rc<Self>) {
        self.released.set(self.released.get() + 1);
    }
}

fn counted() -> (Value, Rc<Cell<u32>>) {
    let released = Rc::new(Cell::new(0));
    let handle = registry::wrap_value(Rc::new(Counted {
        released: Rc::clone(&released),
    }));
    (handle, released)
}

#[test]
fn test_release_runs_once_when_last_reference_goes() {
    let (handle, released) = counted();
    let shared = SharedRef::<Counted>::from_handle(&handle).unwrap();
    drop(handle);
    assert_eq!(released.get(), 0);
    assert!(shared.host_ref().value().refcount() == Some(1));
    drop(shared);
    assert_eq!(released.get(), 1);
}

#[test]
fn test_problem_keeps_its_cost_function_alive() {
    let m = module();
    let before = registry::live_handles_of(TypeTag::Function);
    let f = sphere(&m);
    let problem = call(&m, "Problem", &[f.clone()]);

    drop(f);
    assert_eq!(registry::live_handles_of(TypeTag::Function), before + 1);

    drop(problem);
    assert_eq!(registry::live_handles_of(TypeTag::Function), before);
}

#[test]
fn test_solver_outlives_problem_handle() {
    let m = module();
    let problem = sphere_problem(&m, &[3.0, 4.0]);
    let solver = call(&m, "Solver", &[Value::str("gradient-descent"), problem.clone()]);
    drop(problem);
    assert_eq!(registry::live_handles_of(TypeTag::Problem), 0);

    call(&m, "solve", &[solver.clone()]);
    let (tag, _) = minimum(&m, &solver);
    assert_eq!(tag, "Result");
}

#[test]
fn test_every_handle_is_released() {
    let m = module();
    {
        let problem = sphere_problem(&m, &[1.0, 1.0]);
        let solver = call(&m, "Solver", &[problem.clone()]);
        let mux = call(&m, "Multiplexer", &[solver.clone()]);
        let cb = call(&m, "SolverCallback", &[problem.clone()]);
        let noop: Value = Callable::new("noop", |_| Ok(Value::None)).into();
        call(&m, "bindSolverCallback", &[cb.clone(), noop]);
        call(&m, "addIterationCallback", &[mux.clone(), cb]);
        call(&m, "solve", &[solver.clone()]);
        let _result = minimum(&m, &solver);
        assert!(registry::live_handles() > 0);
    }
    assert_eq!(registry::live_handles(), 0);
}

#[test]
fn test_host_ref_counts_one_hold() {
    let owner = Value::list(vec![]);
    let hold = HostRef::acquire(&owner);
    let copies: Vec<HostRef> = (0..4).map(|_| hold.clone()).collect();
    assert_eq!(owner.refcount(), Some(2));
    assert_eq!(hold.copies(), 5);
    drop(copies);
    drop(hold);
    assert_eq!(owner.refcount(), Some(1));
}

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Clone(usize),
    Drop(usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            Just(Op::Acquire),
            any::<usize>().prop_map(Op::Clone),
            any::<usize>().prop_map(Op::Drop),
        ],
        0..40,
    )
}

proptest! {
    #[test]
    fn prop_holds_balance_in_any_order(ops in ops()) {
        let (handle, released) = counted();
        let base = handle.refcount().unwrap();
        let mut live: Vec<SharedRef<Counted>> = Vec::new();
        let mut holds = 0usize;

        for op in ops {
            match op {
                Op::Acquire => {
                    live.push(SharedRef::from_handle(&handle).unwrap());
                    holds += 1;
                }
                Op::Clone(i) if !live.is_empty() => {
                    let copy = live[i % live.len()].clone();
                    live.push(copy);
                }
                Op::Drop(i) if !live.is_empty() => {
                    let index = i % live.len();
                    let dropped = live.swap_remove(index);
                    let last_copy = dropped.host_ref().copies() == 1;
                    drop(dropped);
                    if last_copy {
                        holds -= 1;
                    }
                }
                _ => {}
            }
            prop_assert_eq!(handle.refcount(), Some(base + holds));
        }

        drop(live);
        prop_assert_eq!(handle.refcount(), Some(base));
        drop(handle);
        prop_assert_eq!(released.get(), 1);
    }
}
