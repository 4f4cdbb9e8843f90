//! Per-thread bridge context: installed settings and the execution token
//!
//! Bridge objects hold `Rc`s and are `!Send`, so every bridge lives on one
//! thread. Entry points run under an [`ExecutionToken`]; reentrant calls (a
//! host callable calling back into the bridge during an evaluation) nest and
//! are visible through [`depth`].

use optbridge_config::Settings;
use optbridge_engine::FiniteDifferenceRule;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;
use std::thread::{self, ThreadId};

thread_local! {
    static SETTINGS: RefCell<Rc<Settings>> = RefCell::new(Rc::new(Settings::default()));
    static DEPTH: Cell<usize> = Cell::new(0);
}

/// Install the settings read by the bridge on this thread
pub fn configure(settings: Settings) {
    tracing::debug!(plugin = %settings.default_plugin, strict = settings.strict_parameters, "bridge configured");
    SETTINGS.with(|s| *s.borrow_mut() = Rc::new(settings));
}

/// Current settings; defaults until [`configure`] is called
pub fn settings() -> Rc<Settings> {
    SETTINGS.with(|s| Rc::clone(&s.borrow()))
}

/// Configured finite-difference rule, as the engine names it
pub fn fd_rule() -> FiniteDifferenceRule {
    match settings().fd_rule {
        optbridge_config::FiniteDifferenceRule::Simple => FiniteDifferenceRule::Simple,
        optbridge_config::FiniteDifferenceRule::FivePoints => FiniteDifferenceRule::FivePoints,
    }
}

/// Proof that the current thread is executing a bridge entry point
///
/// The token is `!Send`: it is released on the thread that acquired it, and
/// the registry and settings it guards are per-thread. Embedding the bridge
/// in a host without a single execution lock needs a mutex around the whole
/// module.
pub struct ExecutionToken {
    owner: ThreadId,
    _not_send: PhantomData<Rc<()>>,
}

impl ExecutionToken {
    pub fn acquire() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        ExecutionToken {
            owner: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// Thread holding the token
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

impl Drop for ExecutionToken {
    fn drop(&mut self) {
        debug_assert_eq!(thread::current().id(), self.owner);
        DEPTH.with(|d| {
            debug_assert!(d.get() > 0, "execution token released twice");
            d.set(d.get().saturating_sub(1))
        });
    }
}

/// Number of entry points currently executing on this thread
pub fn depth() -> usize {
    DEPTH.with(Cell::get)
}
