//! Iteration callbacks
//!
//! Iterative solvers call an [`IterationCallback`] once per iteration with the
//! problem and a mutable state. Callbacks may edit the state (for instance set
//! the `stop` flag); an error aborts the solve.

use crate::problem::Problem;
use crate::state::SolverState;
use crate::{EngineError, EngineResult};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub trait IterationCallback {
    fn on_iteration(&self, problem: &Problem, state: &mut SolverState) -> EngineResult<()>;
}

/// Fans one solver callback slot out to a list of callbacks
///
/// Callbacks run in insertion order. The list may be edited from inside a
/// callback; edits take effect from the next iteration.
#[derive(Default)]
pub struct Multiplexer {
    callbacks: RefCell<Vec<Rc<dyn IterationCallback>>>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: Rc<dyn IterationCallback>) {
        self.callbacks.borrow_mut().push(callback);
    }

    pub fn remove(&self, index: usize) -> EngineResult<Rc<dyn IterationCallback>> {
        let mut callbacks = self.callbacks.borrow_mut();
        if index >= callbacks.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: callbacks.len(),
            });
        }
        Ok(callbacks.remove(index))
    }

    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }
}

impl IterationCallback for Multiplexer {
    fn on_iteration(&self, problem: &Problem, state: &mut SolverState) -> EngineResult<()> {
        let snapshot: Vec<_> = self.callbacks.borrow().clone();
        for callback in snapshot {
            callback.on_iteration(problem, state)?;
        }
        Ok(())
    }
}

/// One logged iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: usize,
    pub x: Vec<f64>,
    pub cost: Option<f64>,
    pub constraint_violation: Option<f64>,
}

pub const JOURNAL_FILE: &str = "journal.log";
pub const ITERATIONS_FILE: &str = "iterations.json";

/// Records every iteration and writes them to a directory when dropped
///
/// Output files: `journal.log` (text) and `iterations.json`.
pub struct OptimizationLogger {
    directory: PathBuf,
    header: String,
    records: RefCell<Vec<IterationRecord>>,
    flushed: Cell<bool>,
}

impl OptimizationLogger {
    /// Create the output directory and start an empty log. `header` is written
    /// at the top of the journal.
    pub fn new(directory: impl Into<PathBuf>, header: impl Into<String>) -> EngineResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            header: header.into(),
            records: RefCell::new(Vec::new()),
            flushed: Cell::new(false),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn records(&self) -> Vec<IterationRecord> {
        self.records.borrow().clone()
    }

    /// Write both output files. Called automatically on drop.
    pub fn flush(&self) -> EngineResult<()> {
        let records = self.records.borrow();

        let mut journal = fs::File::create(self.directory.join(JOURNAL_FILE))?;
        writeln!(journal, "{}", self.header)?;
        for record in records.iter() {
            writeln!(journal)?;
            writeln!(journal, "Iteration {}", record.iteration)?;
            writeln!(journal, "  x: {}", crate::format_vector(&record.x))?;
            if let Some(cost) = record.cost {
                writeln!(journal, "  Cost: {}", cost)?;
            }
            if let Some(v) = record.constraint_violation {
                writeln!(journal, "  Constraint violation: {}", v)?;
            }
        }

        let json = serde_json::to_string_pretty(&*records)?;
        fs::write(self.directory.join(ITERATIONS_FILE), json)?;

        self.flushed.set(true);
        tracing::debug!(
            directory = %self.directory.display(),
            iterations = records.len(),
            "optimization log written"
        );
        Ok(())
    }
}

impl IterationCallback for OptimizationLogger {
    fn on_iteration(&self, _problem: &Problem, state: &mut SolverState) -> EngineResult<()> {
        let mut records = self.records.borrow_mut();
        let iteration = records.len();
        records.push(IterationRecord {
            iteration,
            x: state.x.clone(),
            cost: state.cost,
            constraint_violation: state.constraint_violation,
        });
        self.flushed.set(false);
        Ok(())
    }
}

impl Drop for OptimizationLogger {
    fn drop(&mut self) {
        if self.flushed.get() {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(
                directory = %self.directory.display(),
                error = %e,
                "failed to write optimization log"
            );
        }
    }
}
