//! Solver outcomes
//!
//! A solver holds exactly one [`SolverOutcome`]. `NoSolution` is only ever
//! observed before the first call to `solve`.

use crate::format_vector;
use serde::Serialize;
use std::fmt;

/// Minimum found by a solver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimResult {
    pub input_size: usize,
    pub output_size: usize,
    pub x: Vec<f64>,
    pub value: Vec<f64>,
    pub constraints: Vec<f64>,
    pub lambda: Vec<f64>,
}

/// Minimum found with warnings attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultWithWarnings {
    #[serde(flatten)]
    pub result: OptimResult,
    pub warnings: Vec<String>,
}

/// Solver failure, optionally with the last state reached
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverError {
    pub message: String,
    pub last_state: Option<OptimResult>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SolverOutcome {
    #[default]
    NoSolution,
    Value(OptimResult),
    ValueWithWarnings(ResultWithWarnings),
    Error(SolverError),
}

impl SolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            last_state: None,
        }
    }

    pub fn with_last_state(mut self, state: OptimResult) -> Self {
        self.last_state = Some(state);
        self
    }
}

impl SolverOutcome {
    /// Short status label
    pub fn status(&self) -> &'static str {
        match self {
            SolverOutcome::NoSolution => "no solution",
            SolverOutcome::Value(_) => "success",
            SolverOutcome::ValueWithWarnings(_) => "success with warnings",
            SolverOutcome::Error(_) => "error",
        }
    }

    pub fn is_solution(&self) -> bool {
        matches!(
            self,
            SolverOutcome::Value(_) | SolverOutcome::ValueWithWarnings(_)
        )
    }
}

impl OptimResult {
    fn write_body(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        write!(
            f,
            "{i}Size (input, output): {}, {}\n{i}X: {}\n{i}Value: {}\n{i}Constraints values: {}\n{i}Lagrange multipliers: {}",
            self.input_size,
            self.output_size,
            format_vector(&self.x),
            format_vector(&self.value),
            format_vector(&self.constraints),
            format_vector(&self.lambda),
            i = indent
        )
    }
}

impl fmt::Display for OptimResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Result:")?;
        self.write_body(f, "  ")
    }
}

impl fmt::Display for ResultWithWarnings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Result with warnings:")?;
        self.result.write_body(f, "  ")?;
        write!(f, "\n  Warnings:")?;
        for warning in &self.warnings {
            write!(f, "\n    - {}", warning)?;
        }
        Ok(())
    }
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Solver error: {}", self.message)?;
        if let Some(state) = &self.last_state {
            write!(f, "\n  Last state:\n")?;
            state.write_body(f, "    ")?;
        }
        Ok(())
    }
}

impl fmt::Display for SolverOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverOutcome::NoSolution => write!(f, "No solution"),
            SolverOutcome::Value(r) => fmt::Display::fmt(r, f),
            SolverOutcome::ValueWithWarnings(r) => fmt::Display::fmt(r, f),
            SolverOutcome::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}
