use crate::callback::IterationCallback;
use crate::function::Function;
use crate::outcome::{OptimResult, SolverError, SolverOutcome};
use crate::parameter::Parameters;
use crate::problem::Problem;
use crate::solver::SolverPlugin;
use crate::state::SolverState;

/// Always fails. The `laststate` variant evaluates the starting point, runs the
/// iteration callback once and attaches the result as the last state.
pub struct DummySolver {
    with_last_state: bool,
}

impl DummySolver {
    pub fn new(with_last_state: bool) -> Self {
        Self { with_last_state }
    }
}

impl SolverPlugin for DummySolver {
    fn name(&self) -> &str {
        if self.with_last_state {
            "dummy-laststate"
        } else {
            "dummy"
        }
    }

    fn solve(
        &self,
        problem: &Problem,
        _parameters: &Parameters,
        callback: Option<&dyn IterationCallback>,
    ) -> SolverOutcome {
        let error = SolverError::new("The dummy solver always fails.");
        if !self.with_last_state {
            return SolverOutcome::Error(error);
        }

        let n = problem.input_size();
        let x = problem
            .starting_point()
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![0.0; n]);

        let value = match problem.cost().evaluate(&x) {
            Ok(value) => value,
            Err(e) => return SolverOutcome::Error(SolverError::new(e.to_string())),
        };

        let mut state = SolverState::new(x);
        state.cost = value.first().copied();
        if let Some(callback) = callback {
            if let Err(e) = callback.on_iteration(problem, &mut state) {
                return SolverOutcome::Error(SolverError::new(e.to_string()));
            }
        }

        let last = OptimResult {
            input_size: n,
            output_size: problem.cost().output_size(),
            x: state.x,
            value,
            constraints: Vec::new(),
            lambda: Vec::new(),
        };
        SolverOutcome::Error(error.with_last_state(last))
    }
}
