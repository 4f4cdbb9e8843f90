//! Solvers and the plugin factory
//!
//! A [`Solver`] owns a copy of its problem, a parameter map, an optional
//! iteration callback and the outcome of the last `solve`. The optimization
//! algorithm itself is a [`SolverPlugin`] looked up by name.

use crate::callback::IterationCallback;
use crate::outcome::SolverOutcome;
use crate::parameter::{write_entries, Parameter, Parameters};
use crate::plugins;
use crate::problem::Problem;
use crate::{EngineError, EngineResult};
use std::fmt;
use std::rc::Rc;

/// An optimization algorithm
pub trait SolverPlugin {
    fn name(&self) -> &str;

    /// Parameters a fresh solver starts with
    fn default_parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// Run to completion. Must not return `NoSolution`.
    fn solve(
        &self,
        problem: &Problem,
        parameters: &Parameters,
        callback: Option<&dyn IterationCallback>,
    ) -> SolverOutcome;
}

pub struct Solver {
    plugin: Box<dyn SolverPlugin>,
    problem: Problem,
    parameters: Parameters,
    callback: Option<Rc<dyn IterationCallback>>,
    outcome: SolverOutcome,
}

impl Solver {
    pub fn new(plugin: Box<dyn SolverPlugin>, problem: Problem) -> Self {
        let parameters = plugin.default_parameters();
        Self {
            plugin,
            problem,
            parameters,
            callback: None,
            outcome: SolverOutcome::NoSolution,
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin.name()
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Replace the whole parameter map
    pub fn set_parameters(&mut self, parameters: Parameters) {
        self.parameters = parameters;
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, parameter: Parameter) {
        self.parameters.insert(key.into(), parameter);
    }

    pub fn iteration_callback(&self) -> Option<&Rc<dyn IterationCallback>> {
        self.callback.as_ref()
    }

    pub fn set_iteration_callback(&mut self, callback: Option<Rc<dyn IterationCallback>>) {
        self.callback = callback;
    }

    /// Run the plugin and store its outcome
    pub fn solve(&mut self) -> &SolverOutcome {
        let span = tracing::info_span!("solve", plugin = self.plugin.name());
        let _enter = span.enter();

        let callback = self.callback.clone();
        let outcome = self
            .plugin
            .solve(&self.problem, &self.parameters, callback.as_deref());
        tracing::info!(status = outcome.status(), "solver finished");

        self.outcome = outcome;
        &self.outcome
    }

    /// Outcome of the last `solve`; `NoSolution` before the first one
    pub fn minimum(&self) -> &SolverOutcome {
        &self.outcome
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solver:")?;
        writeln!(f, "  Plugin: {}", self.plugin.name())?;
        write!(f, "  Parameters:")?;
        if self.parameters.is_empty() {
            write!(f, " none")?;
        }
        write_entries(
            f,
            "    ",
            self.parameters
                .iter()
                .map(|(k, p)| (k, &p.description, &p.value)),
        )?;
        write!(f, "\n  Status: {}", self.outcome.status())?;
        for line in self.problem.to_string().lines() {
            write!(f, "\n  {}", line)?;
        }
        Ok(())
    }
}

/// Creates solvers from plugin names
pub struct SolverFactory;

impl SolverFactory {
    /// Instantiate plugin `name` on a copy of `problem`
    pub fn create(name: &str, problem: &Problem) -> EngineResult<Solver> {
        let plugin = plugins::lookup(name).ok_or_else(|| EngineError::UnknownPlugin(name.to_string()))?;
        tracing::debug!(plugin = name, "solver created");
        Ok(Solver::new(plugin, problem.clone()))
    }

    pub fn available_plugins() -> &'static [&'static str] {
        plugins::NAMES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Function, FunctionKind};
    use crate::parameter::ParameterValue;

    struct Quadratic;

    impl Function for Quadratic {
        fn input_size(&self) -> usize {
            1
        }
        fn output_size(&self) -> usize {
            1
        }
        fn name(&self) -> &str {
            "quadratic"
        }
        fn kind(&self) -> FunctionKind {
            FunctionKind::Differentiable
        }
        fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
            result[0] = (x[0] - 1.0) * (x[0] - 1.0);
            Ok(())
        }
        fn impl_gradient(&self, g: &mut [f64], x: &[f64], _id: usize) -> EngineResult<()> {
            g[0] = 2.0 * (x[0] - 1.0);
            Ok(())
        }
    }

    fn problem() -> Problem {
        Problem::new(Rc::new(Quadratic)).unwrap()
    }

    #[test]
    fn test_unknown_plugin() {
        let result = SolverFactory::create("no-such-plugin", &problem());
        assert!(matches!(result, Err(EngineError::UnknownPlugin(name)) if name == "no-such-plugin"));
    }

    #[test]
    fn test_minimum_before_solve_is_no_solution() {
        let solver = SolverFactory::create("dummy", &problem()).unwrap();
        assert_eq!(solver.minimum(), &SolverOutcome::NoSolution);
    }

    #[test]
    fn test_solver_copies_problem() {
        let mut p = problem();
        let solver = SolverFactory::create("gradient-descent", &p).unwrap();
        p.set_starting_point(vec![5.0]).unwrap();
        assert_eq!(solver.problem().starting_point(), None);
    }

    #[test]
    fn test_set_parameters_replaces_map() {
        let mut solver = SolverFactory::create("gradient-descent", &problem()).unwrap();
        assert!(solver.parameters().contains_key("max-iterations"));

        let mut params = Parameters::new();
        params.insert(
            "tolerance".to_string(),
            Parameter::new("stop threshold", ParameterValue::Real(1e-3)),
        );
        solver.set_parameters(params);
        assert_eq!(solver.parameters().len(), 1);
        assert!(!solver.parameters().contains_key("max-iterations"));
    }

    #[test]
    fn test_available_plugins() {
        assert!(SolverFactory::available_plugins().contains(&"gradient-descent"));
    }
}
