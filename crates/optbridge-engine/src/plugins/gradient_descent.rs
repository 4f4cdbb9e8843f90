use crate::callback::IterationCallback;
use crate::function::Function;
use crate::outcome::{OptimResult, ResultWithWarnings, SolverError, SolverOutcome};
use crate::parameter::{int_or, real_or, Parameter, ParameterValue, Parameters};
use crate::parameter::{StateParameter, StateParameterValue};
use crate::problem::Problem;
use crate::solver::SolverPlugin;
use crate::state::SolverState;
use crate::EngineResult;

const CONSTRAINT_TOLERANCE: f64 = 1e-6;

/// Projected gradient descent with a quadratic penalty on constraint violation
///
/// Steps are `step-size * scale[j] * grad[j]`, projected back onto the argument
/// bounds. The run ends when the gradient norm drops below `tolerance`, after
/// `max-iterations`, or when an iteration callback sets the `stop` state flag.
pub struct GradientDescent;

struct Evaluation {
    value: f64,
    gradient: Vec<f64>,
    violation: f64,
}

impl GradientDescent {
    fn evaluate(problem: &Problem, penalty: f64, x: &[f64]) -> EngineResult<Evaluation> {
        let n = x.len();
        let cost = problem.cost();
        let mut value = cost.evaluate(x)?[0];
        let mut gradient = vec![0.0; n];
        cost.gradient(&mut gradient, x, 0)?;
        let mut violation = 0.0;

        for constraint in problem.constraints() {
            let f = &constraint.function;
            let values = f.evaluate(x)?;
            let mut jacobian = vec![0.0; f.output_size() * n];
            f.jacobian(&mut jacobian, x)?;

            for (i, (&c, bound)) in values.iter().zip(&constraint.bounds).enumerate() {
                let scale = constraint.scales[i];
                let v = bound.violation(c) * scale;
                if v == 0.0 {
                    continue;
                }
                let sign = if c < bound.lower { -1.0 } else { 1.0 };
                value += penalty * v * v;
                violation += v;
                let row = &jacobian[i * n..(i + 1) * n];
                for (g, dj) in gradient.iter_mut().zip(row) {
                    *g += 2.0 * penalty * v * scale * sign * dj;
                }
            }
        }

        Ok(Evaluation {
            value,
            gradient,
            violation,
        })
    }

    /// `project(x - step * scale * gradient)`
    fn step(problem: &Problem, x: &[f64], gradient: &[f64], step: f64) -> Vec<f64> {
        let mut next: Vec<f64> = x
            .iter()
            .zip(gradient)
            .zip(problem.argument_scales())
            .map(|((xj, gj), sj)| xj - step * sj * gj)
            .collect();
        problem.project(&mut next);
        next
    }

    /// Norm of the gradient restricted to directions the bounds allow
    fn projected_gradient_norm(problem: &Problem, x: &[f64], gradient: &[f64], step: f64) -> f64 {
        let next = Self::step(problem, x, gradient, step);
        let moved: f64 = next
            .iter()
            .zip(x)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        moved / step
    }

    fn result_at(problem: &Problem, x: &[f64]) -> EngineResult<OptimResult> {
        let cost = problem.cost();
        let value = cost.evaluate(x)?;
        let mut constraints = Vec::with_capacity(problem.constraints_output_size());
        for constraint in problem.constraints() {
            constraints.extend(constraint.function.evaluate(x)?);
        }
        Ok(OptimResult {
            input_size: problem.input_size(),
            output_size: cost.output_size(),
            x: x.to_vec(),
            value,
            lambda: vec![0.0; constraints.len()],
            constraints,
        })
    }

    fn failure(problem: &Problem, x: &[f64], message: String) -> SolverOutcome {
        let error = SolverError::new(message);
        SolverOutcome::Error(match Self::result_at(problem, x) {
            Ok(last) => error.with_last_state(last),
            Err(_) => error,
        })
    }
}

impl SolverPlugin for GradientDescent {
    fn name(&self) -> &str {
        "gradient-descent"
    }

    fn default_parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(
            "max-iterations".to_string(),
            Parameter::new("maximum number of iterations", ParameterValue::Int(1000)),
        );
        params.insert(
            "tolerance".to_string(),
            Parameter::new(
                "gradient norm below which the solver stops",
                ParameterValue::Real(1e-6),
            ),
        );
        params.insert(
            "step-size".to_string(),
            Parameter::new("fixed step length", ParameterValue::Real(0.1)),
        );
        params.insert(
            "penalty".to_string(),
            Parameter::new(
                "weight of the quadratic constraint penalty",
                ParameterValue::Real(100.0),
            ),
        );
        params
    }

    fn solve(
        &self,
        problem: &Problem,
        parameters: &Parameters,
        callback: Option<&dyn IterationCallback>,
    ) -> SolverOutcome {
        let n = problem.input_size();
        if problem.cost().output_size() != 1 {
            return SolverOutcome::Error(SolverError::new(format!(
                "gradient descent needs a scalar cost function, got output size {}",
                problem.cost().output_size()
            )));
        }

        let max_iterations = int_or(parameters, "max-iterations", 1000).max(0) as usize;
        let tolerance = real_or(parameters, "tolerance", 1e-6);
        let step = real_or(parameters, "step-size", 0.1);
        let penalty = real_or(parameters, "penalty", 100.0);

        let mut x = problem
            .starting_point()
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![0.0; n]);
        problem.project(&mut x);

        let mut state = SolverState::new(x.clone());
        let mut converged = false;
        let mut stopped = false;
        let mut violation = 0.0;

        for k in 0..max_iterations {
            let eval = match Self::evaluate(problem, penalty, &x) {
                Ok(eval) => eval,
                Err(e) => return Self::failure(problem, &x, e.to_string()),
            };
            let grad_norm = Self::projected_gradient_norm(problem, &x, &eval.gradient, step);
            violation = eval.violation;
            tracing::trace!(iteration = k, cost = eval.value, grad_norm, "iteration");

            state.x.clone_from(&x);
            state.cost = Some(eval.value);
            state.constraint_violation = Some(eval.violation);
            state.parameters.insert(
                "iteration".to_string(),
                StateParameter::new(
                    "current iteration",
                    StateParameterValue::Int(i32::try_from(k).unwrap_or(i32::MAX)),
                ),
            );
            state.parameters.insert(
                "gradient-norm".to_string(),
                StateParameter::new("norm of the gradient", StateParameterValue::Real(grad_norm)),
            );

            if let Some(callback) = callback {
                if let Err(e) = callback.on_iteration(problem, &mut state) {
                    return Self::failure(problem, &x, e.to_string());
                }
                if state.x.len() == n {
                    x.clone_from(&state.x);
                }
            }

            if state.flag("stop") {
                stopped = true;
                break;
            }
            if grad_norm < tolerance {
                converged = true;
                break;
            }

            x = Self::step(problem, &x, &eval.gradient, step);
        }

        let result = match Self::result_at(problem, &x) {
            Ok(result) => result,
            Err(e) => return Self::failure(problem, &x, e.to_string()),
        };

        let mut warnings = Vec::new();
        if stopped {
            warnings.push("optimization stopped by an iteration callback".to_string());
        } else if !converged {
            warnings.push(format!(
                "maximum number of iterations reached ({})",
                max_iterations
            ));
        }
        if violation > CONSTRAINT_TOLERANCE {
            warnings.push(format!(
                "constraints are not satisfied (violation: {})",
                violation
            ));
        }

        if warnings.is_empty() {
            SolverOutcome::Value(result)
        } else {
            SolverOutcome::ValueWithWarnings(ResultWithWarnings { result, warnings })
        }
    }
}
