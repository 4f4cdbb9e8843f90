//! Solver state passed to iteration callbacks

use crate::format_vector;
use crate::parameter::{write_entries, StateParameterValue, StateParameters};
use std::fmt;

/// State of an iterative solver at one iteration
///
/// `cost` and `constraint_violation` stay `None` until the solver has
/// evaluated them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverState {
    pub x: Vec<f64>,
    pub cost: Option<f64>,
    pub constraint_violation: Option<f64>,
    pub parameters: StateParameters,
}

impl SolverState {
    pub fn new(x: Vec<f64>) -> Self {
        Self {
            x,
            ..Default::default()
        }
    }

    /// True when the boolean state parameter `key` is set to true
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.parameters.get(key).map(|p| &p.value),
            Some(StateParameterValue::Bool(true))
        )
    }
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solver state:")?;
        writeln!(f, "  x: {}", format_vector(&self.x))?;
        match self.cost {
            Some(cost) => writeln!(f, "  Cost: {}", cost)?,
            None => writeln!(f, "  Cost: none")?,
        }
        match self.constraint_violation {
            Some(v) => write!(f, "  Constraint violation: {}", v)?,
            None => write!(f, "  Constraint violation: none")?,
        }
        if !self.parameters.is_empty() {
            write!(f, "\n  Parameters:")?;
            write_entries(
                f,
                "    ",
                self.parameters
                    .iter()
                    .map(|(k, p)| (k, &p.description, &p.value)),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::StateParameter;

    #[test]
    fn test_flag() {
        let mut state = SolverState::new(vec![0.0]);
        assert!(!state.flag("stop"));
        state.parameters.insert(
            "stop".to_string(),
            StateParameter::new("stop the solver", StateParameterValue::Bool(true)),
        );
        assert!(state.flag("stop"));
    }

    #[test]
    fn test_display() {
        let mut state = SolverState::new(vec![1.0, 2.0]);
        state.cost = Some(5.0);
        state.parameters.insert(
            "iteration".to_string(),
            StateParameter::new("current iteration", StateParameterValue::Int(3)),
        );
        insta::assert_snapshot!(state.to_string(), @r###"
        Solver state:
          x: [1, 2]
          Cost: 5
          Constraint violation: none
          Parameters:
            iteration (current iteration): 3
        "###);
    }
}
