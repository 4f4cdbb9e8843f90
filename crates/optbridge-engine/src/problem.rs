//! Optimization problems
//!
//! A [`Problem`] is a differentiable cost function plus argument bounds,
//! argument scales, an optional starting point and a list of constraints.

use crate::function::Function;
use crate::{check_size, format_vector, EngineError, EngineResult};
use std::fmt;
use std::rc::Rc;

/// Closed interval `[lower, upper]`; infinite ends mean unbounded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> EngineResult<Self> {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(EngineError::InvalidBounds(format!(
                "({}, {}) is not a valid interval",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    /// Distance from `value` to the interval, zero inside
    pub fn violation(&self, value: f64) -> f64 {
        if value < self.lower {
            self.lower - value
        } else if value > self.upper {
            value - self.upper
        } else {
            0.0
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lower, self.upper)
    }
}

/// A constraint `bounds[i].lower <= function(x)[i] <= bounds[i].upper`
#[derive(Clone)]
pub struct Constraint {
    pub function: Rc<dyn Function>,
    pub bounds: Vec<Interval>,
    pub scales: Vec<f64>,
}

#[derive(Clone)]
pub struct Problem {
    cost: Rc<dyn Function>,
    starting_point: Option<Vec<f64>>,
    argument_bounds: Vec<Interval>,
    argument_scales: Vec<f64>,
    constraints: Vec<Constraint>,
}

impl Problem {
    /// Create a problem; the cost function must be differentiable
    pub fn new(cost: Rc<dyn Function>) -> EngineResult<Self> {
        if !cost.kind().is_differentiable() {
            return Err(EngineError::NotDifferentiable(cost.name().to_string()));
        }
        let n = cost.input_size();
        Ok(Self {
            cost,
            starting_point: None,
            argument_bounds: vec![Interval::unbounded(); n],
            argument_scales: vec![1.0; n],
            constraints: Vec::new(),
        })
    }

    pub fn cost(&self) -> &Rc<dyn Function> {
        &self.cost
    }

    pub fn input_size(&self) -> usize {
        self.cost.input_size()
    }

    pub fn starting_point(&self) -> Option<&[f64]> {
        self.starting_point.as_deref()
    }

    pub fn set_starting_point(&mut self, x: Vec<f64>) -> EngineResult<()> {
        check_size("starting point", self.input_size(), x.len())?;
        self.starting_point = Some(x);
        Ok(())
    }

    pub fn argument_bounds(&self) -> &[Interval] {
        &self.argument_bounds
    }

    pub fn set_argument_bounds(&mut self, bounds: Vec<Interval>) -> EngineResult<()> {
        check_size("argument bounds", self.input_size(), bounds.len())?;
        self.argument_bounds = bounds;
        Ok(())
    }

    pub fn argument_scales(&self) -> &[f64] {
        &self.argument_scales
    }

    pub fn set_argument_scales(&mut self, scales: Vec<f64>) -> EngineResult<()> {
        check_size("argument scales", self.input_size(), scales.len())?;
        self.argument_scales = scales;
        Ok(())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Total number of constraint outputs
    pub fn constraints_output_size(&self) -> usize {
        self.constraints
            .iter()
            .map(|c| c.function.output_size())
            .sum()
    }

    /// Add a constraint. `scales` defaults to ones.
    pub fn add_constraint(
        &mut self,
        function: Rc<dyn Function>,
        bounds: Vec<Interval>,
        scales: Option<Vec<f64>>,
    ) -> EngineResult<()> {
        if !function.kind().is_differentiable() {
            return Err(EngineError::NotDifferentiable(function.name().to_string()));
        }
        check_size(
            "constraint argument",
            self.input_size(),
            function.input_size(),
        )?;
        let m = function.output_size();
        check_size("constraint bounds", m, bounds.len())?;
        let scales = scales.unwrap_or_else(|| vec![1.0; m]);
        check_size("constraint scales", m, scales.len())?;

        self.constraints.push(Constraint {
            function,
            bounds,
            scales,
        });
        Ok(())
    }

    /// Project `x` onto the argument bounds
    pub fn project(&self, x: &mut [f64]) {
        for (value, bound) in x.iter_mut().zip(&self.argument_bounds) {
            *value = bound.clamp(*value);
        }
    }
}

fn format_intervals(bounds: &[Interval]) -> String {
    let items: Vec<String> = bounds.iter().map(|b| b.to_string()).collect();
    format!("[{}]", items.join(", "))
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Problem:")?;
        writeln!(f, "  {}", &*self.cost)?;
        writeln!(
            f,
            "  Argument bounds: {}",
            format_intervals(&self.argument_bounds)
        )?;
        writeln!(
            f,
            "  Argument scales: {}",
            format_vector(&self.argument_scales)
        )?;
        write!(f, "  Number of constraints: {}", self.constraints.len())?;
        for (i, c) in self.constraints.iter().enumerate() {
            write!(f, "\n  Constraint {}\n    {}", i, &*c.function)?;
            write!(f, "\n    Bounds: {}", format_intervals(&c.bounds))?;
            write!(f, "\n    Scales: {}", format_vector(&c.scales))?;
        }
        if let Some(x0) = &self.starting_point {
            write!(f, "\n  Starting point: {}", format_vector(x0))?;
            if let Ok(value) = self.cost.evaluate(x0) {
                write!(f, "\n  Starting value: {}", format_vector(&value))?;
            }
        }
        Ok(())
    }
}
