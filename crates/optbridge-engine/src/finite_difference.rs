//! Finite-difference derivatives
//!
//! Provides the default jacobian used by differentiable functions that do not
//! supply one, and [`FiniteDifferenceGradient`], which turns any function into a
//! differentiable one.

use crate::function::{Function, FunctionKind};
use crate::EngineResult;
use std::fmt;
use std::rc::Rc;

/// Default finite-difference step
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Finite-difference rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiniteDifferenceRule {
    /// `(f(x + h) - f(x)) / h`
    Simple,
    /// `(-f(x + 2h) + 8 f(x + h) - 8 f(x - h) + f(x - 2h)) / 12h`
    FivePoints,
}

impl FiniteDifferenceRule {
    pub fn label(self) -> &'static str {
        match self {
            FiniteDifferenceRule::Simple => "forward difference",
            FiniteDifferenceRule::FivePoints => "five-points rule",
        }
    }
}

/// Row-major jacobian of `f` at `x` by forward differences
pub fn forward_jacobian<F: Function + ?Sized>(
    f: &F,
    jacobian: &mut [f64],
    x: &[f64],
    epsilon: f64,
) -> EngineResult<()> {
    let n = f.input_size();
    let m = f.output_size();
    let fx = f.evaluate(x)?;
    let mut shifted = x.to_vec();
    let mut fs = vec![0.0; m];

    for j in 0..n {
        shifted[j] = x[j] + epsilon;
        f.compute(&mut fs, &shifted)?;
        shifted[j] = x[j];
        for i in 0..m {
            jacobian[i * n + j] = (fs[i] - fx[i]) / epsilon;
        }
    }
    Ok(())
}

/// Gradient of output `function_id` of `f` at `x`
pub fn gradient<F: Function + ?Sized>(
    f: &F,
    rule: FiniteDifferenceRule,
    gradient: &mut [f64],
    x: &[f64],
    function_id: usize,
    epsilon: f64,
) -> EngineResult<()> {
    let m = f.output_size();
    let mut shifted = x.to_vec();
    let mut out = vec![0.0; m];
    let mut eval_at = |shifted: &[f64]| -> EngineResult<f64> {
        f.compute(&mut out, shifted)?;
        Ok(out[function_id])
    };

    match rule {
        FiniteDifferenceRule::Simple => {
            let fx = eval_at(x)?;
            for j in 0..x.len() {
                shifted[j] = x[j] + epsilon;
                gradient[j] = (eval_at(&shifted)? - fx) / epsilon;
                shifted[j] = x[j];
            }
        }
        FiniteDifferenceRule::FivePoints => {
            for j in 0..x.len() {
                let mut at = |offset: f64| -> EngineResult<f64> {
                    shifted[j] = x[j] + offset;
                    let value = eval_at(&shifted);
                    shifted[j] = x[j];
                    value
                };
                let p2 = at(2.0 * epsilon)?;
                let p1 = at(epsilon)?;
                let m1 = at(-epsilon)?;
                let m2 = at(-2.0 * epsilon)?;
                gradient[j] = (-p2 + 8.0 * p1 - 8.0 * m1 + m2) / (12.0 * epsilon);
            }
        }
    }
    Ok(())
}

/// Differentiable wrapper computing gradients by finite differences
pub struct FiniteDifferenceGradient {
    inner: Rc<dyn Function>,
    rule: FiniteDifferenceRule,
    epsilon: f64,
}

impl FiniteDifferenceGradient {
    pub fn new(inner: Rc<dyn Function>, rule: FiniteDifferenceRule, epsilon: f64) -> Self {
        Self {
            inner,
            rule,
            epsilon,
        }
    }

    pub fn rule(&self) -> FiniteDifferenceRule {
        self.rule
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Function for FiniteDifferenceGradient {
    fn input_size(&self) -> usize {
        self.inner.input_size()
    }

    fn output_size(&self) -> usize {
        self.inner.output_size()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Differentiable
    }

    fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
        self.inner.impl_compute(result, x)
    }

    fn impl_gradient(&self, g: &mut [f64], x: &[f64], function_id: usize) -> EngineResult<()> {
        gradient(&*self.inner, self.rule, g, x, function_id, self.epsilon)
    }

    fn impl_jacobian(&self, jacobian: &mut [f64], x: &[f64]) -> EngineResult<()> {
        let n = self.input_size();
        for (i, row) in jacobian.chunks_mut(n.max(1)).enumerate() {
            self.impl_gradient(row, x, i)?;
        }
        Ok(())
    }

    fn print(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Finite-difference gradient ({}, epsilon = {}) of ",
            self.rule.label(),
            self.epsilon
        )?;
        self.inner.print(f)
    }
}
