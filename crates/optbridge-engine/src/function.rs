//! Function objects
//!
//! A [`Function`] maps `R^n` to `R^m`. Differentiable functions also provide
//! per-output gradients and a row-major `m x n` jacobian. Differentiability is a
//! runtime property ([`FunctionKind`]) because functions reach the engine through
//! dynamically-typed handles.

use crate::finite_difference;
use crate::{check_size, EngineError, EngineResult};
use std::fmt;

/// Differentiability class of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Plain,
    Differentiable,
    TwiceDifferentiable,
}

impl FunctionKind {
    pub fn is_differentiable(self) -> bool {
        !matches!(self, FunctionKind::Plain)
    }

    pub fn label(self) -> &'static str {
        match self {
            FunctionKind::Plain => "Function",
            FunctionKind::Differentiable => "DifferentiableFunction",
            FunctionKind::TwiceDifferentiable => "TwiceDifferentiableFunction",
        }
    }
}

/// A vector-valued function of a vector argument
///
/// Implementors provide the `impl_*` methods; callers use the size-checked
/// [`compute`](Function::compute), [`gradient`](Function::gradient) and
/// [`jacobian`](Function::jacobian) wrappers.
pub trait Function {
    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    fn name(&self) -> &str;

    fn kind(&self) -> FunctionKind {
        FunctionKind::Plain
    }

    /// Write `f(x)` into `result`. Sizes are already checked.
    fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()>;

    /// Write the gradient of output `function_id` at `x` into `gradient`.
    fn impl_gradient(
        &self,
        _gradient: &mut [f64],
        _x: &[f64],
        _function_id: usize,
    ) -> EngineResult<()> {
        Err(EngineError::NotDifferentiable(self.name().to_string()))
    }

    /// Write the row-major jacobian at `x` into `jacobian`.
    ///
    /// The default uses forward finite differences with [`finite_difference::DEFAULT_EPSILON`].
    fn impl_jacobian(&self, jacobian: &mut [f64], x: &[f64]) -> EngineResult<()> {
        if !self.kind().is_differentiable() {
            return Err(EngineError::NotDifferentiable(self.name().to_string()));
        }
        finite_difference::forward_jacobian(self, jacobian, x, finite_difference::DEFAULT_EPSILON)
    }

    /// Human-readable form used by `Display` and logs
    fn print(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name().is_empty() {
            "Unnamed function"
        } else {
            self.name()
        };
        write!(
            f,
            "{} ({}, input size: {}, output size: {})",
            name,
            self.kind().label(),
            self.input_size(),
            self.output_size()
        )
    }

    fn compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
        check_size("argument", self.input_size(), x.len())?;
        check_size("result", self.output_size(), result.len())?;
        self.impl_compute(result, x)
    }

    fn gradient(&self, gradient: &mut [f64], x: &[f64], function_id: usize) -> EngineResult<()> {
        check_size("argument", self.input_size(), x.len())?;
        check_size("gradient", self.input_size(), gradient.len())?;
        if function_id >= self.output_size() {
            return Err(EngineError::IndexOutOfRange {
                index: function_id,
                len: self.output_size(),
            });
        }
        self.impl_gradient(gradient, x, function_id)
    }

    fn jacobian(&self, jacobian: &mut [f64], x: &[f64]) -> EngineResult<()> {
        check_size("argument", self.input_size(), x.len())?;
        check_size(
            "jacobian",
            self.output_size() * self.input_size(),
            jacobian.len(),
        )?;
        self.impl_jacobian(jacobian, x)
    }

    /// Allocate and return `f(x)`
    fn evaluate(&self, x: &[f64]) -> EngineResult<Vec<f64>> {
        let mut result = vec![0.0; self.output_size()];
        self.compute(&mut result, x)?;
        Ok(result)
    }
}

impl fmt::Display for dyn Function + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Square;

    impl Function for Square {
        fn input_size(&self) -> usize {
            2
        }
        fn output_size(&self) -> usize {
            1
        }
        fn name(&self) -> &str {
            "square"
        }
        fn kind(&self) -> FunctionKind {
            FunctionKind::Differentiable
        }
        fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
            result[0] = x[0] * x[0] + x[1] * x[1];
            Ok(())
        }
        fn impl_gradient(&self, g: &mut [f64], x: &[f64], _id: usize) -> EngineResult<()> {
            g[0] = 2.0 * x[0];
            g[1] = 2.0 * x[1];
            Ok(())
        }
    }

    struct Constant;

    impl Function for Constant {
        fn input_size(&self) -> usize {
            1
        }
        fn output_size(&self) -> usize {
            1
        }
        fn name(&self) -> &str {
            ""
        }
        fn impl_compute(&self, result: &mut [f64], _x: &[f64]) -> EngineResult<()> {
            result[0] = 1.0;
            Ok(())
        }
    }

    #[test]
    fn test_compute_checks_sizes() {
        let mut out = [0.0; 1];
        assert!(Square.compute(&mut out, &[3.0, 4.0]).is_ok());
        assert_eq!(out[0], 25.0);

        let err = Square.compute(&mut out, &[1.0]).unwrap_err();
        assert!(matches!(err, EngineError::SizeMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_gradient_rejects_bad_function_id() {
        let mut g = [0.0; 2];
        let err = Square.gradient(&mut g, &[1.0, 1.0], 1).unwrap_err();
        assert!(matches!(err, EngineError::IndexOutOfRange { index: 1, len: 1 }));
    }

    #[test]
    fn test_default_jacobian_is_finite_difference() {
        let mut jac = [0.0; 2];
        Square.jacobian(&mut jac, &[3.0, 4.0]).unwrap();
        assert!((jac[0] - 6.0).abs() < 1e-4);
        assert!((jac[1] - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_plain_function_has_no_gradient() {
        let mut g = [0.0; 1];
        assert!(matches!(
            Constant.gradient(&mut g, &[0.0], 0),
            Err(EngineError::NotDifferentiable(_))
        ));
        assert!(Constant.jacobian(&mut g, &[0.0]).is_err());
    }

    #[test]
    fn test_display() {
        let f: &dyn Function = &Square;
        assert_eq!(
            f.to_string(),
            "square (DifferentiableFunction, input size: 2, output size: 1)"
        );
        let c: &dyn Function = &Constant;
        assert!(c.to_string().starts_with("Unnamed function (Function"));
    }
}
