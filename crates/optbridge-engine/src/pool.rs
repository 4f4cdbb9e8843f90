//! Function pools
//!
//! A pool stacks the outputs of several differentiable functions of the same
//! argument. A coordinating function runs first on every compute and jacobian
//! evaluation; its output is discarded. It usually caches shared intermediate
//! results that the members read.

use crate::function::{Function, FunctionKind};
use crate::{check_size, EngineError, EngineResult};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

pub struct FunctionPool {
    callback: Rc<dyn Function>,
    functions: Vec<Rc<dyn Function>>,
    ranges: Vec<Range<usize>>,
    input_size: usize,
    output_size: usize,
    name: String,
}

impl FunctionPool {
    /// Build a pool. Every member must be differentiable and share the
    /// coordinator's input size.
    pub fn new(
        callback: Rc<dyn Function>,
        functions: Vec<Rc<dyn Function>>,
        name: impl Into<String>,
    ) -> EngineResult<Self> {
        let input_size = callback.input_size();
        let mut ranges = Vec::with_capacity(functions.len());
        let mut pos = 0;

        for f in &functions {
            if !f.kind().is_differentiable() {
                return Err(EngineError::NotDifferentiable(f.name().to_string()));
            }
            check_size(
                &format!("input of pool member '{}'", f.name()),
                input_size,
                f.input_size(),
            )?;
            ranges.push(pos..pos + f.output_size());
            pos += f.output_size();
        }

        Ok(Self {
            callback,
            functions,
            ranges,
            input_size,
            output_size: pos,
            name: name.into(),
        })
    }

    pub fn members(&self) -> &[Rc<dyn Function>] {
        &self.functions
    }

    /// Locate the member owning output row `row`
    fn member_for_row(&self, row: usize) -> Option<(usize, usize)> {
        self.ranges
            .iter()
            .position(|r| r.contains(&row))
            .map(|idx| (idx, row - self.ranges[idx].start))
    }

    fn run_callback(&self, x: &[f64]) -> EngineResult<()> {
        let mut scratch = vec![0.0; self.callback.output_size()];
        self.callback.compute(&mut scratch, x)
    }
}

impl Function for FunctionPool {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Differentiable
    }

    fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
        self.run_callback(x)?;
        for (f, range) in self.functions.iter().zip(&self.ranges) {
            f.compute(&mut result[range.clone()], x)?;
        }
        Ok(())
    }

    fn impl_gradient(&self, gradient: &mut [f64], x: &[f64], function_id: usize) -> EngineResult<()> {
        let (idx, local) =
            self.member_for_row(function_id)
                .ok_or(EngineError::IndexOutOfRange {
                    index: function_id,
                    len: self.output_size,
                })?;
        self.functions[idx].gradient(gradient, x, local)
    }

    fn impl_jacobian(&self, jacobian: &mut [f64], x: &[f64]) -> EngineResult<()> {
        self.run_callback(x)?;
        let n = self.input_size;
        for (f, range) in self.functions.iter().zip(&self.ranges) {
            f.jacobian(&mut jacobian[range.start * n..range.end * n], x)?;
        }
        Ok(())
    }

    fn print(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Function pool {} (input size: {}, output size: {})",
            self.name, self.input_size, self.output_size
        )?;
        write!(f, "  Callback: ")?;
        self.callback.print(f)?;
        for member in &self.functions {
            write!(f, "\n  Member: ")?;
            member.print(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        calls: Rc<Cell<usize>>,
    }

    impl Function for Counter {
        fn input_size(&self) -> usize {
            2
        }
        fn output_size(&self) -> usize {
            1
        }
        fn name(&self) -> &str {
            "counter"
        }
        fn kind(&self) -> FunctionKind {
            FunctionKind::Differentiable
        }
        fn impl_compute(&self, result: &mut [f64], _x: &[f64]) -> EngineResult<()> {
            self.calls.set(self.calls.get() + 1);
            result[0] = 0.0;
            Ok(())
        }
    }

    struct Linear {
        coefficients: Vec<f64>,
        output: usize,
    }

    impl Function for Linear {
        fn input_size(&self) -> usize {
            self.coefficients.len()
        }
        fn output_size(&self) -> usize {
            self.output
        }
        fn name(&self) -> &str {
            "linear"
        }
        fn kind(&self) -> FunctionKind {
            FunctionKind::Differentiable
        }
        fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
            let dot: f64 = self.coefficients.iter().zip(x).map(|(c, v)| c * v).sum();
            for (k, r) in result.iter_mut().enumerate() {
                *r = dot * (k + 1) as f64;
            }
            Ok(())
        }
        fn impl_gradient(&self, g: &mut [f64], _x: &[f64], id: usize) -> EngineResult<()> {
            for (gj, c) in g.iter_mut().zip(&self.coefficients) {
                *gj = c * (id + 1) as f64;
            }
            Ok(())
        }
    }

    fn pool() -> (FunctionPool, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let callback = Rc::new(Counter {
            calls: calls.clone(),
        });
        let members: Vec<Rc<dyn Function>> = vec![
            Rc::new(Linear {
                coefficients: vec![1.0, 2.0],
                output: 1,
            }),
            Rc::new(Linear {
                coefficients: vec![3.0, -1.0],
                output: 2,
            }),
        ];
        (FunctionPool::new(callback, members, "pool").unwrap(), calls)
    }

    #[test]
    fn test_sizes_aggregate() {
        let (pool, _) = pool();
        assert_eq!(pool.input_size(), 2);
        assert_eq!(pool.output_size(), 3);
        assert_eq!(pool.members().len(), 2);
    }

    #[test]
    fn test_compute_runs_callback_then_members() {
        let (pool, calls) = pool();
        let out = pool.evaluate(&[1.0, 1.0]).unwrap();
        assert_eq!(out, vec![3.0, 2.0, 4.0]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_gradient_routes_to_member() {
        let (pool, _) = pool();
        let mut g = [0.0; 2];
        pool.gradient(&mut g, &[0.0, 0.0], 2).unwrap();
        assert_eq!(g, [6.0, -2.0]);
    }

    #[test]
    fn test_jacobian_stacks_rows() {
        let (pool, calls) = pool();
        let mut jac = [0.0; 6];
        pool.jacobian(&mut jac, &[0.5, 0.5]).unwrap();
        assert_eq!(calls.get(), 1);
        assert!((jac[0] - 1.0).abs() < 1e-5);
        assert!((jac[1] - 2.0).abs() < 1e-5);
        assert!((jac[4] - 6.0).abs() < 1e-5);
        assert!((jac[5] + 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_mismatched_input_sizes_rejected() {
        let callback: Rc<dyn Function> = Rc::new(Counter {
            calls: Rc::new(Cell::new(0)),
        });
        let members: Vec<Rc<dyn Function>> = vec![Rc::new(Linear {
            coefficients: vec![1.0, 2.0, 3.0],
            output: 1,
        })];
        assert!(matches!(
            FunctionPool::new(callback, members, "bad"),
            Err(EngineError::SizeMismatch { .. })
        ));
    }
}
