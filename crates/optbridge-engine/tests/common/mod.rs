//! Shared test utilities for engine tests

#![allow(dead_code)]

use optbridge_engine::{EngineResult, Function, FunctionKind};
use std::rc::Rc;

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

type ComputeFn = Box<dyn Fn(&mut [f64], &[f64])>;
type GradientFn = Box<dyn Fn(&mut [f64], &[f64], usize)>;

/// Closure-backed differentiable function
pub struct ClosureFunction {
    pub n: usize,
    pub m: usize,
    pub name: String,
    pub compute: ComputeFn,
    pub gradient: Option<GradientFn>,
}

impl Function for ClosureFunction {
    fn input_size(&self) -> usize {
        self.n
    }
    fn output_size(&self) -> usize {
        self.m
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> FunctionKind {
        FunctionKind::Differentiable
    }
    fn impl_compute(&self, result: &mut [f64], x: &[f64]) -> EngineResult<()> {
        (self.compute)(result, x);
        Ok(())
    }
    fn impl_gradient(&self, g: &mut [f64], x: &[f64], id: usize) -> EngineResult<()> {
        match &self.gradient {
            Some(gradient) => {
                gradient(g, x, id);
                Ok(())
            }
            None => optbridge_engine::finite_difference::gradient(
                self,
                optbridge_engine::FiniteDifferenceRule::Simple,
                g,
                x,
                id,
                1e-8,
            ),
        }
    }
}

/// `f(x) = sum((x_i - c_i)^2)` with its exact gradient
pub fn shifted_sphere(center: Vec<f64>) -> Rc<dyn Function> {
    let n = center.len();
    let c1 = center.clone();
    let c2 = center;
    Rc::new(ClosureFunction {
        n,
        m: 1,
        name: "shifted sphere".to_string(),
        compute: Box::new(move |r, x| {
            r[0] = x.iter().zip(&c1).map(|(xi, ci)| (xi - ci) * (xi - ci)).sum();
        }),
        gradient: Some(Box::new(move |g, x, _| {
            for ((gi, xi), ci) in g.iter_mut().zip(x).zip(&c2) {
                *gi = 2.0 * (xi - ci);
            }
        })),
    })
}

/// `g(x) = x_0 + x_1`
pub fn linear_sum() -> Rc<dyn Function> {
    Rc::new(ClosureFunction {
        n: 2,
        m: 1,
        name: "sum".to_string(),
        compute: Box::new(|r, x| r[0] = x[0] + x[1]),
        gradient: Some(Box::new(|g, _, _| {
            g[0] = 1.0;
            g[1] = 1.0;
        })),
    })
}

pub fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {}: expected {}, got {}",
            i,
            e,
            a
        );
    }
}
