//! Built-in solver plugins

mod dummy;
mod gradient_descent;

pub use dummy::DummySolver;
pub use gradient_descent::GradientDescent;

use crate::solver::SolverPlugin;

/// Names accepted by [`lookup`]
pub const NAMES: &[&str] = &["dummy", "dummy-laststate", "gradient-descent"];

pub fn lookup(name: &str) -> Option<Box<dyn SolverPlugin>> {
    match name {
        "dummy" => Some(Box::new(DummySolver::new(false))),
        "dummy-laststate" => Some(Box::new(DummySolver::new(true))),
        "gradient-descent" => Some(Box::new(GradientDescent)),
        _ => None,
    }
}
