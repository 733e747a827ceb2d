use serde::{Deserialize, Serialize};

/// Which of the stopping tests fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceCriterion {
    GradientNorm,
    StepNorm,
    ObjectiveChange,
}

/// Iteration budget, tolerance, and the per-iteration quantities tested against it.
///
/// Any single quantity below `tolerance` counts as convergence. Before the first
/// step only the gradient norm is known; the step norm and objective change start
/// out infinite so they cannot fire.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceMonitor {
    iteration: usize,
    max_iterations: usize,
    tolerance: f64,
    grad_norm: f64,
    step_norm: f64,
    delta_f: f64,
}

impl ConvergenceMonitor {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            tolerance,
            grad_norm: f64::INFINITY,
            step_norm: f64::INFINITY,
            delta_f: f64::INFINITY,
        }
    }

    pub fn begin_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn set_grad_norm(&mut self, grad_norm: f64) {
        self.grad_norm = grad_norm;
    }

    pub fn set_step_norm(&mut self, step_norm: f64) {
        self.step_norm = step_norm;
    }

    pub fn set_delta_f(&mut self, delta_f: f64) {
        self.delta_f = delta_f;
    }

    /// The first criterion satisfied, checked in gradient, step, objective order.
    pub fn satisfied_criterion(&self) -> Option<ConvergenceCriterion> {
        if self.grad_norm < self.tolerance {
            Some(ConvergenceCriterion::GradientNorm)
        } else if self.step_norm < self.tolerance {
            Some(ConvergenceCriterion::StepNorm)
        } else if self.delta_f.abs() < self.tolerance {
            Some(ConvergenceCriterion::ObjectiveChange)
        } else {
            None
        }
    }

    pub fn has_converged(&self) -> bool {
        self.satisfied_criterion().is_some()
    }

    pub fn reached_max_iter(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn grad_norm(&self) -> f64 {
        self.grad_norm
    }

    pub fn step_norm(&self) -> f64 {
        self.step_norm
    }

    pub fn delta_f(&self) -> f64 {
        self.delta_f
    }
}
