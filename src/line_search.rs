//! Step-length selection by repeated halving.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::BfgsError;
use crate::objective::{Objective, ObjectiveModel};

/// When a trial step counts as an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecreaseRule {
    /// Any strict decrease, `f(x + αd) < f(x)`.
    #[default]
    Simple,
    /// Sufficient decrease, `f(x + αd) < f(x) + c₁ α ∇f(x)·d`.
    Armijo { c1: f64 },
}

/// An accepted step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchOutcome {
    pub step_length: f64,
    /// Objective value at the accepted trial point.
    pub value: f64,
    /// Trial evaluations spent, the accepted one included.
    pub attempts: usize,
}

/// Backtracking search that starts from `initial_step` and multiplies by `shrink`
/// before every trial, so the defaults try `α = 1, ½, ¼, …`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktrackingLineSearch {
    pub initial_step: f64,
    pub shrink: f64,
    pub max_halvings: usize,
    pub rule: DecreaseRule,
}

impl Default for BacktrackingLineSearch {
    fn default() -> Self {
        Self {
            initial_step: 2.0,
            shrink: 0.5,
            max_halvings: 100,
            rule: DecreaseRule::Simple,
        }
    }
}

impl BacktrackingLineSearch {
    pub fn with_rule(mut self, rule: DecreaseRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn validate(&self) -> Result<(), BfgsError> {
        if !self.initial_step.is_finite() || self.initial_step <= 0.0 {
            return Err(BfgsError::InvalidLineSearch(format!(
                "initial step must be positive, got {}",
                self.initial_step
            )));
        }
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(BfgsError::InvalidLineSearch(format!(
                "shrink factor must lie in (0, 1), got {}",
                self.shrink
            )));
        }
        if self.max_halvings == 0 {
            return Err(BfgsError::InvalidLineSearch(
                "at least one halving is required".to_string(),
            ));
        }
        if let DecreaseRule::Armijo { c1 } = self.rule
            && !(c1 > 0.0 && c1 < 1.0)
        {
            return Err(BfgsError::InvalidLineSearch(format!(
                "Armijo constant must lie in (0, 1), got {c1}"
            )));
        }
        Ok(())
    }

    /// Searches along `dir` from `x`.
    ///
    /// `model` must hold the value and gradient at `x` on entry. Every trial goes
    /// through `model`, so on return its cache describes the last trial point, not `x`.
    /// A trial whose evaluation fails counts as no decrease.
    ///
    /// When the halving budget runs out without a decrease the result is
    /// `LineSearchStalled`, carrying the smallest step length tried.
    pub fn search<O: Objective>(
        &self,
        x: &Array1<f64>,
        dir: &Array1<f64>,
        model: &mut ObjectiveModel<O>,
    ) -> Result<LineSearchOutcome, BfgsError> {
        let f_x = model.fval();
        let slope = model.grad().dot(dir);
        if slope >= 0.0 {
            log::warn!(
                "[BFGS Backtracking] Search started with a non-descent direction (gᵀd = {:.2e} >= 0).",
                slope
            );
        }

        let mut alpha = self.initial_step;
        for attempt in 1..=self.max_halvings {
            alpha *= self.shrink;
            let trial = x + &(dir * alpha);
            let threshold = match self.rule {
                DecreaseRule::Simple => f_x,
                DecreaseRule::Armijo { c1 } => f_x + c1 * alpha * slope,
            };
            match model.evaluate(&trial) {
                Ok(()) if model.fval() < threshold => {
                    log::debug!(
                        "[BFGS Backtracking] accepted α={:.3e} after {} trials: f={:.6e} (was {:.6e})",
                        alpha,
                        attempt,
                        model.fval(),
                        f_x
                    );
                    return Ok(LineSearchOutcome {
                        step_length: alpha,
                        value: model.fval(),
                        attempts: attempt,
                    });
                }
                Ok(()) => {}
                Err(err) => {
                    log::debug!("[BFGS Backtracking] trial α={:.3e} rejected: {}", alpha, err);
                }
            }
        }

        log::warn!(
            "[BFGS Backtracking] No decrease after {} halvings; continuing with α={:.3e}.",
            self.max_halvings,
            alpha
        );
        Err(BfgsError::LineSearchStalled {
            attempts: self.max_halvings,
            step_length: alpha,
        })
    }
}
