//! The outer quasi-Newton loop.

use ndarray::Array1;

use crate::BfgsError;
use crate::convergence::{ConvergenceCriterion, ConvergenceMonitor};
use crate::hessian::ApproxHessian;
use crate::line_search::BacktrackingLineSearch;
use crate::objective::{Objective, ObjectiveModel};
use crate::report::{Diagnostic, IterationRecord, IterationSink};
use crate::variable::Variable;

/// Knobs shared by every solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub line_search: BacktrackingLineSearch,
    /// Reset `H` to the identity instead of failing when it stops being positive definite.
    pub restart_on_indefinite: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-9,
            line_search: BacktrackingLineSearch::default(),
            restart_on_indefinite: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), BfgsError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(BfgsError::InvalidTolerance(self.tolerance));
        }
        self.line_search.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initialized,
    Iterating,
    Converged,
    MaxIterReached,
    Failed,
}

impl DriverState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DriverState::Converged | DriverState::MaxIterReached | DriverState::Failed
        )
    }
}

/// Why a solve stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Converged(ConvergenceCriterion),
    MaxIterationsExceeded,
    Failed(BfgsError),
}

/// The outcome of a solve.
///
/// The point, value, and gradient norm always belong to the last iterate whose
/// evaluation succeeded. On a failure at the very first evaluation the value is
/// NaN and the gradient norm infinite.
#[derive(Debug, Clone)]
pub struct BfgsSolution {
    pub final_point: Array1<f64>,
    pub final_value: f64,
    pub final_gradient_norm: f64,
    /// Outer iterations started, the failing one included.
    pub iterations: usize,
    /// Calls into the objective, line-search trials included.
    pub func_evals: usize,
    pub termination: Termination,
}

impl BfgsSolution {
    pub fn converged(&self) -> bool {
        matches!(self.termination, Termination::Converged(_))
    }

    /// Turns a `Failed` termination into `Err`, for callers that want `?`.
    pub fn into_result(self) -> Result<BfgsSolution, BfgsError> {
        match self.termination {
            Termination::Failed(err) => Err(err),
            _ => Ok(self),
        }
    }
}

/// Owns one solve: the iterate, the objective cache, the Hessian approximation,
/// and the convergence bookkeeping.
///
/// Drive it one transition at a time with [`step`](Self::step), or to the end
/// with [`run`](Self::run).
pub struct OptimizationDriver<O, S> {
    model: ObjectiveModel<O>,
    variable: Variable,
    hessian: ApproxHessian,
    monitor: ConvergenceMonitor,
    settings: Settings,
    sink: S,
    state: DriverState,
    termination: Option<Termination>,
    // Value and gradient at `variable`. The model's cache is overwritten by trials.
    fval: f64,
    grad: Array1<f64>,
}

impl<O: Objective, S: IterationSink> OptimizationDriver<O, S> {
    pub fn new(
        x0: Array1<f64>,
        objective: O,
        settings: Settings,
        sink: S,
    ) -> Result<Self, BfgsError> {
        if x0.is_empty() {
            return Err(BfgsError::EmptyProblem);
        }
        if let Some(expected) = objective.dimension()
            && expected != x0.len()
        {
            return Err(BfgsError::DimensionMismatch {
                expected,
                found: x0.len(),
            });
        }
        settings.validate()?;
        let n = x0.len();
        Ok(Self {
            model: ObjectiveModel::new(objective, n),
            variable: Variable::new(x0),
            hessian: ApproxHessian::identity(n),
            monitor: ConvergenceMonitor::new(settings.max_iterations, settings.tolerance),
            settings,
            sink,
            state: DriverState::Initialized,
            termination: None,
            fval: f64::NAN,
            grad: Array1::zeros(n),
        })
    }

    /// Starts from `hessian` instead of the identity.
    pub fn with_hessian(mut self, hessian: ApproxHessian) -> Result<Self, BfgsError> {
        let expected = self.variable.dimension();
        if hessian.dimension() != expected || hessian.matrix().ncols() != expected {
            return Err(BfgsError::DimensionMismatch {
                expected,
                found: hessian.dimension(),
            });
        }
        self.hessian = hessian;
        Ok(self)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn iteration(&self) -> usize {
        self.monitor.iteration()
    }

    pub fn point(&self) -> &Array1<f64> {
        self.variable.value()
    }

    pub fn value(&self) -> f64 {
        self.fval
    }

    pub fn gradient(&self) -> &Array1<f64> {
        &self.grad
    }

    pub fn hessian(&self) -> &ApproxHessian {
        &self.hessian
    }

    pub fn monitor(&self) -> &ConvergenceMonitor {
        &self.monitor
    }

    pub fn has_converged(&self) -> bool {
        self.monitor.has_converged()
    }

    pub fn reached_max_iter(&self) -> bool {
        self.monitor.reached_max_iter()
    }

    /// Performs the next transition and returns the resulting state.
    ///
    /// From `Initialized` this evaluates the starting point and emits record 0.
    /// From `Iterating` it runs one full outer pass. Terminal states are left as is.
    pub fn step(&mut self) -> DriverState {
        match self.state {
            DriverState::Initialized => self.start(),
            DriverState::Iterating => self.iterate(),
            terminal => terminal,
        }
    }

    /// Steps until a terminal state and packages the result.
    pub fn run(mut self) -> BfgsSolution {
        loop {
            if let Some(termination) = self.termination.take() {
                return self.into_solution(termination);
            }
            self.step();
        }
    }

    fn start(&mut self) -> DriverState {
        if let Err(err) = self.model.evaluate(self.variable.value()) {
            return self.fail(err);
        }
        self.fval = self.model.fval();
        self.grad = self.model.grad().clone();
        self.monitor.set_grad_norm(self.model.grad_norm());
        self.sink.record(&IterationRecord {
            iteration: 0,
            objective_value: self.fval,
            gradient_norm: self.monitor.grad_norm(),
            step_length: None,
            step_norm: None,
        });
        self.settle()
    }

    fn iterate(&mut self) -> DriverState {
        self.monitor.begin_iteration();
        let k = self.monitor.iteration();

        let dir = match self.hessian.search_direction(&self.grad) {
            Ok(dir) => dir,
            Err(err) if self.settings.restart_on_indefinite => {
                log::warn!("[BFGS] {} Restarting from the identity at iter {}.", err, k);
                self.sink
                    .diagnostic(&Diagnostic::HessianRestarted { iteration: k });
                self.hessian.reset();
                -&self.grad
            }
            Err(err) => return self.fail(err),
        };

        // The line search overwrites the model's cache, so keep the pre-step values.
        let f_old = self.fval;
        let g_old = self.grad.clone();

        let alpha = match self
            .settings
            .line_search
            .search(self.variable.value(), &dir, &mut self.model)
        {
            Ok(outcome) => outcome.step_length,
            Err(BfgsError::LineSearchStalled {
                attempts,
                step_length,
            }) => {
                self.sink.diagnostic(&Diagnostic::LineSearchStalled {
                    iteration: k,
                    attempts,
                    step_length,
                });
                step_length
            }
            Err(err) => return self.fail(err),
        };

        let step = &dir * alpha;
        let x_prev = self.variable.value().clone();
        self.variable.update(&step);
        if let Err(err) = self.model.evaluate(self.variable.value()) {
            self.variable = Variable::new(x_prev);
            return self.fail(err);
        }
        self.fval = self.model.fval();
        self.grad = self.model.grad().clone();

        let delta_f = self.fval - f_old;
        let delta_grad = &self.grad - &g_old;
        if let Err(err) = self.hessian.update(&step, &delta_grad) {
            log::warn!("[BFGS] iter {}: {}", k, err);
            if let BfgsError::DegenerateUpdate {
                curvature,
                hessian_curvature,
            } = err
            {
                self.sink.diagnostic(&Diagnostic::UpdateSkipped {
                    iteration: k,
                    curvature,
                    hessian_curvature,
                });
            }
        }

        let step_norm = step.dot(&step).sqrt();
        self.monitor.set_grad_norm(self.model.grad_norm());
        self.monitor.set_step_norm(step_norm);
        self.monitor.set_delta_f(delta_f);
        log::debug!(
            "[BFGS] iter={} f={:.6e} Δf={:.3e} ||g||={:.3e} α={:.3e} ||Δx||={:.3e}",
            k,
            self.fval,
            delta_f,
            self.monitor.grad_norm(),
            alpha,
            step_norm
        );
        self.sink.record(&IterationRecord {
            iteration: k,
            objective_value: self.fval,
            gradient_norm: self.monitor.grad_norm(),
            step_length: Some(alpha),
            step_norm: Some(step_norm),
        });

        self.settle()
    }

    fn settle(&mut self) -> DriverState {
        // A zero budget ends the solve at the start, even at a stationary point.
        if self.monitor.max_iterations() == 0 {
            return self.exhaust();
        }
        if let Some(criterion) = self.monitor.satisfied_criterion() {
            log::info!(
                "[BFGS] Converged by {:?}: iters={}, f={:.6e}, ||g||={:.3e}, fe={}",
                criterion,
                self.monitor.iteration(),
                self.fval,
                self.monitor.grad_norm(),
                self.model.evaluations()
            );
            self.finish(DriverState::Converged, Termination::Converged(criterion))
        } else if self.monitor.reached_max_iter() {
            self.exhaust()
        } else {
            self.state = DriverState::Iterating;
            self.state
        }
    }

    fn exhaust(&mut self) -> DriverState {
        log::warn!(
            "[BFGS] Max iterations reached: iters={}, f={:.6e}, ||g||={:.3e}, fe={}",
            self.monitor.iteration(),
            self.fval,
            self.monitor.grad_norm(),
            self.model.evaluations()
        );
        self.finish(
            DriverState::MaxIterReached,
            Termination::MaxIterationsExceeded,
        )
    }

    fn fail(&mut self, err: BfgsError) -> DriverState {
        log::error!(
            "[BFGS] Solve aborted at iter {}: {}",
            self.monitor.iteration(),
            err
        );
        self.finish(DriverState::Failed, Termination::Failed(err))
    }

    fn finish(&mut self, state: DriverState, termination: Termination) -> DriverState {
        self.state = state;
        self.termination = Some(termination);
        state
    }

    fn into_solution(self, termination: Termination) -> BfgsSolution {
        BfgsSolution {
            final_point: self.variable.into_inner(),
            final_value: self.fval,
            final_gradient_norm: self.monitor.grad_norm(),
            iterations: self.monitor.iteration(),
            func_evals: self.model.evaluations(),
            termination,
        }
    }
}
