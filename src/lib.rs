//! A quasi-Newton minimizer: BFGS updates of the Hessian approximation paired with
//! a backtracking line search.
//!
//! Each iteration solves `H d = -g` through a Cholesky factorization, halves a step
//! length along `d` until the objective decreases, moves, and then applies the rank-2
//! BFGS update to `H` from the observed change in point and gradient. The solve stops
//! when the gradient norm, the step norm, or the change in objective falls below the
//! tolerance, or when the iteration budget runs out.
//!
//! # Features
//! - Objectives are anything implementing [`Objective`], closures included.
//! - Simple decrease (the default) or Armijo sufficient decrease in the line search.
//! - Curvature-guarded updates: an update that would break positive definiteness is
//!   skipped and reported instead of applied.
//! - Optional restart from the identity when the approximation becomes indefinite.
//! - Iteration records and diagnostics go to a pluggable [`IterationSink`].
//! - A stepwise [`OptimizationDriver`] for callers that want to watch every pass.
//!
//! # Example
//!
//! Minimize the Rosenbrock function from its conventional starting point.
//!
//! ```
//! use qn_bfgs::{Bfgs, BfgsSolution, Termination};
//! use ndarray::{array, Array1};
//!
//! let rosenbrock = |x: &Array1<f64>| -> (f64, Array1<f64>) {
//!     let (a, b) = (1.0, 100.0);
//!     let f = (a - x[0]).powi(2) + b * (x[1] - x[0].powi(2)).powi(2);
//!     let g = array![
//!         -2.0 * (a - x[0]) - 4.0 * b * (x[1] - x[0].powi(2)) * x[0],
//!         2.0 * b * (x[1] - x[0].powi(2)),
//!     ];
//!     (f, g)
//! };
//!
//! let BfgsSolution {
//!     final_point: x_min,
//!     final_value,
//!     iterations,
//!     termination,
//!     ..
//! } = Bfgs::new(array![-1.2, 1.0], rosenbrock)
//!     .with_tolerance(1e-9)
//!     .with_max_iterations(100)
//!     .run()
//!     .expect("the problem is well formed");
//!
//! println!("f({}) = {:.3e} after {} iterations", x_min, final_value, iterations);
//! assert!(matches!(termination, Termination::Converged(_)));
//! assert!((x_min[0] - 1.0).abs() < 1e-4);
//! assert!((x_min[1] - 1.0).abs() < 1e-4);
//! ```

pub mod config;
pub mod convergence;
pub mod driver;
pub mod error;
pub mod hessian;
pub mod line_search;
pub mod objective;
pub mod report;
pub mod variable;

use ndarray::Array1;

pub use config::{ObjectiveKind, SolverConfig};
pub use convergence::{ConvergenceCriterion, ConvergenceMonitor};
pub use driver::{BfgsSolution, DriverState, OptimizationDriver, Settings, Termination};
pub use error::BfgsError;
pub use hessian::ApproxHessian;
pub use line_search::{BacktrackingLineSearch, DecreaseRule, LineSearchOutcome};
pub use objective::{Objective, ObjectiveModel, Quartic, Rosenbrock};
pub use report::{Diagnostic, IterationRecord, IterationSink, LogSink, MemorySink, TableWriter};
pub use variable::Variable;

/// A configured solve, consumed by [`run`](Self::run).
pub struct Bfgs<O> {
    x0: Array1<f64>,
    objective: O,
    settings: Settings,
    initial_hessian: Option<ApproxHessian>,
}

impl<O: Objective> Bfgs<O> {
    /// Creates a solver with the default settings.
    ///
    /// # Arguments
    /// * `x0` - The starting point. Its length fixes the problem dimension.
    /// * `objective` - Returns the value and gradient at a point.
    pub fn new(x0: Array1<f64>, objective: O) -> Self {
        Self {
            x0,
            objective,
            settings: Settings::default(),
            initial_hessian: None,
        }
    }

    /// Takes the starting point and every setting from `config`.
    pub fn from_config(config: &SolverConfig, objective: O) -> Result<Self, BfgsError> {
        config.validate()?;
        Ok(Self::new(config.start(), objective).with_settings(config.settings()))
    }

    /// Sets the convergence tolerance (default: 1e-9).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.settings.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of iterations (default: 100).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.settings.max_iterations = max_iterations;
        self
    }

    pub fn with_line_search(mut self, line_search: BacktrackingLineSearch) -> Self {
        self.settings.line_search = line_search;
        self
    }

    /// Chooses between plain and sufficient decrease (default: plain).
    pub fn with_decrease_rule(mut self, rule: DecreaseRule) -> Self {
        self.settings.line_search.rule = rule;
        self
    }

    /// Resets an indefinite approximation to the identity instead of failing.
    pub fn with_restart_on_indefinite(mut self, enable: bool) -> Self {
        self.settings.restart_on_indefinite = enable;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Seeds the Hessian approximation. The identity is used otherwise.
    pub fn with_initial_hessian(mut self, hessian: ApproxHessian) -> Self {
        self.initial_hessian = Some(hessian);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Builds the stepwise driver without running it.
    pub fn driver<S: IterationSink>(self, sink: S) -> Result<OptimizationDriver<O, S>, BfgsError> {
        let driver = OptimizationDriver::new(self.x0, self.objective, self.settings, sink)?;
        match self.initial_hessian {
            Some(hessian) => driver.with_hessian(hessian),
            None => Ok(driver),
        }
    }

    /// Runs to termination, discarding the iteration history.
    pub fn run(self) -> Result<BfgsSolution, BfgsError> {
        self.run_with_sink(())
    }

    /// Runs to termination, handing every record and diagnostic to `sink`.
    ///
    /// `Err` means the problem was rejected before the first evaluation. Failures
    /// during the solve come back as [`Termination::Failed`].
    pub fn run_with_sink<S: IterationSink>(self, sink: S) -> Result<BfgsSolution, BfgsError> {
        Ok(self.driver(sink)?.run())
    }
}

/// Minimizes `objective` from `initial_point` with the default line search.
///
/// `dimension` must match the length of `initial_point`.
pub fn solve<O, S>(
    dimension: usize,
    initial_point: Array1<f64>,
    max_iterations: usize,
    tolerance: f64,
    objective: O,
    sink: S,
) -> Result<BfgsSolution, BfgsError>
where
    O: Objective,
    S: IterationSink,
{
    if dimension != initial_point.len() {
        return Err(BfgsError::DimensionMismatch {
            expected: dimension,
            found: initial_point.len(),
        });
    }
    Bfgs::new(initial_point, objective)
        .with_max_iterations(max_iterations)
        .with_tolerance(tolerance)
        .run_with_sink(sink)
}
