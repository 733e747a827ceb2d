use thiserror::Error;

/// Every way a solve can go wrong, from bad inputs to numerical breakdown.
///
/// Configuration errors are returned before the first iteration. Evaluation and
/// linear-algebra failures end a solve and show up as
/// [`Termination::Failed`](crate::Termination::Failed). `DegenerateUpdate` and
/// `LineSearchStalled` never end a solve on their own; they are what the
/// Hessian update and the line search report to the driver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BfgsError {
    #[error("The objective could not be evaluated: {reason}")]
    Evaluation { reason: String },

    #[error(
        "The approximate Hessian is not positive definite, so no descent direction could be computed."
    )]
    IndefiniteHessian,

    #[error(
        "BFGS update skipped: curvature Δg·Δx = {curvature:.3e}, Δx·HΔx = {hessian_curvature:.3e}."
    )]
    DegenerateUpdate {
        /// `Δg·Δx`, which must be strictly positive.
        curvature: f64,
        /// `Δx·(HΔx)`, which must be strictly positive.
        hessian_curvature: f64,
    },

    #[error(
        "The line search made no progress after {attempts} step halvings (last step length {step_length:.3e})."
    )]
    LineSearchStalled { attempts: usize, step_length: f64 },

    #[error("The problem has no variables; the initial point must be non-empty.")]
    EmptyProblem,

    #[error("Dimension mismatch: expected {expected} entries, found {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("The stopping tolerance must be positive and finite, got {0}.")]
    InvalidTolerance(f64),

    #[error("Invalid line search setting: {0}")]
    InvalidLineSearch(String),

    #[error("Failed to read the solver configuration: {0}")]
    Io(String),

    #[error("Failed to parse the solver configuration: {0}")]
    ConfigParse(String),
}

impl BfgsError {
    pub(crate) fn evaluation(reason: impl Into<String>) -> Self {
        BfgsError::Evaluation {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for BfgsError {
    fn from(err: std::io::Error) -> Self {
        BfgsError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for BfgsError {
    fn from(err: toml::de::Error) -> Self {
        BfgsError::ConfigParse(err.to_string())
    }
}
