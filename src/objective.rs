//! Objective functions and the value/gradient cache the solver reads from.

use ndarray::Array1;

use crate::BfgsError;

/// Anything that can report `f(x)` and `∇f(x)` at a point.
///
/// Closures of the form `FnMut(&Array1<f64>) -> (f64, Array1<f64>)` implement
/// this directly, so most callers never name the trait.
pub trait Objective {
    /// Returns the objective value and its gradient at `x`.
    fn evaluate(&mut self, x: &Array1<f64>) -> (f64, Array1<f64>);

    /// The number of variables the objective is defined on, if fixed.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

impl<F> Objective for F
where
    F: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    fn evaluate(&mut self, x: &Array1<f64>) -> (f64, Array1<f64>) {
        self(x)
    }
}

/// The Rosenbrock valley `f(x) = b(x₂ − x₁²)² + (a − x₁)²`, minimized at `(a, a²)`.
#[derive(Debug, Clone, Copy)]
pub struct Rosenbrock {
    pub a: f64,
    pub b: f64,
}

impl Default for Rosenbrock {
    fn default() -> Self {
        Self { a: 1.0, b: 100.0 }
    }
}

impl Objective for Rosenbrock {
    fn evaluate(&mut self, x: &Array1<f64>) -> (f64, Array1<f64>) {
        if x.len() != 2 {
            return (f64::NAN, Array1::from_elem(x.len(), f64::NAN));
        }
        let Rosenbrock { a, b } = *self;
        let valley = x[1] - x[0].powi(2);
        let f = b * valley.powi(2) + (a - x[0]).powi(2);
        let g = Array1::from(vec![
            -4.0 * b * valley * x[0] - 2.0 * (a - x[0]),
            2.0 * b * valley,
        ]);
        (f, g)
    }

    fn dimension(&self) -> Option<usize> {
        Some(2)
    }
}

/// The separable quartic `f(x) = Σ xᵢ⁴`, whose Hessian vanishes at the minimum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quartic;

impl Objective for Quartic {
    fn evaluate(&mut self, x: &Array1<f64>) -> (f64, Array1<f64>) {
        let f = x.iter().map(|v| v.powi(4)).sum();
        let g = x.mapv(|v| 4.0 * v.powi(3));
        (f, g)
    }
}

/// Holds the value and gradient from the most recent successful evaluation.
///
/// `fval()` and `grad()` describe whatever point was evaluated last, which is not
/// necessarily the solver's current iterate: the line search evaluates trial
/// points through the same model. Re-evaluate after moving before trusting them.
pub struct ObjectiveModel<O> {
    objective: O,
    fval: f64,
    grad: Array1<f64>,
    evaluations: usize,
}

impl<O: Objective> ObjectiveModel<O> {
    pub fn new(objective: O, dimension: usize) -> Self {
        Self {
            objective,
            fval: f64::NAN,
            grad: Array1::zeros(dimension),
            evaluations: 0,
        }
    }

    /// Evaluates at `x` and caches the result.
    ///
    /// A point of the wrong length for the objective, a non-finite value or
    /// gradient, or a gradient of the wrong length is an `Evaluation` error and
    /// leaves the cache untouched.
    pub fn evaluate(&mut self, x: &Array1<f64>) -> Result<(), BfgsError> {
        if let Some(n) = self.objective.dimension()
            && n != x.len()
        {
            return Err(BfgsError::evaluation(format!(
                "objective takes {n} variables, the point has {}",
                x.len()
            )));
        }
        let (f, g) = self.objective.evaluate(x);
        self.evaluations += 1;
        if g.len() != x.len() {
            return Err(BfgsError::evaluation(format!(
                "gradient has {} entries for a point with {}",
                g.len(),
                x.len()
            )));
        }
        if !f.is_finite() {
            return Err(BfgsError::evaluation(format!("objective value is {f}")));
        }
        if let Some(i) = g.iter().position(|v| !v.is_finite()) {
            return Err(BfgsError::evaluation(format!(
                "gradient entry {i} is {}",
                g[i]
            )));
        }
        self.fval = f;
        self.grad = g;
        Ok(())
    }

    pub fn fval(&self) -> f64 {
        self.fval
    }

    pub fn grad(&self) -> &Array1<f64> {
        &self.grad
    }

    /// Euclidean norm of the cached gradient.
    pub fn grad_norm(&self) -> f64 {
        self.grad.dot(&self.grad).sqrt()
    }

    /// Total calls into the objective, failed ones included.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn into_inner(self) -> O {
        self.objective
    }
}

#[cfg(test)]
mod tests {
    use super::{Objective, ObjectiveModel, Quartic, Rosenbrock};
    use crate::BfgsError;
    use ndarray::{Array1, array};
    use spectral::prelude::*;

    #[test]
    fn rosenbrock_matches_closed_form() {
        let (f, g) = Rosenbrock::default().evaluate(&array![-1.2, 1.0]);
        assert_that!(&f).is_close_to(24.2, 1e-12);
        assert_that!(&g[0]).is_close_to(-215.6, 1e-10);
        assert_that!(&g[1]).is_close_to(-88.0, 1e-10);
    }

    #[test]
    fn rosenbrock_is_flat_at_its_minimum() {
        let (f, g) = Rosenbrock::default().evaluate(&array![1.0, 1.0]);
        assert_eq!(f, 0.0);
        assert_eq!(g, array![0.0, 0.0]);
    }

    #[test]
    fn quartic_handles_any_dimension() {
        let (f, g) = Quartic.evaluate(&array![10.0]);
        assert_eq!(f, 10_000.0);
        assert_eq!(g, array![4000.0]);

        let (f, g) = Quartic.evaluate(&array![1.0, -2.0, 0.0]);
        assert_eq!(f, 17.0);
        assert_eq!(g, array![4.0, -32.0, 0.0]);
    }

    #[test]
    fn repeated_evaluation_is_idempotent() {
        let mut model = ObjectiveModel::new(Rosenbrock::default(), 2);
        let x = array![0.3, -0.7];
        model.evaluate(&x).unwrap();
        let first = (model.fval(), model.grad().clone());
        model.evaluate(&x).unwrap();
        assert_eq!(model.fval(), first.0);
        assert_eq!(model.grad(), &first.1);
        assert_eq!(model.evaluations(), 2);
    }

    #[test]
    fn cache_reflects_only_the_last_evaluation() {
        let mut model = ObjectiveModel::new(Quartic, 1);
        model.evaluate(&array![2.0]).unwrap();
        model.evaluate(&array![1.0]).unwrap();
        assert_eq!(model.fval(), 1.0);
        assert_eq!(model.grad(), &array![4.0]);
    }

    #[test]
    fn closures_are_objectives() {
        let mut model = ObjectiveModel::new(|x: &Array1<f64>| (x.dot(x), 2.0 * x), 2);
        model.evaluate(&array![3.0, 4.0]).unwrap();
        assert_eq!(model.fval(), 25.0);
        assert_that!(&model.grad_norm()).is_close_to(10.0, 1e-12);
    }

    #[test]
    fn non_finite_results_are_rejected_without_touching_the_cache() {
        let mut model = ObjectiveModel::new(
            |x: &Array1<f64>| {
                if x[0] > 1.0 {
                    (f64::INFINITY, array![f64::NAN])
                } else {
                    (x[0] * x[0], array![2.0 * x[0]])
                }
            },
            1,
        );
        model.evaluate(&array![0.5]).unwrap();
        let err = model.evaluate(&array![2.0]).unwrap_err();
        assert!(matches!(err, BfgsError::Evaluation { .. }));
        assert_eq!(model.fval(), 0.25);
        assert_eq!(model.grad(), &array![1.0]);
    }

    #[test]
    fn rosenbrock_outside_the_plane_is_not_a_panic() {
        let (f, g) = Rosenbrock::default().evaluate(&array![0.5]);
        assert!(f.is_nan());
        assert_eq!(g.len(), 1);

        let mut model = ObjectiveModel::new(Rosenbrock::default(), 3);
        let err = model.evaluate(&array![1.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, BfgsError::Evaluation { .. }));
        assert_eq!(model.evaluations(), 0);
        assert_eq!(Quartic.dimension(), None);
    }

    #[test]
    fn gradient_length_is_checked() {
        let mut model = ObjectiveModel::new(|x: &Array1<f64>| (x.sum(), array![1.0]), 2);
        let err = model.evaluate(&array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, BfgsError::Evaluation { .. }));
    }
}
