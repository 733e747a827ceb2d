//! The BFGS approximation to the Hessian and the dense Cholesky solve behind it.

use ndarray::{Array1, Array2};

use crate::BfgsError;

/// Relative floor on `Δg·Δx` below which the curvature condition counts as failed.
const CURVATURE_FLOOR: f64 = 1e-12;

// Dense SPD Cholesky (LL^T). Returns None as soon as a pivot is not positive.
fn chol_decompose(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return None;
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn chol_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    // Forward solve: L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    // Backward solve: L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Symmetric approximation `H ≈ ∇²f`, started at the identity.
///
/// Search directions come from solving `H d = −g` by Cholesky, so `H` has to stay
/// positive definite. Updates that would break that are refused rather than applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproxHessian {
    matrix: Array2<f64>,
}

impl ApproxHessian {
    pub fn identity(n: usize) -> Self {
        Self {
            matrix: Array2::eye(n),
        }
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    /// Drops all curvature information and starts over from `I`.
    pub fn reset(&mut self) {
        self.matrix = Array2::eye(self.dimension());
    }

    /// Solves `H d = −g` for the quasi-Newton direction `d`.
    pub fn search_direction(&self, g: &Array1<f64>) -> Result<Array1<f64>, BfgsError> {
        let l = chol_decompose(&self.matrix).ok_or(BfgsError::IndefiniteHessian)?;
        Ok(chol_solve(&l, &(-g)))
    }

    /// Applies the rank-2 BFGS correction
    /// `H ← H + (Δg Δgᵀ)/(Δg·Δx) − (HΔx)(HΔx)ᵀ/(Δx·HΔx)`.
    ///
    /// Fails with `DegenerateUpdate`, leaving `H` as it was, when the curvature
    /// condition `Δg·Δx > 0` does not hold (relative to `‖Δg‖‖Δx‖`), when
    /// `Δx·HΔx` is not positive, or when the corrected matrix would not be finite.
    pub fn update(
        &mut self,
        delta_x: &Array1<f64>,
        delta_grad: &Array1<f64>,
    ) -> Result<(), BfgsError> {
        let h_dx = self.matrix.dot(delta_x);
        let curvature = delta_grad.dot(delta_x);
        let hessian_curvature = delta_x.dot(&h_dx);
        let scale = delta_grad.dot(delta_grad).sqrt() * delta_x.dot(delta_x).sqrt();
        let degenerate = || BfgsError::DegenerateUpdate {
            curvature,
            hessian_curvature,
        };

        if !curvature.is_finite() || curvature <= CURVATURE_FLOOR * scale {
            return Err(degenerate());
        }
        if !hessian_curvature.is_finite() || hessian_curvature <= 0.0 {
            return Err(degenerate());
        }

        let n = self.dimension();
        let mut candidate = self.matrix.clone();
        for i in 0..n {
            for j in 0..n {
                candidate[[i, j]] += delta_grad[i] * delta_grad[j] / curvature
                    - h_dx[i] * h_dx[j] / hessian_curvature;
            }
        }
        // Average out the rounding asymmetry of the two outer products.
        for i in 0..n {
            for j in (i + 1)..n {
                let v = 0.5 * (candidate[[i, j]] + candidate[[j, i]]);
                candidate[[i, j]] = v;
                candidate[[j, i]] = v;
            }
        }
        if candidate.iter().any(|v| !v.is_finite()) {
            return Err(degenerate());
        }
        self.matrix = candidate;
        Ok(())
    }

    /// Largest `|H_ij − H_ji|`.
    pub fn asymmetry(&self) -> f64 {
        let n = self.dimension();
        let mut worst = 0.0f64;
        for i in 0..n {
            for j in (i + 1)..n {
                worst = worst.max((self.matrix[[i, j]] - self.matrix[[j, i]]).abs());
            }
        }
        worst
    }

    pub fn is_positive_definite(&self) -> bool {
        chol_decompose(&self.matrix).is_some()
    }
}

impl From<Array2<f64>> for ApproxHessian {
    fn from(matrix: Array2<f64>) -> Self {
        Self { matrix }
    }
}
