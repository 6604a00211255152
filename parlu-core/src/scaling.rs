//! Ruiz equilibration of the input matrix.
//!
//! The factorization works on `Â = diag(row_scale) * A * diag(col_scale)`.
//! Each pass computes the infinity norms of the rows and columns of the
//! currently scaled matrix and divides them by `sqrt(norm)`, which drives
//! every row and column norm towards one.
//!
//! Solutions of `A x = b` follow from `Â z = diag(row_scale) b` and
//! `x = diag(col_scale) z`.

use crate::matrix::CsrPattern;
use crate::scalar::Scalar;

/// Row and column scale factors, indexed by original row and column.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaling {
    pub row_scale: Vec<f64>,
    pub col_scale: Vec<f64>,
}

impl Scaling {
    /// No scaling.
    pub fn identity(n: usize) -> Self {
        Self { row_scale: vec![1.0; n], col_scale: vec![1.0; n] }
    }

    pub fn is_identity(&self) -> bool {
        self.row_scale.iter().chain(&self.col_scale).all(|&s| s == 1.0)
    }

    /// Ruiz equilibration with at most `iters` passes.
    ///
    /// Stops early once every row and column norm is within `1e-3` of one.
    pub fn equilibrate<T: Scalar>(pattern: &CsrPattern, values: &[T], iters: usize) -> Self {
        let n = pattern.n;
        let mut scaling = Self::identity(n);
        let mut row_norms = vec![0.0f64; n];
        let mut col_norms = vec![0.0f64; n];

        for pass in 0..iters {
            row_norms.iter_mut().for_each(|v| *v = 0.0);
            col_norms.iter_mut().for_each(|v| *v = 0.0);
            for i in 0..n {
                let r = scaling.row_scale[i];
                for p in pattern.row_ptr[i]..pattern.row_ptr[i + 1] {
                    let j = pattern.col_idx[p];
                    let a = values[p].modulus() * r * scaling.col_scale[j];
                    row_norms[i] = row_norms[i].max(a);
                    col_norms[j] = col_norms[j].max(a);
                }
            }

            let converged = row_norms
                .iter()
                .chain(&col_norms)
                .filter(|&&v| v > 0.0)
                .all(|&v| (1.0 - v).abs() < 1e-3);
            if converged {
                log::trace!("ruiz converged after {pass} passes");
                break;
            }

            let factor = |norm: f64| if norm > 1e-300 && norm.is_finite() { 1.0 / norm.sqrt() } else { 1.0 };
            for (s, &norm) in scaling.row_scale.iter_mut().zip(&row_norms) {
                *s *= factor(norm);
            }
            for (s, &norm) in scaling.col_scale.iter_mut().zip(&col_norms) {
                *s *= factor(norm);
            }
        }
        scaling
    }

    /// Scaled value of entry `(i, j)`.
    #[inline]
    pub fn apply<T: Scalar>(&self, i: usize, j: usize, v: T) -> T {
        v.scale(self.row_scale[i] * self.col_scale[j])
    }

    /// `ln |det diag(row_scale) diag(col_scale)|`.
    pub fn log_det(&self) -> f64 {
        self.row_scale.iter().chain(&self.col_scale).map(|s| s.ln()).sum()
    }
}
