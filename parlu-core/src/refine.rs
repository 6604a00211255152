//! Iterative refinement against the original (unscaled, unperturbed) matrix.
//!
//! Each step computes `r = b - op(A) x` and adds the correction `op(A)^{-1} r`
//! obtained from the factors. `Auto` and `AtMost(k)` stop as soon as the
//! residual is at the rounding level or stops decreasing; `Forced(k)` runs
//! exactly `k` steps and keeps the iterate with the smallest residual.

use crate::config::RefinementPolicy;
use crate::error::{try_alloc, SolverResult};
use crate::scalar::Scalar;
use crate::sparse;

/// Borrowed CSR matrix with `usize` indices.
#[derive(Debug, Clone, Copy)]
pub struct CsrRef<'a, T> {
    pub n: usize,
    pub row_ptr: &'a [usize],
    pub col_idx: &'a [usize],
    pub values: &'a [T],
}

impl<T: Scalar> CsrRef<'_, T> {
    /// 1-norm of `op(A)`.
    pub fn norm1(&self, transpose: bool) -> f64 {
        if transpose {
            sparse::norm_inf(self.n, self.row_ptr, self.values)
        } else {
            sparse::norm1(self.n, self.row_ptr, self.col_idx, self.values)
        }
    }

    /// `r = b - op(A) x`, returning `||r||_1`.
    pub fn residual(&self, x: &[T], b: &[T], r: &mut [T], transpose: bool) -> f64 {
        sparse::residual(self.n, self.row_ptr, self.col_idx, self.values, x, b, r, transpose)
    }
}

/// Refinement result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOutcome {
    pub iterations: usize,
    /// `||b - op(A) x||_1` of the returned solution (NaN when skipped).
    pub residual: f64,
}

/// Refine `x` in place; `correct(r, d)` must solve `op(A) d = r`.
pub fn refine<T, F>(
    a: &CsrRef<'_, T>,
    b: &[T],
    x: &mut [T],
    transpose: bool,
    policy: RefinementPolicy,
    auto_limit: u32,
    mut correct: F,
) -> SolverResult<RefineOutcome>
where
    T: Scalar,
    F: FnMut(&[T], &mut [T]) -> SolverResult<()>,
{
    let n = a.n;
    let (limit, forced) = match policy {
        RefinementPolicy::Auto => (auto_limit as usize, false),
        RefinementPolicy::AtMost(k) => (k as usize, false),
        RefinementPolicy::Forced(k) => (k as usize, true),
    };
    if limit == 0 {
        return Ok(RefineOutcome { iterations: 0, residual: f64::NAN });
    }

    let mut r = try_alloc(n, T::zero())?;
    let mut r_trial = try_alloc(n, T::zero())?;
    let mut d = try_alloc(n, T::zero())?;
    let mut trial = try_alloc(n, T::zero())?;
    let mut rnorm = a.residual(x, b, &mut r, transpose);
    let anorm = a.norm1(transpose);
    let bnorm: f64 = b[..n].iter().map(|v| v.modulus()).sum();

    let mut best = if forced { Some((x.to_vec(), rnorm)) } else { None };
    let mut iterations = 0;
    for _ in 0..limit {
        if !forced {
            let xnorm: f64 = x[..n].iter().map(|v| v.modulus()).sum();
            if !rnorm.is_finite() || rnorm <= f64::EPSILON * (anorm * xnorm + bnorm) {
                break;
            }
        }
        correct(&r, &mut d)?;
        for i in 0..n {
            trial[i] = x[i] + d[i];
        }
        let trial_norm = a.residual(&trial, b, &mut r_trial, transpose);
        let improved = trial_norm < rnorm;
        if !forced && !improved {
            break;
        }

        iterations += 1;
        x[..n].copy_from_slice(&trial);
        std::mem::swap(&mut r, &mut r_trial);
        rnorm = trial_norm;
        if let Some((best_x, best_norm)) = best.as_mut() {
            if trial_norm < *best_norm {
                best_x.copy_from_slice(&trial);
                *best_norm = trial_norm;
            }
        }
    }

    if let Some((best_x, best_norm)) = best {
        x[..n].copy_from_slice(&best_x);
        rnorm = best_norm;
    }
    log::trace!("refinement: {iterations} steps, residual {rnorm:.3e}");
    Ok(RefineOutcome { iterations, residual: rnorm })
}
