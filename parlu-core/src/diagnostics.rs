//! Determinant and condition-number estimation from the factors.
//!
//! The determinant is accumulated as `mantissa * 10^exponent` with
//! `1 <= |mantissa| < 10`, so products of many pivots neither overflow nor
//! underflow. The condition number is `||A||_1 * est(||A^{-1}||_1)` where
//! the inverse norm comes from Hager's method with Higham's refinements:
//! a few solves with `A` and `A^H` and one extra solve with an
//! alternating-sign vector.

use crate::error::SolverResult;
use crate::numeric::Factors;
use crate::scalar::Scalar;
use crate::scaling::Scaling;
use crate::symbolic::Symbolic;

/// Determinant as `mantissa * 10^exponent`; the sign or phase is in the mantissa.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Determinant<T> {
    pub mantissa: T,
    pub exponent: i64,
}

impl<T: Scalar> Determinant<T> {
    pub fn one() -> Self {
        Self { mantissa: T::one(), exponent: 0 }
    }

    /// Multiply by `v` and renormalize.
    pub fn mul(&mut self, v: T) {
        self.mantissa *= v;
        self.normalize();
    }

    /// Multiply by `10^p` for a real `p`.
    pub fn mul_pow10(&mut self, p: f64) {
        let whole = p.floor();
        self.mantissa = self.mantissa.scale(10f64.powf(p - whole));
        self.exponent += whole as i64;
        self.normalize();
    }

    fn normalize(&mut self) {
        let a = self.mantissa.modulus();
        if a == 0.0 || !a.is_finite() {
            if a == 0.0 {
                self.exponent = 0;
            }
            return;
        }
        let mut k = a.log10().floor();
        let mut m = if k < -300.0 {
            self.mantissa.scale(1e300) / T::from_real(10f64.powi(k as i32 + 300))
        } else {
            self.mantissa / T::from_real(10f64.powi(k as i32))
        };
        if m.modulus() >= 10.0 {
            m = m.scale(0.1);
            k += 1.0;
        } else if m.modulus() < 1.0 {
            m = m.scale(10.0);
            k -= 1.0;
        }
        self.mantissa = m;
        self.exponent += k as i64;
    }

    /// `mantissa * 10^exponent` (may overflow to infinity).
    pub fn value(&self) -> T {
        self.mantissa.scale(10f64.powi(self.exponent.clamp(i32::MIN as i64, i32::MAX as i64) as i32))
    }
}

/// True when `perm` is an odd permutation.
pub fn odd_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    let mut transpositions = 0usize;
    for start in 0..perm.len() {
        if seen[start] {
            continue;
        }
        let mut len = 0;
        let mut v = start;
        while !seen[v] {
            seen[v] = true;
            v = perm[v];
            len += 1;
        }
        transpositions += len - 1;
    }
    transpositions % 2 == 1
}

/// `det(A)` from the factors of `P diag(r) A diag(c) Q`.
pub fn determinant<T: Scalar>(symbolic: &Symbolic, scaling: &Scaling, factors: &Factors<T>) -> Determinant<T> {
    let mut det = Determinant::one();
    for sf in &factors.supernodes {
        for k in 0..sf.width {
            det.mul(sf.diag(k));
        }
    }
    let odd = odd_permutation(&symbolic.row_perm) ^ odd_permutation(&symbolic.col_perm) ^ factors.odd_swaps;
    if odd {
        det.mantissa = -det.mantissa;
    }
    let log_scale: f64 = scaling.row_scale.iter().chain(&scaling.col_scale).map(|s| s.log10()).sum();
    det.mul_pow10(-log_scale);
    det
}

const MAX_ESTIMATE_STEPS: usize = 5;

/// Estimate `||A^{-1}||_1`; `solve(b, x, transpose)` applies `A^{-1}` or `A^{-T}`.
pub fn inverse_norm1_estimate<T, F>(n: usize, mut solve: F) -> SolverResult<f64>
where
    T: Scalar,
    F: FnMut(&[T], &mut [T], bool) -> SolverResult<()>,
{
    if n == 0 {
        return Ok(0.0);
    }
    let norm1 = |v: &[T]| v.iter().map(|x| x.modulus()).sum::<f64>();
    let mut x = vec![T::from_real(1.0 / n as f64); n];
    let mut y = vec![T::zero(); n];
    let mut z = vec![T::zero(); n];
    let mut xi = vec![T::zero(); n];
    let mut est = 0.0f64;

    for step in 0..MAX_ESTIMATE_STEPS {
        solve(&x, &mut y, false)?;
        let norm = norm1(&y);
        if step > 0 && norm <= est {
            break;
        }
        est = norm;

        // z = A^{-H} sign(y)
        for (s, v) in xi.iter_mut().zip(&y) {
            *s = v.phase().conj();
        }
        solve(&xi, &mut z, true)?;
        z.iter_mut().for_each(|v| *v = v.conj());

        let (j, zmax) = z
            .iter()
            .enumerate()
            .map(|(j, v)| (j, v.modulus()))
            .fold((0, f64::NEG_INFINITY), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
        let ztx: f64 = z.iter().zip(&x).map(|(a, b)| (a.conj() * *b).real()).sum();
        if step > 0 && zmax <= ztx {
            break;
        }
        x.iter_mut().for_each(|v| *v = T::zero());
        x[j] = T::one();
    }

    // Alternating-sign vector guards against underestimates
    for (i, v) in x.iter_mut().enumerate() {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        let ramp = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
        *v = T::from_real(sign * (1.0 + ramp));
    }
    solve(&x, &mut y, false)?;
    let alt = 2.0 * norm1(&y) / (3.0 * n as f64);
    Ok(est.max(alt))
}
