//! Value and index abstractions shared by the four solver families.
//!
//! The engine is written once, generic over a [`Scalar`] (real `f64` or
//! `Complex64`) and a [`SolverIndex`] (`i32` or `i64`) used at the API
//! boundary. Internally all indices are `usize`.
//!
//! Dense kernels on column-major blocks (products and triangular solves)
//! are delegated to faer; `Complex64` is faer's `c64`, so both value types
//! share the same code path.

use faer::linalg::matmul::matmul;
use faer::linalg::triangular_solve::{
    solve_lower_triangular_in_place, solve_unit_lower_triangular_in_place, solve_unit_upper_triangular_in_place,
    solve_upper_triangular_in_place,
};
use faer::{Accum, MatMut, MatRef, Par};
use num_complex::Complex64;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Triangle of a dense diagonal block used by [`Scalar::trsm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triangle {
    /// Strictly lower part with an implicit unit diagonal.
    UnitLower,
    /// Upper part including the diagonal.
    Upper,
}

/// Field element the factorization operates on.
pub trait Scalar:
    Copy
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    fn zero() -> Self;
    fn one() -> Self;
    fn from_real(re: f64) -> Self;
    /// Absolute value (complex modulus).
    fn modulus(self) -> f64;
    fn conj(self) -> Self;
    fn real(self) -> f64;
    fn is_finite(self) -> bool;

    /// Multiply by a real factor.
    #[inline]
    fn scale(self, factor: f64) -> Self {
        self * Self::from_real(factor)
    }

    /// Unit-modulus value with the sign/phase of `self` (one for zero).
    #[inline]
    fn phase(self) -> Self {
        let m = self.modulus();
        if m > 0.0 {
            self.scale(1.0 / m)
        } else {
            Self::one()
        }
    }

    /// Dense product `c = a * b` on column-major blocks.
    ///
    /// `a` is `m x k` with leading dimension `lda`, `b` is `k x n` with
    /// leading dimension `ldb`, `c` is `m x n` with leading dimension `ldc`.
    fn gemm(m: usize, n: usize, k: usize, a: &[Self], lda: usize, b: &[Self], ldb: usize, c: &mut [Self], ldc: usize);

    /// Dense update `c -= a * b`, same layout as [`Scalar::gemm`].
    fn gemm_sub(m: usize, n: usize, k: usize, a: &[Self], lda: usize, b: &[Self], ldb: usize, c: &mut [Self], ldc: usize);

    /// Solve `T X = B` (or `T^T X = B`) in place, `T` being the `n x n`
    /// triangle `tri` of the block `t` and `B` the `n x nrhs` block `b`.
    fn trsm(tri: Triangle, transpose: bool, n: usize, nrhs: usize, t: &[Self], ldt: usize, b: &mut [Self], ldb: usize);

    /// Solve `X U = B` in place for the `m x n` block `b`, `U` being the
    /// upper triangle (diagonal included) of the `n x n` block `u`.
    fn trsm_right_upper(m: usize, n: usize, u: &[Self], ldu: usize, b: &mut [Self], ldb: usize);
}

/// Minimal slice length of an `m x n` column-major block with leading dimension `ld`.
#[inline]
fn extent(m: usize, n: usize, ld: usize) -> usize {
    (n - 1) * ld + m
}

fn view<T>(s: &[T], m: usize, n: usize, ld: usize) -> MatRef<'_, T> {
    MatRef::from_column_major_slice_with_stride(&s[..extent(m, n, ld)], m, n, ld.max(m))
}

fn view_mut<T>(s: &mut [T], m: usize, n: usize, ld: usize) -> MatMut<'_, T> {
    MatMut::from_column_major_slice_with_stride_mut(&mut s[..extent(m, n, ld)], m, n, ld.max(m))
}

macro_rules! dense_kernels {
    ($t:ty, $one:expr) => {
        fn gemm(m: usize, n: usize, k: usize, a: &[$t], lda: usize, b: &[$t], ldb: usize, c: &mut [$t], ldc: usize) {
            if m == 0 || n == 0 {
                return;
            }
            if k == 0 {
                for j in 0..n {
                    c[j * ldc..j * ldc + m].iter_mut().for_each(|v| *v = <$t>::zero());
                }
                return;
            }
            matmul(view_mut(c, m, n, ldc), Accum::Replace, view(a, m, k, lda), view(b, k, n, ldb), $one, Par::Seq);
        }

        fn gemm_sub(m: usize, n: usize, k: usize, a: &[$t], lda: usize, b: &[$t], ldb: usize, c: &mut [$t], ldc: usize) {
            if m == 0 || n == 0 || k == 0 {
                return;
            }
            matmul(view_mut(c, m, n, ldc), Accum::Add, view(a, m, k, lda), view(b, k, n, ldb), -$one, Par::Seq);
        }

        fn trsm(tri: Triangle, transpose: bool, n: usize, nrhs: usize, t: &[$t], ldt: usize, b: &mut [$t], ldb: usize) {
            if n == 0 || nrhs == 0 {
                return;
            }
            let t = view(t, n, n, ldt);
            let rhs = view_mut(b, n, nrhs, ldb);
            match (tri, transpose) {
                (Triangle::UnitLower, false) => solve_unit_lower_triangular_in_place(t, rhs, Par::Seq),
                (Triangle::UnitLower, true) => solve_unit_upper_triangular_in_place(t.transpose(), rhs, Par::Seq),
                (Triangle::Upper, false) => solve_upper_triangular_in_place(t, rhs, Par::Seq),
                (Triangle::Upper, true) => solve_lower_triangular_in_place(t.transpose(), rhs, Par::Seq),
            }
        }

        fn trsm_right_upper(m: usize, n: usize, u: &[$t], ldu: usize, b: &mut [$t], ldb: usize) {
            if m == 0 || n == 0 {
                return;
            }
            // (X U)^T = U^T X^T
            let u = view(u, n, n, ldu);
            solve_lower_triangular_in_place(u.transpose(), view_mut(b, m, n, ldb).transpose_mut(), Par::Seq);
        }
    };
}

impl Scalar for f64 {
    #[inline]
    fn zero() -> Self {
        0.0
    }
    #[inline]
    fn one() -> Self {
        1.0
    }
    #[inline]
    fn from_real(re: f64) -> Self {
        re
    }
    #[inline]
    fn modulus(self) -> f64 {
        self.abs()
    }
    #[inline]
    fn conj(self) -> Self {
        self
    }
    #[inline]
    fn real(self) -> f64 {
        self
    }
    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
    #[inline]
    fn scale(self, factor: f64) -> Self {
        self * factor
    }

    dense_kernels!(f64, 1.0);
}

impl Scalar for Complex64 {
    #[inline]
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }
    #[inline]
    fn one() -> Self {
        Complex64::new(1.0, 0.0)
    }
    #[inline]
    fn from_real(re: f64) -> Self {
        Complex64::new(re, 0.0)
    }
    #[inline]
    fn modulus(self) -> f64 {
        self.norm()
    }
    #[inline]
    fn conj(self) -> Self {
        Complex64::new(self.re, -self.im)
    }
    #[inline]
    fn real(self) -> f64 {
        self.re
    }
    #[inline]
    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
    #[inline]
    fn scale(self, factor: f64) -> Self {
        Complex64::new(self.re * factor, self.im * factor)
    }

    dense_kernels!(Complex64, Complex64::new(1.0, 0.0));
}

/// Integer type used for row pointers and column indices at the API boundary.
pub trait SolverIndex: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Converts to `usize`; `None` for negative values.
    fn to_usize(self) -> Option<usize>;
    fn from_usize(v: usize) -> Option<Self>;
    /// Largest value representable, as `usize`.
    fn max_usize() -> usize;
}

impl SolverIndex for i32 {
    #[inline]
    fn to_usize(self) -> Option<usize> {
        usize::try_from(self).ok()
    }
    #[inline]
    fn from_usize(v: usize) -> Option<Self> {
        i32::try_from(v).ok()
    }
    fn max_usize() -> usize {
        i32::MAX as usize
    }
}

impl SolverIndex for i64 {
    #[inline]
    fn to_usize(self) -> Option<usize> {
        usize::try_from(self).ok()
    }
    #[inline]
    fn from_usize(v: usize) -> Option<Self> {
        i64::try_from(v).ok()
    }
    fn max_usize() -> usize {
        usize::try_from(i64::MAX).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_of_negative_real() {
        assert_eq!((-3.0f64).phase(), -1.0);
        assert_eq!(0.0f64.phase(), 1.0);
    }

    #[test]
    fn test_complex_phase_has_unit_modulus() {
        let z = Complex64::new(3.0, -4.0);
        let p = z.phase();
        assert!((p.modulus() - 1.0).abs() < 1e-15);
        assert!((p.re - 0.6).abs() < 1e-15 && (p.im + 0.8).abs() < 1e-15);
    }

    #[test]
    fn test_gemm_matches_hand_product() {
        // a = [1 3; 2 4] (column-major), b = [5 7; 6 8]
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [0.0; 4];
        f64::gemm(2, 2, 2, &a, 2, &b, 2, &mut c, 2);
        assert_eq!(c, [23.0, 34.0, 31.0, 46.0]);
        f64::gemm_sub(2, 2, 2, &a, 2, &b, 2, &mut c, 2);
        assert_eq!(c, [0.0; 4]);
    }

    #[test]
    fn test_gemm_with_strides() {
        // a is the 2x1 block at rows 1..3 of a 3x1 column
        let a = [9.0, 1.0, 2.0];
        let b = [3.0, 0.0, 4.0];
        let mut c = [0.0; 5];
        f64::gemm(2, 2, 1, &a[1..], 3, &b, 2, &mut c, 3);
        assert_eq!(c[0], 3.0);
        assert_eq!(c[1], 6.0);
        assert_eq!(c[3], 4.0);
        assert_eq!(c[4], 8.0);
    }

    #[test]
    fn test_complex_gemm_sub() {
        let c = |re, im| Complex64::new(re, im);
        // (1 + i) * (2 - i) = 3 + i
        let mut out = [c(5.0, 5.0)];
        Complex64::gemm_sub(1, 1, 1, &[c(1.0, 1.0)], 1, &[c(2.0, -1.0)], 1, &mut out, 1);
        assert_eq!(out[0], c(2.0, 4.0));
    }

    #[test]
    fn test_trsm_reads_only_its_triangle() {
        // Packed block: unit L = [1 0; 2 1], U = [4 1; 0 3] share the storage [4 1; 2 3]
        let t = [4.0, 2.0, 1.0, 3.0];
        // L y = (1, 4) -> y = (1, 2)
        let mut y = [1.0, 4.0];
        f64::trsm(Triangle::UnitLower, false, 2, 1, &t, 2, &mut y, 2);
        assert_eq!(y, [1.0, 2.0]);
        // U x = (5, 3) -> x = (1, 1)
        let mut x = [5.0, 3.0];
        f64::trsm(Triangle::Upper, false, 2, 1, &t, 2, &mut x, 2);
        assert!((x[0] - 1.0).abs() < 1e-15 && (x[1] - 1.0).abs() < 1e-15);
        // U^T x = (4, 4) -> x = (1, 1)
        let mut x = [4.0, 4.0];
        f64::trsm(Triangle::Upper, true, 2, 1, &t, 2, &mut x, 2);
        assert!((x[0] - 1.0).abs() < 1e-15 && (x[1] - 1.0).abs() < 1e-15);
        // L^T y = (5, 2) -> y = (1, 2)
        let mut y = [5.0, 2.0];
        f64::trsm(Triangle::UnitLower, true, 2, 1, &t, 2, &mut y, 2);
        assert_eq!(y, [1.0, 2.0]);
    }

    #[test]
    fn test_right_upper_solve_on_strided_rows() {
        // U = [2 1; 0 4]; rows (2, 5) and (4, 10) of B sit in a panel with leading dimension 3
        let u = [2.0, 0.0, 1.0, 4.0];
        let mut b = [9.0, 2.0, 4.0, 9.0, 5.0, 10.0];
        f64::trsm_right_upper(2, 2, &u, 2, &mut b[1..], 3);
        // X = [1 1; 2 2]
        assert_eq!(b, [9.0, 1.0, 2.0, 9.0, 1.0, 2.0]);
    }

    #[test]
    fn test_complex_trsm_multiple_rhs() {
        let c = |re, im| Complex64::new(re, im);
        // U = [i 1; 0 2], two right-hand sides with solutions (1, 1) and (i, 0)
        let t = [c(0.0, 1.0), c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)];
        let mut b = [c(1.0, 1.0), c(2.0, 0.0), c(-1.0, 0.0), c(0.0, 0.0)];
        Complex64::trsm(Triangle::Upper, false, 2, 2, &t, 2, &mut b, 2);
        let expect = [c(1.0, 0.0), c(1.0, 0.0), c(0.0, 1.0), c(0.0, 0.0)];
        for (u, v) in b.iter().zip(&expect) {
            assert!((u - v).norm() < 1e-15, "{b:?}");
        }
    }

    #[test]
    fn test_index_conversions() {
        assert_eq!((-1i32).to_usize(), None);
        assert_eq!(7i64.to_usize(), Some(7));
        assert_eq!(i32::from_usize(1usize << 40), None);
        assert_eq!(i32::max_usize(), 2147483647);
    }
}
