//! Dense supernode panels and their kernels.
//!
//! Supernode `s` of width `w` stores:
//!
//! - the L panel, column-major `h x w` with `h = w + |S_L(s)|`: rows `0..w`
//!   hold the diagonal block (unit L11 below the diagonal, U11 on and above
//!   it), rows `w..h` hold L21;
//! - the U panel, column-major `w x |S_U(s)|`, holding U12.
//!
//! Rows of the diagonal block are pivoted locally; `perm[q]` is the block
//! row that ended up in position `q`.

use crate::error::{try_alloc, SolverError, SolverResult};
use crate::scalar::{Scalar, Triangle};
use crate::symbolic::structure::{Link, Structure};

/// Pivot acceptance and perturbation thresholds.
#[derive(Debug, Clone, Copy)]
pub struct PivotPolicy {
    /// Pivots at or below this magnitude are replaced.
    pub eps: f64,
    /// A diagonal pivot is kept when it is at least this fraction of the
    /// largest candidate in its column.
    pub tolerance: f64,
}

/// LU factors of one supernode.
#[derive(Debug, Clone)]
pub struct SupernodeFactor<T> {
    pub width: usize,
    pub height: usize,
    pub lower: Vec<T>,
    pub upper: Vec<T>,
    pub perm: Vec<usize>,
    pub odd_swaps: bool,
    pub offdiag: usize,
    pub perturbed: usize,
}

impl<T: Scalar> SupernodeFactor<T> {
    /// Zeroed panels for a supernode with `ncols` columns in `S_U`.
    pub fn new(width: usize, height: usize, ncols: usize) -> SolverResult<Self> {
        Ok(Self {
            width,
            height,
            lower: try_alloc(width * height, T::zero())?,
            upper: try_alloc(width * ncols, T::zero())?,
            perm: (0..width).collect(),
            odd_swaps: false,
            offdiag: 0,
            perturbed: 0,
        })
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.upper.len() / self.width
        }
    }

    #[inline]
    pub fn l(&self, i: usize, j: usize) -> T {
        self.lower[j * self.height + i]
    }

    #[inline]
    pub fn u(&self, k: usize, c: usize) -> T {
        self.upper[c * self.width + k]
    }

    #[inline]
    pub fn diag(&self, k: usize) -> T {
        self.l(k, k)
    }

    pub fn bytes(&self) -> usize {
        (self.lower.len() + self.upper.len()) * std::mem::size_of::<T>()
            + self.perm.len() * std::mem::size_of::<usize>()
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (w, h) = (self.width, self.height);
        for j in 0..w {
            self.lower.swap(j * h + a, j * h + b);
        }
        for c in 0..self.ncols() {
            self.upper.swap(c * w + a, c * w + b);
        }
        self.perm.swap(a, b);
        self.odd_swaps = !self.odd_swaps;
    }

    /// Factor the assembled panels in place.
    ///
    /// The diagonal block is factored column by column with pivoting
    /// restricted to its rows. L21 and U12 then follow from two triangular
    /// solves, `L21 U11 = A21` and `L11 U12 = A12`.
    ///
    /// `first` is the global index of the first column, used in errors.
    pub fn factor(&mut self, policy: &PivotPolicy, first: usize) -> SolverResult<()> {
        let (w, h) = (self.width, self.height);
        let nu = self.ncols();
        for k in 0..w {
            let column_ok = self.lower[k * h..(k + 1) * h].iter().all(|v| v.is_finite());
            if !column_ok || (0..nu).any(|c| !self.upper[c * w + k].is_finite()) {
                return Err(SolverError::NumericallySingular { index: first + k });
            }
        }

        let mut row = Vec::with_capacity(w);
        for k in 0..w {
            let col = k * h;
            let (mut imax, mut vmax) = (k, 0.0f64);
            for i in k..w {
                let v = self.lower[col + i].modulus();
                if v > vmax {
                    imax = i;
                    vmax = v;
                }
            }
            let d = self.lower[col + k].modulus();
            if d > policy.eps && d >= policy.tolerance * vmax {
                // diagonal pivot accepted
            } else if vmax > policy.eps && imax != k {
                self.swap_rows(k, imax);
                self.offdiag += 1;
            } else {
                let phase = self.lower[col + k].phase();
                self.lower[col + k] = phase.scale(policy.eps);
                self.perturbed += 1;
            }

            let pivot = self.lower[col + k];
            if !pivot.is_finite() || pivot.modulus() == 0.0 {
                return Err(SolverError::NumericallySingular { index: first + k });
            }
            for v in &mut self.lower[col + k + 1..col + w] {
                *v /= pivot;
            }

            // Rank-one update of the trailing diagonal block
            let rest = w - k - 1;
            if rest > 0 {
                row.clear();
                row.extend((k + 1..w).map(|j| self.lower[j * h + k]));
                let (head, tail) = self.lower.split_at_mut((k + 1) * h);
                T::gemm_sub(rest, rest, 1, &head[col + k + 1..], h, &row, 1, &mut tail[k + 1..], h);
            }
        }

        if h == w && nu == 0 {
            return Ok(());
        }
        let diag: Vec<T> = (0..w).flat_map(|j| self.lower[j * h..j * h + w].iter().copied()).collect();
        if h > w {
            T::trsm_right_upper(h - w, w, &diag, w, &mut self.lower[w..], h);
        }
        if nu > 0 {
            T::trsm(Triangle::UnitLower, false, w, nu, &diag, w, &mut self.upper, w);
        }
        Ok(())
    }
}

/// Subtract the contribution of factored supernode `t` from the panels of
/// supernode `s` (`t < s`).
#[allow(clippy::too_many_arguments)]
pub fn apply_update<T: Scalar>(
    st: &Structure,
    t: usize,
    src: &SupernodeFactor<T>,
    s: usize,
    dst: &mut SupernodeFactor<T>,
    link: &Link,
    scratch: &mut Vec<T>,
) -> SolverResult<()> {
    let (fs, ls) = (st.first[s], st.last(s));
    let rows_t = &st.rows[t];
    let cols_t = &st.cols[t];
    let (wt, ht) = (src.width, src.height);
    let missing = |what: &str, idx: usize| {
        SolverError::Internal(format!("{what} {idx} of supernode {t} is not stored in supernode {s}"))
    };

    // Rows of S_L(t) at or below the block times columns inside the block
    if link.lower {
        let r0 = rows_t.partition_point(|&x| x < fs);
        let cr = Structure::range_in(cols_t, fs, ls);
        let (m, nc) = (rows_t.len() - r0, cr.len());
        if m > 0 && nc > 0 {
            scratch.clear();
            scratch.resize(m * nc, T::zero());
            T::gemm(m, nc, wt, &src.lower[wt + r0..], ht, &src.upper[cr.start * wt..], wt, scratch, m);
            let pos = rows_t[r0..]
                .iter()
                .map(|&r| st.row_position(s, r).ok_or_else(|| missing("row", r)))
                .collect::<SolverResult<Vec<usize>>>()?;
            for (c, &col) in cols_t[cr].iter().enumerate() {
                let target = &mut dst.lower[(col - fs) * dst.height..(col - fs + 1) * dst.height];
                let upd = &scratch[c * m..(c + 1) * m];
                for (&p, &v) in pos.iter().zip(upd) {
                    target[p] -= v;
                }
            }
        }
    }

    // Rows inside the block times columns right of it
    if link.upper {
        let rr = Structure::range_in(rows_t, fs, ls);
        let c0 = cols_t.partition_point(|&x| x <= ls);
        let (m, nc) = (rr.len(), cols_t.len() - c0);
        if m > 0 && nc > 0 {
            scratch.clear();
            scratch.resize(m * nc, T::zero());
            T::gemm(m, nc, wt, &src.lower[wt + rr.start..], ht, &src.upper[c0 * wt..], wt, scratch, m);
            let pos = cols_t[c0..]
                .iter()
                .map(|&c| st.col_position(s, c).ok_or_else(|| missing("column", c)))
                .collect::<SolverResult<Vec<usize>>>()?;
            let ws = dst.width;
            for (c, &cp) in pos.iter().enumerate() {
                let target = &mut dst.upper[cp * ws..(cp + 1) * ws];
                let upd = &scratch[c * m..(c + 1) * m];
                for (&r, &v) in rows_t[rr.clone()].iter().zip(upd) {
                    target[r - fs] -= v;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn policy() -> PivotPolicy {
        PivotPolicy { eps: 1e-14, tolerance: 1e-3 }
    }

    /// Load a dense `n x n` matrix into a single supernode with no off-block parts.
    fn dense<T: Scalar>(a: &[Vec<T>]) -> SupernodeFactor<T> {
        let n = a.len();
        let mut f = SupernodeFactor::new(n, n, 0).unwrap();
        for i in 0..n {
            for j in 0..n {
                f.lower[j * n + i] = a[i][j];
            }
        }
        f
    }

    fn check_reconstruction<T: Scalar>(a: &[Vec<T>], f: &SupernodeFactor<T>) {
        let n = a.len();
        for q in 0..n {
            for j in 0..n {
                let mut acc = T::zero();
                for k in 0..=q.min(j) {
                    let l = if k == q { T::one() } else { f.l(q, k) };
                    acc += l * f.l(k, j);
                }
                let expect = a[f.perm[q]][j];
                assert!((acc - expect).modulus() < 1e-12, "({q},{j})");
            }
        }
    }

    #[test]
    fn test_factor_without_pivoting() {
        let a = vec![vec![4.0, 1.0, 0.0], vec![1.0, 5.0, 2.0], vec![0.0, 2.0, 6.0]];
        let mut f = dense(&a);
        f.factor(&policy(), 0).unwrap();
        assert_eq!(f.perm, vec![0, 1, 2]);
        assert_eq!(f.offdiag, 0);
        assert!(!f.odd_swaps);
        check_reconstruction(&a, &f);
    }

    #[test]
    fn test_zero_diagonal_swaps_rows() {
        let a = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let mut f = dense(&a);
        f.factor(&policy(), 0).unwrap();
        assert_eq!(f.perm, vec![1, 0]);
        assert_eq!(f.offdiag, 1);
        assert!(f.odd_swaps);
        check_reconstruction(&a, &f);
    }

    #[test]
    fn test_tiny_diagonal_below_tolerance_swaps() {
        let a = vec![vec![1e-6, 1.0], vec![2.0, 1.0]];
        let mut f = dense(&a);
        f.factor(&policy(), 0).unwrap();
        assert_eq!(f.offdiag, 1);
        check_reconstruction(&a, &f);
    }

    #[test]
    fn test_singular_block_is_perturbed() {
        let a = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        let mut f = dense(&a);
        f.factor(&policy(), 7).unwrap();
        assert_eq!(f.perturbed, 1);
        assert!((f.diag(1).modulus() - 1e-14).abs() < 1e-20);
    }

    #[test]
    fn test_non_finite_pivot() {
        let a = vec![vec![f64::NAN, 1.0], vec![1.0, 1.0]];
        let mut f = dense(&a);
        let err = f.factor(&policy(), 3).unwrap_err();
        assert_eq!(err, SolverError::NumericallySingular { index: 3 });
    }

    #[test]
    fn test_complex_factor() {
        let c = |re, im| Complex64::new(re, im);
        let a = vec![
            vec![c(0.0, 0.0), c(2.0, 1.0), c(1.0, 0.0)],
            vec![c(1.0, -1.0), c(3.0, 0.0), c(0.0, 2.0)],
            vec![c(0.5, 0.0), c(0.0, 0.0), c(4.0, 4.0)],
        ];
        let mut f = dense(&a);
        f.factor(&policy(), 0).unwrap();
        assert_eq!(f.offdiag, 1);
        check_reconstruction(&a, &f);
    }

    #[test]
    fn test_l21_and_u12_are_eliminated() {
        // Block of width 2 with one row below and one column right:
        // [2 1 | 3]
        // [1 3 | 1]
        // [4 2 | .]
        let mut f = SupernodeFactor::<f64>::new(2, 3, 1).unwrap();
        f.lower = vec![2.0, 1.0, 4.0, 1.0, 3.0, 2.0];
        f.upper = vec![3.0, 1.0];
        f.factor(&policy(), 0).unwrap();
        assert_eq!(f.perm, vec![0, 1]);
        // L21 = [2, 0] since the row below equals 2 * row 0
        assert!((f.l(2, 0) - 2.0).abs() < 1e-14);
        assert!(f.l(2, 1).abs() < 1e-14);
        // U12 = [3, 1 - 0.5 * 3]
        assert!((f.u(0, 0) - 3.0).abs() < 1e-14);
        assert!((f.u(1, 0) + 0.5).abs() < 1e-14);
    }
}
