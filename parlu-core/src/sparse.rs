//! Sparse matrix helpers built on `sprs`.
//!
//! Conversions between `sprs` containers and the raw CSR arrays accepted by
//! the solver, plus the residual routines used by iterative refinement and
//! by callers validating a solution.

use crate::error::{SolverError, SolverResult};
use crate::scalar::{Scalar, SolverIndex};
use sprs::{CsMat, TriMat};

/// Raw CSR arrays of a square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrArrays<I, T> {
    pub n: I,
    pub row_ptr: Vec<I>,
    pub col_idx: Vec<I>,
    pub values: Vec<T>,
}

/// Build an `n x n` CSR matrix from `(row, col, value)` triplets.
///
/// Duplicate entries are summed.
pub fn from_triplets<T: Scalar>(n: usize, triplets: &[(usize, usize, T)]) -> CsMat<T> {
    let mut tri = TriMat::new((n, n));
    for &(i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csr()
}

/// Extract the raw arrays of a CSR matrix, converting indices to `I`.
pub fn csr_arrays<I: SolverIndex, T: Scalar>(a: &CsMat<T>) -> SolverResult<CsrArrays<I, T>> {
    if !a.is_csr() {
        return Err(SolverError::Argument("expected CSR storage".into()));
    }
    let (rows, cols) = a.shape();
    if rows != cols {
        return Err(SolverError::Argument(format!("matrix is {rows}x{cols}, expected square")));
    }
    let convert = |v: usize| I::from_usize(v).ok_or(SolverError::IntegerOverflow);
    let row_ptr = a
        .indptr()
        .raw_storage()
        .iter()
        .map(|&p| convert(p))
        .collect::<SolverResult<Vec<I>>>()?;
    let col_idx = a
        .indices()
        .iter()
        .map(|&j| convert(j))
        .collect::<SolverResult<Vec<I>>>()?;
    Ok(CsrArrays { n: convert(rows)?, row_ptr, col_idx, values: a.data().to_vec() })
}

/// Transpose raw CSR arrays (plain transpose, no conjugation).
pub fn transpose_csr<T: Scalar>(
    n: usize,
    ap: &[usize],
    ai: &[usize],
    ax: &[T],
) -> (Vec<usize>, Vec<usize>, Vec<T>) {
    let mut tri = TriMat::with_capacity((n, n), ap[n]);
    for i in 0..n {
        for p in ap[i]..ap[i + 1] {
            tri.add_triplet(ai[p], i, ax[p]);
        }
    }
    let t: CsMat<T> = tri.to_csr();
    (t.indptr().raw_storage().to_vec(), t.indices().to_vec(), t.data().to_vec())
}

/// `y = A x` or `y = A^T x` for raw CSR arrays.
pub fn spmv<T: Scalar>(
    n: usize,
    ap: &[usize],
    ai: &[usize],
    ax: &[T],
    x: &[T],
    y: &mut [T],
    transpose: bool,
) {
    if transpose {
        y[..n].iter_mut().for_each(|v| *v = T::zero());
        for i in 0..n {
            let xi = x[i];
            for p in ap[i]..ap[i + 1] {
                y[ai[p]] += ax[p] * xi;
            }
        }
    } else {
        for i in 0..n {
            let mut acc = T::zero();
            for p in ap[i]..ap[i + 1] {
                acc += ax[p] * x[ai[p]];
            }
            y[i] = acc;
        }
    }
}

/// Residual `r = b - op(A) x`, returning `||r||_1`.
pub fn residual<T: Scalar>(
    n: usize,
    ap: &[usize],
    ai: &[usize],
    ax: &[T],
    x: &[T],
    b: &[T],
    r: &mut [T],
    transpose: bool,
) -> f64 {
    spmv(n, ap, ai, ax, x, r, transpose);
    let mut norm = 0.0;
    for i in 0..n {
        r[i] = b[i] - r[i];
        norm += r[i].modulus();
    }
    norm
}

/// `||op(A) x - b||_1 / ||b||_1`; the absolute residual when `b` is zero.
pub fn relative_residual<T: Scalar>(
    n: usize,
    ap: &[usize],
    ai: &[usize],
    ax: &[T],
    x: &[T],
    b: &[T],
    transpose: bool,
) -> f64 {
    let mut r = vec![T::zero(); n];
    let num = residual(n, ap, ai, ax, x, b, &mut r, transpose);
    let den: f64 = b[..n].iter().map(|v| v.modulus()).sum();
    if den > 0.0 {
        num / den
    } else {
        num
    }
}

/// Maximum absolute column sum of a CSR matrix.
pub fn norm1<T: Scalar>(n: usize, ap: &[usize], ai: &[usize], ax: &[T]) -> f64 {
    let mut col = vec![0.0f64; n];
    for p in 0..ap[n] {
        col[ai[p]] += ax[p].modulus();
    }
    col.into_iter().fold(0.0, f64::max)
}

/// Maximum absolute row sum of a CSR matrix.
pub fn norm_inf<T: Scalar>(n: usize, ap: &[usize], ax: &[T]) -> f64 {
    (0..n)
        .map(|i| ax[ap[i]..ap[i + 1]].iter().map(|v| v.modulus()).sum::<f64>())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn scenario() -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        (vec![0, 2, 3, 5], vec![0, 1, 1, 0, 2], vec![2.0, 1.0, 3.0, 1.0, 4.0])
    }

    #[test]
    fn test_spmv_and_residual() {
        let (ap, ai, ax) = scenario();
        let x = [1.0, 1.0, 1.0];
        let mut y = [0.0; 3];
        spmv(3, &ap, &ai, &ax, &x, &mut y, false);
        assert_eq!(y, [3.0, 3.0, 5.0]);
        spmv(3, &ap, &ai, &ax, &x, &mut y, true);
        assert_eq!(y, [3.0, 4.0, 4.0]);
        let rel = relative_residual(3, &ap, &ai, &ax, &x, &[3.0, 3.0, 5.0], false);
        assert!(rel < 1e-15, "residual {rel}");
    }

    #[test]
    fn test_transpose_matches_transposed_spmv() {
        let (ap, ai, ax) = scenario();
        let (tp, ti, tx) = transpose_csr(3, &ap, &ai, &ax);
        let x = [1.0, -2.0, 0.5];
        let mut y1 = [0.0; 3];
        let mut y2 = [0.0; 3];
        spmv(3, &ap, &ai, &ax, &x, &mut y1, true);
        spmv(3, &tp, &ti, &tx, &x, &mut y2, false);
        for i in 0..3 {
            assert!((y1[i] - y2[i]).abs() < 1e-15);
        }
    }

    #[test]
    fn test_csr_arrays_roundtrip_sprs() {
        let a = from_triplets(2, &[(0, 0, Complex64::new(1.0, 2.0)), (1, 0, Complex64::new(0.0, 1.0)), (1, 1, Complex64::new(3.0, 0.0))]);
        let raw: CsrArrays<i32, Complex64> = csr_arrays(&a).unwrap();
        assert_eq!(raw.n, 2);
        assert_eq!(raw.row_ptr, vec![0, 1, 3]);
        assert_eq!(raw.col_idx, vec![0, 0, 1]);
        assert_eq!(raw.values[1], Complex64::new(0.0, 1.0));
    }

    #[test]
    fn test_norm1() {
        let (ap, ai, ax) = scenario();
        assert_eq!(norm1(3, &ap, &ai, &ax), 4.0);
        assert_eq!(norm_inf(3, &ap, &ax), 5.0);
    }
}
