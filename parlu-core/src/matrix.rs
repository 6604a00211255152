//! Validated compressed sparse row input.
//!
//! [`MatrixView`] borrows the caller's arrays as they arrive at the API
//! boundary. [`CsrPattern`] is the validated, `usize`-indexed copy of the
//! structure the engine keeps between calls.

use crate::error::{SolverError, SolverResult};
use crate::scalar::{Scalar, SolverIndex};

/// Borrowed CSR description of a square matrix.
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a, I: SolverIndex, T: Scalar> {
    pub n: I,
    pub row_ptr: &'a [I],
    pub col_idx: &'a [I],
    pub values: Option<&'a [T]>,
}

impl<'a, I: SolverIndex, T: Scalar> MatrixView<'a, I, T> {
    pub fn new(n: I, row_ptr: &'a [I], col_idx: &'a [I], values: Option<&'a [T]>) -> Self {
        Self { n, row_ptr, col_idx, values }
    }

    /// Check the structure and convert it to `usize` indices.
    pub fn validate(&self) -> SolverResult<CsrPattern> {
        let pattern = CsrPattern::from_raw(self.n, self.row_ptr, self.col_idx)?;
        if let Some(values) = self.values {
            pattern.check_values(values)?;
        }
        Ok(pattern)
    }
}

/// Square sparsity pattern in CSR form with `usize` indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrPattern {
    pub n: usize,
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
}

impl CsrPattern {
    /// Validate raw CSR arrays.
    ///
    /// Row pointers must start at zero and be non-decreasing; column
    /// indices must lie in `[0, n)` and be unique within each row.
    pub fn from_raw<I: SolverIndex>(n: I, ap: &[I], ai: &[I]) -> SolverResult<Self> {
        let n = n
            .to_usize()
            .ok_or_else(|| SolverError::Argument("matrix dimension is negative".into()))?;
        if n == 0 {
            return Err(SolverError::Argument("matrix dimension must be positive".into()));
        }
        if ap.len() < n + 1 {
            return Err(SolverError::Argument(format!(
                "row pointer array has {} entries, expected {}",
                ap.len(),
                n + 1
            )));
        }

        let mut row_ptr = Vec::with_capacity(n + 1);
        for &p in &ap[..=n] {
            let p = p
                .to_usize()
                .ok_or_else(|| SolverError::InvalidMatrix("negative row pointer".into()))?;
            if let Some(&prev) = row_ptr.last() {
                if p < prev {
                    return Err(SolverError::InvalidMatrix("row pointers decrease".into()));
                }
            } else if p != 0 {
                return Err(SolverError::InvalidMatrix("first row pointer is not zero".into()));
            }
            row_ptr.push(p);
        }

        let nnz = row_ptr[n];
        if ai.len() < nnz {
            return Err(SolverError::Argument(format!(
                "column index array has {} entries, expected {}",
                ai.len(),
                nnz
            )));
        }

        let mut col_idx = Vec::with_capacity(nnz);
        let mut mark = vec![usize::MAX; n];
        for i in 0..n {
            for &j in &ai[row_ptr[i]..row_ptr[i + 1]] {
                let j = j
                    .to_usize()
                    .filter(|&j| j < n)
                    .ok_or_else(|| {
                        SolverError::InvalidMatrix(format!("column index out of range in row {i}"))
                    })?;
                if mark[j] == i {
                    return Err(SolverError::InvalidMatrix(format!(
                        "duplicate column {j} in row {i}"
                    )));
                }
                mark[j] = i;
                col_idx.push(j);
            }
        }

        Ok(Self { n, row_ptr, col_idx })
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.row_ptr[self.n]
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Check that a value slice covers every stored entry.
    pub fn check_values<T>(&self, values: &[T]) -> SolverResult<()> {
        if values.len() < self.nnz() {
            return Err(SolverError::Argument(format!(
                "value array has {} entries, expected {}",
                values.len(),
                self.nnz()
            )));
        }
        Ok(())
    }

    /// Column-oriented copy: `(col_ptr, row_idx, src)` where `src[p]` is
    /// the position of the entry in the row-oriented arrays.
    pub fn transpose(&self) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        let n = self.n;
        let mut col_ptr = vec![0usize; n + 1];
        for &j in &self.col_idx {
            col_ptr[j + 1] += 1;
        }
        for j in 0..n {
            col_ptr[j + 1] += col_ptr[j];
        }
        let mut next = col_ptr.clone();
        let mut row_idx = vec![0usize; self.nnz()];
        let mut src = vec![0usize; self.nnz()];
        for i in 0..n {
            for p in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_idx[p];
                row_idx[next[j]] = i;
                src[next[j]] = p;
                next[j] += 1;
            }
        }
        (col_ptr, row_idx, src)
    }

    /// Fraction of off-diagonal entries whose mirror entry is also stored.
    pub fn symmetry_ratio(&self) -> f64 {
        let (col_ptr, row_idx, _) = self.transpose();
        let mut mark = vec![usize::MAX; self.n];
        let mut offdiag = 0usize;
        let mut matched = 0usize;
        for i in 0..self.n {
            for &j in &row_idx[col_ptr[i]..col_ptr[i + 1]] {
                mark[j] = i;
            }
            for &j in self.row(i) {
                if j != i {
                    offdiag += 1;
                    if mark[j] == i {
                        matched += 1;
                    }
                }
            }
        }
        if offdiag == 0 {
            1.0
        } else {
            matched as f64 / offdiag as f64
        }
    }

    /// Index of the first empty row or column, if any.
    pub fn first_empty_line(&self) -> Option<usize> {
        let mut col_seen = vec![false; self.n];
        for i in 0..self.n {
            if self.row_ptr[i] == self.row_ptr[i + 1] {
                return Some(i);
            }
            for &j in self.row(i) {
                col_seen[j] = true;
            }
        }
        col_seen.iter().position(|&seen| !seen)
    }
}
