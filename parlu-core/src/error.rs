//! Error types for the sparse LU solver.
//!
//! Every variant maps onto one of the integer status codes published by the
//! C interface (`0` is success, failures are negative).

use thiserror::Error;

/// Errors that can occur during analysis, factorization or solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The solver handle is null or does not point to a live instance
    #[error("invalid solver instance")]
    InvalidHandle,

    /// Malformed call arguments (bad dimension, short slices, null pointers)
    #[error("argument error: {0}")]
    Argument(String),

    /// Row pointers or column indices are structurally inconsistent
    #[error("invalid matrix: {0}")]
    InvalidMatrix(String),

    /// Storage for the factors could not be allocated
    #[error("out of memory ({bytes} bytes requested)")]
    OutOfMemory { bytes: usize },

    /// No perfect structural matching exists
    #[error("matrix is structurally singular (column {index})")]
    StructurallySingular { index: usize },

    /// Pivot perturbation could not produce a usable pivot
    #[error("matrix is numerically singular (pivot {index})")]
    NumericallySingular { index: usize },

    /// Thread pool creation failed or the thread request is invalid
    #[error("thread error: {0}")]
    Threads(String),

    /// Operation invoked out of lifecycle order
    #[error("calling procedure error: {0}")]
    CallingProcedure(&'static str),

    /// Index arithmetic exceeds the range of the index type
    #[error("integer overflow: factor size exceeds the index range")]
    IntegerOverflow,

    /// Unclassified engine fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl SolverError {
    /// Status code reported through the C interface.
    pub fn code(&self) -> i32 {
        match self {
            SolverError::InvalidHandle => -1,
            SolverError::Argument(_) => -2,
            SolverError::InvalidMatrix(_) => -3,
            SolverError::OutOfMemory { .. } => -4,
            SolverError::StructurallySingular { .. } => -5,
            SolverError::NumericallySingular { .. } => -6,
            SolverError::Threads(_) => -7,
            SolverError::CallingProcedure(_) => -8,
            SolverError::IntegerOverflow => -9,
            SolverError::Internal(_) => -10,
        }
    }
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Allocate a filled vector, reporting the requested byte count on failure.
pub(crate) fn try_alloc<T: Clone>(len: usize, fill: T) -> SolverResult<Vec<T>> {
    let bytes = len.saturating_mul(std::mem::size_of::<T>());
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| SolverError::OutOfMemory { bytes })?;
    v.resize(len, fill);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_negative() {
        let errors = vec![
            SolverError::InvalidHandle,
            SolverError::Argument("n".into()),
            SolverError::InvalidMatrix("ap".into()),
            SolverError::OutOfMemory { bytes: 8 },
            SolverError::StructurallySingular { index: 0 },
            SolverError::NumericallySingular { index: 0 },
            SolverError::Threads("pool".into()),
            SolverError::CallingProcedure("solve"),
            SolverError::IntegerOverflow,
            SolverError::Internal("x".into()),
        ];
        let codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes, (1..=10).map(|c| -c).collect::<Vec<_>>());
    }

    #[test]
    fn test_try_alloc_small() {
        let v = try_alloc(16, 0.0f64).unwrap();
        assert_eq!(v.len(), 16);
    }

    #[test]
    fn test_try_alloc_reports_bytes() {
        let err = try_alloc(usize::MAX / 4, 0u64).unwrap_err();
        match err {
            SolverError::OutOfMemory { bytes } => assert!(bytes > 0),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
