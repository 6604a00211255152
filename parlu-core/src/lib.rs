//! parlu: a multi-threaded supernodal sparse direct solver
//!
//! Solves `A x = b` for general (structurally unsymmetric) sparse matrices
//! given in compressed sparse row form. Four families share one generic
//! engine:
//!
//! - **Real, 32-bit indices**: [`RealSolver`]
//! - **Real, 64-bit indices**: [`LongRealSolver`]
//! - **Complex, 32-bit indices**: [`ComplexSolver`]
//! - **Complex, 64-bit indices**: [`LongComplexSolver`]
//!
//! # Algorithm
//!
//! 1. **Analyze**: static pivoting (maximum-product matching), a
//!    fill-reducing ordering (AMD, nested dissection or best-of), the
//!    elimination tree and the supernode partition with exact panel
//!    structure.
//! 2. **Factorize**: Ruiz scaling, then a left-looking supernodal LU over a
//!    dependency schedule on the instance's thread pool. Small pivots are
//!    swapped within the diagonal block or perturbed, never fatal.
//! 3. **Solve**: supernodal forward/backward substitution, transposed solves
//!    and iterative refinement against the original values.
//!
//! Determinant and condition-number estimates are available once factored.
//!
//! # Example
//!
//! ```
//! use parlu_core::RealSolver;
//!
//! // [2 1 0; 0 3 0; 1 0 4]
//! let ap = [0, 2, 3, 5];
//! let ai = [0, 1, 1, 0, 2];
//! let ax = [2.0, 1.0, 3.0, 1.0, 4.0];
//!
//! let mut solver = RealSolver::new(1)?;
//! solver.analyze(false, 3, &ap, &ai, Some(&ax))?;
//! solver.factorize(&ax)?;
//! let mut x = [0.0; 3];
//! solver.solve(false, &[3.0, 3.0, 5.0], &mut x)?;
//! assert!(x.iter().all(|v| (v - 1.0).abs() < 1e-12));
//! # Ok::<(), parlu_core::SolverError>(())
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // dense kernels take raw dimensions and strides
#![allow(clippy::needless_range_loop)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod matrix;
pub mod numeric;
pub mod ordering;
pub mod perf;
pub mod refine;
pub mod scalar;
pub mod scaling;
pub mod schedule;
pub mod solve;
pub mod solver;
pub mod sparse;
pub mod stats;
pub mod symbolic;

pub use config::{Config, OrderingMethod, RefinementPolicy, ScalingMode, SymbolicMode, TimerMode};
pub use diagnostics::Determinant;
pub use error::{SolverError, SolverResult};
pub use matrix::{CsrPattern, MatrixView};
pub use scalar::{Scalar, SolverIndex};
pub use solver::{ComplexSolver, LongComplexSolver, LongRealSolver, RealSolver, Solver, SolverState};
pub use stats::{Stats, ThreadInfo};

pub use num_complex::Complex64;
