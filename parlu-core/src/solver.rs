//! Solver instance and its lifecycle.
//!
//! A [`Solver`] owns the thread pool, the [`Config`]/[`Stats`] pair and
//! everything derived from the matrix:
//!
//! ```text
//! Created --analyze--> Analyzed --factorize--> Factorized --solve--> Solved
//!                        ^  |                     ^  |                 |
//!                        |  +--------analyze------+  +----factorize----+
//! ```
//!
//! A call that fails leaves the state it found untouched, except for a
//! failed factorization, which discards the previous factors and returns
//! the instance to `Analyzed`.

use crate::config::{Config, ScalingMode};
use crate::diagnostics::{self, Determinant};
use crate::error::{try_alloc, SolverError, SolverResult};
use crate::matrix::{CsrPattern, MatrixView};
use crate::numeric::{self, Factors};
use crate::ordering::{self, graph::Graph, matching};
use crate::perf::{PerfSection, PerfTimers};
use crate::refine::{self, CsrRef};
use crate::scalar::{Scalar, SolverIndex};
use crate::scaling::Scaling;
use crate::solve::SolveContext;
use crate::sparse;
use crate::stats::{Stats, ThreadInfo};
use crate::symbolic::structure::Structure;
use crate::symbolic::{self, AssemblyEntry, Symbolic};
use num_complex::Complex64;
use rayon::ThreadPool;
use std::marker::PhantomData;
use std::mem::size_of;
use std::time::Instant;

/// Lifecycle state of a [`Solver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SolverState {
    Created,
    Analyzed,
    Factorized,
    Solved,
}

/// Structure-only results kept between factorizations.
struct Analysis {
    pattern: CsrPattern,
    symbolic: Symbolic,
    /// Scale factors from analysis-time values (`ScalingMode::Static`).
    static_scaling: Option<Scaling>,
}

impl Analysis {
    fn bytes(&self) -> usize {
        let words = self.pattern.row_ptr.len()
            + self.pattern.col_idx.len()
            + 2 * self.symbolic.n
            + self.symbolic.structure.first.len()
            + self.symbolic.structure.owner.len()
            + self.symbolic.structure.rows.iter().map(Vec::len).sum::<usize>()
            + self.symbolic.structure.cols.iter().map(Vec::len).sum::<usize>()
            + 3 * self.symbolic.structure.incoming.iter().map(Vec::len).sum::<usize>()
            + self.symbolic.assembly_ptr.len();
        let scaling = self.static_scaling.as_ref().map_or(0, |s| 2 * s.row_scale.len() * size_of::<f64>());
        words * size_of::<usize>() + self.symbolic.assembly.len() * size_of::<AssemblyEntry>() + scaling
    }
}

/// Numeric results of one factorization.
struct Factorization<T> {
    /// Unscaled input values, used by refinement and the condition estimate.
    values: Vec<T>,
    scaling: Scaling,
    factors: Factors<T>,
}

impl<T: Scalar> Factorization<T> {
    fn bytes(&self) -> usize {
        self.values.len() * size_of::<T>() + 2 * self.scaling.row_scale.len() * size_of::<f64>() + self.factors.bytes()
    }
}

/// Sparse direct solver for `A x = b`, generic over the index type used at
/// the API boundary and the value type.
pub struct Solver<I: SolverIndex, T: Scalar> {
    config: Config,
    stats: Stats,
    pool: Option<ThreadPool>,
    state: SolverState,
    analysis: Option<Analysis>,
    factorization: Option<Factorization<T>>,
    _index: PhantomData<I>,
}

/// Real values, 32-bit indices.
pub type RealSolver = Solver<i32, f64>;
/// Real values, 64-bit indices.
pub type LongRealSolver = Solver<i64, f64>;
/// Complex values, 32-bit indices.
pub type ComplexSolver = Solver<i32, Complex64>;
/// Complex values, 64-bit indices.
pub type LongComplexSolver = Solver<i64, Complex64>;

/// Resolve a thread request: 1 is sequential, 0 all physical cores,
/// negative all logical cores.
///
/// The physical core count is approximate: SMT siblings cannot be told
/// apart through the standard library, so it is reported as the logical
/// count and a request for 0 threads uses every logical core.
fn thread_plan(threads: i32) -> ThreadInfo {
    let logical = std::thread::available_parallelism().map_or(1, |n| n.get());
    // Approximation: one physical core per logical core
    let physical = logical;
    let requested = match threads {
        0 => physical,
        t if t < 0 => logical,
        t => t as usize,
    };
    let created = if requested > logical {
        log::warn!("{requested} threads requested, only {logical} logical cores; using {logical}");
        logical
    } else {
        requested
    };
    ThreadInfo { physical, logical, created }
}

/// Factor panels and counts must be addressable by the family's index type.
fn check_index_range<I: SolverIndex>(structure: &Structure, nnz: usize) -> SolverResult<()> {
    let limit = I::max_usize();
    if structure.panel_entries() > limit || nnz > limit {
        return Err(SolverError::IntegerOverflow);
    }
    Ok(())
}

impl<I: SolverIndex, T: Scalar> Solver<I, T> {
    /// Create an instance with its own thread pool.
    pub fn new(threads: i32) -> SolverResult<Self> {
        Self::with_config(threads, Config::default())
    }

    pub fn with_config(threads: i32, config: Config) -> SolverResult<Self> {
        let info = thread_plan(threads);
        let pool = if info.created > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(info.created)
                .thread_name(|i| format!("parlu-{i}"))
                .build()
                .map_err(|e| SolverError::Threads(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        log::debug!("solver created with {} worker threads", info.created);
        Ok(Self {
            config,
            stats: Stats::new(info),
            pool,
            state: SolverState::Created,
            analysis: None,
            factorization: None,
            _index: PhantomData,
        })
    }

    /// Create an instance running on a caller-supplied pool.
    ///
    /// The pool's size is used as is, without clamping to the core count.
    pub fn with_pool(pool: ThreadPool, config: Config) -> Self {
        let logical = std::thread::available_parallelism().map_or(1, |n| n.get());
        let created = pool.current_num_threads();
        log::debug!("solver created on a supplied pool of {created} threads");
        Self {
            config,
            stats: Stats::new(ThreadInfo { physical: logical, logical, created }),
            pool: (created > 1).then_some(pool),
            state: SolverState::Created,
            analysis: None,
            factorization: None,
            _index: PhantomData,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Dimension of the analyzed matrix.
    pub fn n(&self) -> Option<usize> {
        self.analysis.as_ref().map(|a| a.pattern.n)
    }

    /// Stored entries of the analyzed matrix.
    pub fn nnz(&self) -> Option<usize> {
        self.analysis.as_ref().map(|a| a.pattern.nnz())
    }

    fn memory_in_use(&self) -> usize {
        self.analysis.as_ref().map_or(0, Analysis::bytes) + self.factorization.as_ref().map_or(0, Factorization::bytes)
    }

    fn note_failure(&mut self, err: &SolverError) {
        if let SolverError::OutOfMemory { bytes } = err {
            self.stats.current_memory = *bytes;
        }
    }

    /// Order the matrix and compute the supernodal structure.
    ///
    /// With `repeat` set and an identical pattern already analyzed, the
    /// retained analysis is reused. `values` drive static pivoting and
    /// static scaling; without them both fall back to structure only.
    pub fn analyze(&mut self, repeat: bool, n: I, row_ptr: &[I], col_idx: &[I], values: Option<&[T]>) -> SolverResult<()> {
        let start = Instant::now();
        let result = self.analyze_inner(repeat, MatrixView::new(n, row_ptr, col_idx, values));
        if let Err(err) = &result {
            self.note_failure(err);
        }
        self.stats.record_elapsed(self.config.timer, start.elapsed());
        result
    }

    fn analyze_inner(&mut self, repeat: bool, view: MatrixView<'_, I, T>) -> SolverResult<()> {
        let mut timers = PerfTimers::default();
        let pattern = {
            let _t = timers.scoped(PerfSection::Validate);
            view.validate()?
        };
        if let Some(line) = pattern.first_empty_line() {
            return Err(SolverError::StructurallySingular { index: line });
        }
        if repeat && self.analysis.as_ref().is_some_and(|a| a.pattern == pattern) {
            log::debug!("analyze: pattern unchanged, keeping the previous analysis");
            return Ok(());
        }
        let n = pattern.n;

        let col_to_row = {
            let _t = timers.scoped(PerfSection::Matching);
            let magnitudes: Option<Vec<f64>> = view
                .values
                .filter(|_| self.config.static_pivoting)
                .map(|v| v[..pattern.nnz()].iter().map(|x| x.modulus()).collect());
            matching::static_pivoting(&pattern, magnitudes.as_deref())?
        };

        let order = {
            let _t = timers.scoped(PerfSection::Ordering);
            let graph = Graph::symmetrized(n, |j| pattern.row(col_to_row[j]));
            ordering::compute_ordering(&graph, &self.config, self.pool.as_ref())?
        };
        let row_perm: Vec<usize> = order.order.iter().map(|&k| col_to_row[k]).collect();

        let symbolic = {
            let _t = timers.scoped(PerfSection::Symbolic);
            symbolic::analyze(&pattern, &row_perm, &order.order, &self.config)?
        };
        check_index_range::<I>(&symbolic.structure, symbolic.nnz_l.saturating_add(symbolic.nnz_u))?;

        let static_scaling = match (self.config.scaling, view.values) {
            (ScalingMode::Static, Some(values)) => {
                let _t = timers.scoped(PerfSection::Scaling);
                Some(Scaling::equilibrate(&pattern, values, self.config.scaling_iterations))
            }
            _ => None,
        };

        log::debug!("analyze timings: {}", timers.summary());
        log::info!(
            "analyzed n={} nnz={} ordering={:?} symbolic={:?} supernodes={} nnz(L)={} nnz(U)={} flops={:.3e}",
            n,
            pattern.nnz(),
            order.method,
            symbolic.mode,
            symbolic.supernodes(),
            symbolic.nnz_l,
            symbolic.nnz_u,
            symbolic.factor_flops,
        );

        self.stats.selected_ordering = Some(order.method);
        self.stats.supernodes = symbolic.supernodes();
        self.stats.nnz_l = symbolic.nnz_l;
        self.stats.nnz_u = symbolic.nnz_u;
        self.stats.factor_flops = symbolic.factor_flops;
        self.stats.solve_flops = symbolic.solve_flops;
        self.analysis = Some(Analysis { pattern, symbolic, static_scaling });
        self.factorization = None;
        self.state = SolverState::Analyzed;
        self.stats.set_memory(self.memory_in_use());
        Ok(())
    }

    /// Factor new values on the analyzed structure.
    pub fn factorize(&mut self, values: &[T]) -> SolverResult<()> {
        let start = Instant::now();
        let result = self.factorize_inner(values);
        if let Err(err) = &result {
            self.note_failure(err);
        }
        self.stats.record_elapsed(self.config.timer, start.elapsed());
        result
    }

    fn factorize_inner(&mut self, values: &[T]) -> SolverResult<()> {
        let analysis = self
            .analysis
            .as_ref()
            .ok_or(SolverError::CallingProcedure("factorize called before analyze"))?;
        let pattern = &analysis.pattern;
        pattern.check_values(values)?;
        let nnz = pattern.nnz();
        let mut timers = PerfTimers::default();

        let scaling = {
            let _t = timers.scoped(PerfSection::Scaling);
            let dynamic = || Scaling::equilibrate(pattern, values, self.config.scaling_iterations);
            match self.config.scaling {
                ScalingMode::Dynamic => dynamic(),
                ScalingMode::Static => analysis.static_scaling.clone().unwrap_or_else(dynamic),
                ScalingMode::Off => Scaling::identity(pattern.n),
            }
        };

        let outcome = {
            let _t = timers.scoped(PerfSection::Numeric);
            numeric::scaled_values(pattern, &scaling, &values[..nnz])
                .and_then(|scaled| numeric::factorize(&analysis.symbolic, &scaled, &self.config, self.pool.as_ref()))
                .and_then(|factors| {
                    let mut copy = try_alloc(nnz, T::zero())?;
                    copy.copy_from_slice(&values[..nnz]);
                    Ok(Factorization { values: copy, scaling, factors })
                })
        };
        log::debug!("factorize timings: {}", timers.summary());

        let factorization = match outcome {
            Ok(f) => f,
            Err(err) => {
                self.factorization = None;
                self.state = SolverState::Analyzed;
                return Err(err);
            }
        };

        let f = &factorization.factors;
        log::info!(
            "factorized {} supernodes: {} off-diagonal pivots, {} perturbed, eps={:.3e}",
            f.supernodes.len(),
            f.offdiag_pivots,
            f.perturbed_pivots,
            f.eps,
        );
        self.stats.offdiag_pivots = f.offdiag_pivots;
        self.stats.perturbed_pivots = f.perturbed_pivots;
        self.stats.supernodes = f.supernodes.len();
        self.factorization = Some(factorization);
        self.state = SolverState::Factorized;
        self.stats.set_memory(self.memory_in_use());
        Ok(())
    }

    /// Solve `A x = b`, or `A^T x = b` when `transpose` is set.
    pub fn solve(&mut self, transpose: bool, b: &[T], x: &mut [T]) -> SolverResult<()> {
        let start = Instant::now();
        let result = self.solve_inner(transpose, b, x);
        if let Err(err) = &result {
            self.note_failure(err);
        }
        self.stats.record_elapsed(self.config.timer, start.elapsed());
        result
    }

    /// Solve with the right-hand side and the solution sharing one buffer.
    pub fn solve_in_place(&mut self, transpose: bool, bx: &mut [T]) -> SolverResult<()> {
        let n = self.n().ok_or(SolverError::CallingProcedure("solve called before factorize"))?;
        if bx.len() < n {
            return Err(SolverError::Argument(format!("vector has {} entries, expected {n}", bx.len())));
        }
        let mut b = try_alloc(n, T::zero())?;
        b.copy_from_slice(&bx[..n]);
        self.solve(transpose, &b, bx)
    }

    fn solve_inner(&mut self, transpose: bool, b: &[T], x: &mut [T]) -> SolverResult<()> {
        let (analysis, fact) = match (&self.analysis, &self.factorization) {
            (Some(a), Some(f)) => (a, f),
            _ => return Err(SolverError::CallingProcedure("solve called before factorize")),
        };
        let n = analysis.pattern.n;
        if b.len() < n || x.len() < n {
            return Err(SolverError::Argument(format!(
                "vectors have {} and {} entries, expected {n}",
                b.len(),
                x.len()
            )));
        }
        let (b, x) = (&b[..n], &mut x[..n]);
        let pool = self.pool.as_ref().filter(|_| n >= self.config.parallel_solve_threshold);
        let ctx = SolveContext { symbolic: &analysis.symbolic, scaling: &fact.scaling, factors: &fact.factors };
        let mut timers = PerfTimers::default();

        {
            let _t = timers.scoped(PerfSection::Solve);
            ctx.solve(b, x, transpose, pool)?;
        }

        let a = CsrRef {
            n,
            row_ptr: &analysis.pattern.row_ptr,
            col_idx: &analysis.pattern.col_idx,
            values: &fact.values,
        };
        let outcome = {
            let _t = timers.scoped(PerfSection::Refinement);
            refine::refine(&a, b, x, transpose, self.config.refinement, self.config.auto_refine_limit, |r, d| {
                ctx.solve(r, d, transpose, pool)
            })?
        };
        let bnorm: f64 = b.iter().map(|v| v.modulus()).sum();
        if outcome.residual.is_finite() && bnorm > 0.0 && outcome.residual / bnorm > 1e-6 {
            log::warn!(
                "refinement stagnated after {} steps at relative residual {:.3e}",
                outcome.iterations,
                outcome.residual / bnorm
            );
        }
        log::debug!("solve timings: {}", timers.summary());

        self.stats.refinements = outcome.iterations;
        self.state = SolverState::Solved;
        Ok(())
    }

    fn factored(&self) -> SolverResult<(&Analysis, &Factorization<T>)> {
        match (&self.analysis, &self.factorization) {
            (Some(a), Some(f)) => Ok((a, f)),
            _ => Err(SolverError::CallingProcedure("diagnostics require a factorization")),
        }
    }

    /// Determinant of `A` as `mantissa * 10^exponent`.
    pub fn determinant(&self) -> SolverResult<Determinant<T>> {
        let (analysis, fact) = self.factored()?;
        Ok(diagnostics::determinant(&analysis.symbolic, &fact.scaling, &fact.factors))
    }

    /// Estimate of the 1-norm condition number of `A`.
    pub fn condition_number(&self) -> SolverResult<f64> {
        let (analysis, fact) = self.factored()?;
        let n = analysis.pattern.n;
        let pool = self.pool.as_ref().filter(|_| n >= self.config.parallel_solve_threshold);
        let ctx = SolveContext { symbolic: &analysis.symbolic, scaling: &fact.scaling, factors: &fact.factors };
        let inverse = diagnostics::inverse_norm1_estimate(n, |b, x, transpose| ctx.solve(b, x, transpose, pool))?;
        let norm = sparse::norm1(n, &analysis.pattern.row_ptr, &analysis.pattern.col_idx, &fact.values);
        Ok(norm * inverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefinementPolicy;

    fn scenario() -> (Vec<i32>, Vec<i32>, Vec<f64>) {
        (vec![0, 2, 3, 5], vec![0, 1, 1, 0, 2], vec![2.0, 1.0, 3.0, 1.0, 4.0])
    }

    #[test]
    fn test_thread_plan() {
        let seq = thread_plan(1);
        assert_eq!(seq.created, 1);
        let all = thread_plan(-1);
        assert_eq!(all.created, all.logical);
        let clamped = thread_plan(i32::MAX);
        assert_eq!(clamped.created, clamped.logical);
        // Physical cores are approximated by the logical count
        assert_eq!(thread_plan(0).created, all.logical);
        assert_eq!(all.physical, all.logical);
    }

    #[test]
    fn test_supplied_pool_is_not_clamped() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let solver = RealSolver::with_pool(pool, Config::default());
        assert_eq!(solver.stats().threads.created, 4);
        let single = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        assert_eq!(RealSolver::with_pool(single, Config::default()).stats().threads.created, 1);
    }

    #[test]
    fn test_panels_beyond_i32_range_overflow() {
        // One dense 50000 x 50000 diagonal block: 2.5e9 panel entries
        let structure = Structure {
            first: vec![0, 50_000],
            owner: vec![0; 50_000],
            rows: vec![Vec::new()],
            cols: vec![Vec::new()],
            incoming: vec![Vec::new()],
        };
        assert_eq!(check_index_range::<i32>(&structure, 0), Err(SolverError::IntegerOverflow));
        assert!(check_index_range::<i64>(&structure, 0).is_ok());
        let small = Structure { first: vec![0, 2], owner: vec![0; 2], ..structure };
        assert!(check_index_range::<i32>(&small, 3).is_ok());
        assert_eq!(check_index_range::<i32>(&small, 1 << 31), Err(SolverError::IntegerOverflow));
    }

    #[test]
    fn test_lifecycle() {
        let (ap, ai, ax) = scenario();
        let mut s = RealSolver::new(1).unwrap();
        assert_eq!(s.state(), SolverState::Created);
        assert_eq!(s.factorize(&ax).unwrap_err().code(), -8);
        let mut x = [0.0; 3];
        assert_eq!(s.solve(false, &[3.0, 3.0, 5.0], &mut x).unwrap_err().code(), -8);

        s.analyze(false, 3, &ap, &ai, Some(&ax)).unwrap();
        assert_eq!(s.state(), SolverState::Analyzed);
        assert!(s.determinant().is_err());
        s.factorize(&ax).unwrap();
        assert_eq!(s.state(), SolverState::Factorized);
        s.solve(false, &[3.0, 3.0, 5.0], &mut x).unwrap();
        assert_eq!(s.state(), SolverState::Solved);
        for v in x {
            assert!((v - 1.0).abs() < 1e-12, "{x:?}");
        }
        s.factorize(&ax).unwrap();
        assert_eq!(s.state(), SolverState::Factorized);
    }

    #[test]
    fn test_failed_analyze_keeps_state() {
        let (ap, ai, ax) = scenario();
        let mut s = RealSolver::new(1).unwrap();
        s.analyze(false, 3, &ap, &ai, Some(&ax)).unwrap();
        s.factorize(&ax).unwrap();
        // Column index out of range
        let err = s.analyze(false, 3, &ap, &[0, 1, 1, 0, 7], Some(&ax)).unwrap_err();
        assert_eq!(err.code(), -3);
        assert_eq!(s.state(), SolverState::Factorized);
        assert!(s.determinant().is_ok());
    }

    #[test]
    fn test_repeat_keeps_analysis() {
        let (ap, ai, ax) = scenario();
        let mut s = RealSolver::new(1).unwrap();
        s.analyze(true, 3, &ap, &ai, Some(&ax)).unwrap();
        s.factorize(&ax).unwrap();
        s.analyze(true, 3, &ap, &ai, None).unwrap();
        assert_eq!(s.state(), SolverState::Factorized);
        s.analyze(false, 3, &ap, &ai, None).unwrap();
        assert_eq!(s.state(), SolverState::Analyzed);
    }

    #[test]
    fn test_solve_in_place_and_stats() {
        let (ap, ai, ax) = scenario();
        let mut s = RealSolver::new(1).unwrap();
        s.config_mut().refinement = RefinementPolicy::Forced(2);
        s.analyze(false, 3, &ap, &ai, Some(&ax)).unwrap();
        s.factorize(&ax).unwrap();
        let mut bx = vec![3.0, 3.0, 5.0];
        s.solve_in_place(false, &mut bx).unwrap();
        for v in &bx {
            assert!((v - 1.0).abs() < 1e-12, "{bx:?}");
        }
        let st = s.stats();
        assert_eq!(st.refinements, 2);
        assert!(st.nnz_l >= 3);
        assert!(st.supernodes >= 1);
        assert!(st.current_memory > 0);
        assert!(st.peak_memory >= st.current_memory);
        assert!(st.selected_ordering.is_some());
    }

    #[test]
    fn test_empty_row_is_structurally_singular() {
        let mut s = RealSolver::new(1).unwrap();
        let err = s.analyze(false, 2, &[0, 2, 2], &[0, 1], None).unwrap_err();
        assert_eq!(err, SolverError::StructurallySingular { index: 1 });
        assert_eq!(s.state(), SolverState::Created);
    }

    #[test]
    fn test_short_values_rejected() {
        let (ap, ai, ax) = scenario();
        let mut s = RealSolver::new(1).unwrap();
        s.analyze(false, 3, &ap, &ai, None).unwrap();
        assert_eq!(s.factorize(&ax[..4]).unwrap_err().code(), -2);
        assert_eq!(s.state(), SolverState::Analyzed);
    }

    #[test]
    fn test_condition_of_diagonal() {
        let mut s = RealSolver::new(1).unwrap();
        let ap = [0, 1, 2, 3];
        let ai = [0, 1, 2];
        let ax = [2.0, 0.5, 8.0];
        s.analyze(false, 3, &ap, &ai, Some(&ax)).unwrap();
        s.factorize(&ax).unwrap();
        let cond = s.condition_number().unwrap();
        assert!((cond - 16.0).abs() < 1e-9, "cond {cond}");
        let det = s.determinant().unwrap();
        assert!((det.value() - 8.0).abs() < 1e-12, "{det:?}");
    }
}
