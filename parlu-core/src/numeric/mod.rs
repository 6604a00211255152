//! Supernodal numeric factorization.
//!
//! # Algorithm
//!
//! Left-looking: the task for supernode `s` assembles the scaled input
//! values into zeroed panels, subtracts the update of every earlier
//! supernode linked to it, then factors the panels densely with pivoting
//! restricted to the diagonal block. A task becomes ready once all the
//! supernodes it reads from are finished, so independent subtrees of the
//! elimination tree factor concurrently on the instance pool.
//!
//! Pivots below `10^perturbation_exponent * max|Â|` that cannot be replaced
//! by a row swap are perturbed to that magnitude, keeping their phase.

pub mod panel;

use crate::config::Config;
use crate::error::{try_alloc, SolverError, SolverResult};
use crate::matrix::CsrPattern;
use crate::scalar::Scalar;
use crate::scaling::Scaling;
use crate::schedule::{self, TaskGraph};
use crate::symbolic::Symbolic;
use panel::{PivotPolicy, SupernodeFactor};
use rayon::ThreadPool;
use std::sync::OnceLock;

/// Numeric factors of `B = P A Q` after scaling.
#[derive(Debug, Clone)]
pub struct Factors<T> {
    pub supernodes: Vec<SupernodeFactor<T>>,
    /// Perturbation threshold used for this factorization.
    pub eps: f64,
    pub offdiag_pivots: usize,
    pub perturbed_pivots: usize,
    /// Parity of all local row swaps.
    pub odd_swaps: bool,
}

impl<T: Scalar> Factors<T> {
    pub fn bytes(&self) -> usize {
        self.supernodes.iter().map(|f| f.bytes()).sum()
    }
}

/// `Â = diag(row_scale) A diag(col_scale)` in the input's storage order.
pub fn scaled_values<T: Scalar>(pattern: &CsrPattern, scaling: &Scaling, values: &[T]) -> SolverResult<Vec<T>> {
    let mut out = try_alloc(values.len(), T::zero())?;
    for i in 0..pattern.n {
        for p in pattern.row_ptr[i]..pattern.row_ptr[i + 1] {
            out[p] = scaling.apply(i, pattern.col_idx[p], values[p]);
        }
    }
    Ok(out)
}

/// Factor the scaled values `scaled` on the structure from `symbolic`.
pub fn factorize<T: Scalar>(
    symbolic: &Symbolic,
    scaled: &[T],
    config: &Config,
    pool: Option<&ThreadPool>,
) -> SolverResult<Factors<T>> {
    let st = &symbolic.structure;
    let ns = st.count();

    let max_abs = scaled.iter().map(|v| v.modulus()).fold(0.0f64, f64::max);
    let eps = 10f64.powi(config.perturbation_exponent) * max_abs;
    if !(eps > 0.0 && eps.is_finite()) {
        return Err(SolverError::NumericallySingular { index: 0 });
    }
    let policy = PivotPolicy { eps, tolerance: config.pivot_tolerance.clamp(0.0, 1.0) };

    let slots: Vec<OnceLock<SupernodeFactor<T>>> = (0..ns).map(|_| OnceLock::new()).collect();
    let graph = TaskGraph::from_links(st, |_| true, false);
    log::debug!("numeric: {ns} supernodes, dependency depth {}", graph.depth());

    schedule::run(&graph, pool, |s| {
        let factor = factor_supernode(symbolic, scaled, &slots, s, &policy)?;
        slots[s]
            .set(factor)
            .map_err(|_| SolverError::Internal(format!("supernode {s} factored twice")))
    })?;

    let supernodes = slots
        .into_iter()
        .enumerate()
        .map(|(s, slot)| {
            slot.into_inner()
                .ok_or_else(|| SolverError::Internal(format!("supernode {s} was not factored")))
        })
        .collect::<SolverResult<Vec<_>>>()?;

    let offdiag_pivots = supernodes.iter().map(|f| f.offdiag).sum();
    let perturbed_pivots = supernodes.iter().map(|f| f.perturbed).sum();
    let odd_swaps = supernodes.iter().filter(|f| f.odd_swaps).count() % 2 == 1;
    if perturbed_pivots > 0 {
        log::warn!("{perturbed_pivots} pivots perturbed to {eps:.3e}");
    }
    Ok(Factors { supernodes, eps, offdiag_pivots, perturbed_pivots, odd_swaps })
}

fn factor_supernode<T: Scalar>(
    symbolic: &Symbolic,
    scaled: &[T],
    slots: &[OnceLock<SupernodeFactor<T>>],
    s: usize,
    policy: &PivotPolicy,
) -> SolverResult<SupernodeFactor<T>> {
    let st = &symbolic.structure;
    let mut factor = SupernodeFactor::new(st.width(s), st.height(s), st.cols[s].len())?;
    for e in symbolic.assembly_of(s) {
        if e.upper {
            factor.upper[e.dst] += scaled[e.src];
        } else {
            factor.lower[e.dst] += scaled[e.src];
        }
    }

    let mut scratch = Vec::new();
    for link in &st.incoming[s] {
        let src = slots[link.from]
            .get()
            .ok_or_else(|| SolverError::Internal(format!("supernode {} not ready for {s}", link.from)))?;
        panel::apply_update(st, link.from, src, s, &mut factor, link, &mut scratch)?;
    }
    factor.factor(policy, st.first[s])?;
    Ok(factor)
}
