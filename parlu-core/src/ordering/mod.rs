//! Fill-reducing ordering engine.
//!
//! Runs on the symmetrized pattern of the row-permuted matrix (after
//! static pivoting) and returns a symmetric permutation. Explicit methods
//! run directly; best-of selectors run every candidate and keep the one
//! with the smallest predicted factor size; `Auto` picks AMD for small or
//! dense matrices and nested dissection otherwise.

pub mod amd;
pub mod graph;
pub mod matching;
pub mod nested;

use crate::config::{Config, OrderingMethod};
use crate::error::{SolverError, SolverResult};
use crate::symbolic::etree::predicted_fill;
use graph::Graph;
use nested::{Bisection, NdOptions};
use rayon::ThreadPool;

/// Result of the ordering stage.
#[derive(Debug, Clone)]
pub struct Ordering {
    /// `order[k]` is the vertex eliminated k-th.
    pub order: Vec<usize>,
    /// Concrete method that produced `order`.
    pub method: OrderingMethod,
    /// Predicted nonzeros of the symmetric factor (0 when not evaluated).
    pub predicted_fill: usize,
}

/// Method `Auto` resolves to for `graph`.
pub fn auto_method(graph: &Graph, config: &Config) -> OrderingMethod {
    let avg_degree = if graph.n == 0 { 0.0 } else { graph.adj.len() as f64 / graph.n as f64 };
    if graph.n <= config.effective_switch() || avg_degree > config.dense_row_ratio {
        OrderingMethod::Amd
    } else {
        OrderingMethod::NestedDissection
    }
}

/// Compute a fill-reducing order of `graph`.
pub fn compute_ordering(graph: &Graph, config: &Config, pool: Option<&ThreadPool>) -> SolverResult<Ordering> {
    let candidates: Vec<OrderingMethod> = match config.ordering {
        OrderingMethod::Auto => vec![auto_method(graph, config)],
        method => method.candidates().to_vec(),
    };

    let mut best: Option<Ordering> = None;
    for &method in &candidates {
        let order = run_method(graph, method, config, pool)?;
        check_permutation(&order, graph.n)?;
        let fill = if candidates.len() > 1 { predicted_fill(graph, &order) } else { 0 };
        log::debug!("ordering {method:?}: predicted fill {fill}");
        let better = best.as_ref().map_or(true, |b| fill < b.predicted_fill);
        if better {
            best = Some(Ordering { order, method, predicted_fill: fill });
        }
    }
    best.ok_or_else(|| SolverError::Internal("no ordering candidate".into()))
}

fn run_method(
    graph: &Graph,
    method: OrderingMethod,
    config: &Config,
    pool: Option<&ThreadPool>,
) -> SolverResult<Vec<usize>> {
    let nd = |bisection: Bisection| -> SolverResult<Vec<usize>> {
        let mut opts = NdOptions {
            bisection,
            leaf_size: config.nd_leaf_size.max(2),
            max_depth: config.nd_max_depth,
            parallel: false,
        };
        match pool {
            Some(pool) if config.parallel_nd => {
                opts.parallel = true;
                pool.install(|| nested::nested_dissection(graph, &opts))
            }
            _ => nested::nested_dissection(graph, &opts),
        }
    };
    match method {
        OrderingMethod::Amd => amd::amd(graph),
        OrderingMethod::AmdVariant => Ok(amd::minimum_fill(graph)),
        OrderingMethod::NestedDissection => nd(Bisection::LevelSet),
        OrderingMethod::NestedDissectionVariant => nd(Bisection::Bfs),
        other => Err(SolverError::Internal(format!("{other:?} is not a concrete ordering"))),
    }
}

fn check_permutation(order: &[usize], n: usize) -> SolverResult<()> {
    let mut seen = vec![false; n];
    if order.len() != n {
        return Err(SolverError::Internal(format!("ordering has {} entries for {n} vertices", order.len())));
    }
    for &v in order {
        if v >= n || seen[v] {
            return Err(SolverError::Internal("ordering is not a permutation".into()));
        }
        seen[v] = true;
    }
    Ok(())
}
