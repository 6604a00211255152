//! Nested dissection ordering.
//!
//! # Algorithm
//!
//! Each connected subgraph is split by a vertex separator `S` into two
//! halves `A` and `B` with no edge between them; `A` and `B` are ordered
//! recursively and `S` is numbered last. Subgraphs at or below the leaf
//! size are ordered with AMD. The two halves are independent, so the
//! recursion forks with `rayon::join` when parallel dissection is enabled.
//!
//! Two bisection strategies are available:
//!
//! - [`Bisection::LevelSet`]: breadth-first levels from a pseudo-peripheral
//!   vertex; the level holding the median vertex becomes the separator.
//! - [`Bisection::Bfs`]: the first half of the breadth-first order forms
//!   `A`; vertices of the second half adjacent to `A` form the separator.
//!
//! Separator vertices without neighbours in `B` are moved into `A`.

use super::amd::amd;
use super::graph::Graph;
use crate::error::{SolverError, SolverResult};

/// Separator construction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bisection {
    LevelSet,
    Bfs,
}

/// Recursion controls.
#[derive(Debug, Clone, Copy)]
pub struct NdOptions {
    pub bisection: Bisection,
    pub leaf_size: usize,
    pub max_depth: usize,
    /// Fork the two halves onto the current rayon pool.
    pub parallel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
    Sep,
}

/// Nested dissection order of `graph`; `order[k]` is the k-th pivot.
pub fn nested_dissection(graph: &Graph, opts: &NdOptions) -> SolverResult<Vec<usize>> {
    let labels: Vec<usize> = (0..graph.n).collect();
    dissect(graph, &labels, opts, 0)
}

fn leaf_order(graph: &Graph, labels: &[usize]) -> SolverResult<Vec<usize>> {
    Ok(amd(graph)?.into_iter().map(|v| labels[v]).collect())
}

fn dissect(graph: &Graph, labels: &[usize], opts: &NdOptions, depth: usize) -> SolverResult<Vec<usize>> {
    if graph.n <= opts.leaf_size.max(2) {
        return leaf_order(graph, labels);
    }
    if depth >= opts.max_depth {
        log::debug!("nested dissection reached depth {depth}, ordering {} vertices with AMD", graph.n);
        return leaf_order(graph, labels);
    }

    let comps = graph.components();
    if comps.len() > 1 {
        let mut out = Vec::with_capacity(graph.n);
        for comp in &comps {
            let sub = graph.subgraph(comp);
            let sub_labels: Vec<usize> = comp.iter().map(|&v| labels[v]).collect();
            out.extend(dissect(&sub, &sub_labels, opts, depth + 1)?);
        }
        return Ok(out);
    }

    let side = match bisect(graph, opts.bisection) {
        Some(side) => side,
        None => return leaf_order(graph, labels),
    };
    let collect = |which: Side| -> Vec<usize> { (0..graph.n).filter(|&v| side[v] == which).collect() };
    let part_a = collect(Side::A);
    let part_b = collect(Side::B);
    let sep = collect(Side::Sep);
    if part_a.is_empty() || part_b.is_empty() {
        return leaf_order(graph, labels);
    }
    if part_a.len() >= graph.n || part_b.len() >= graph.n {
        return Err(SolverError::Internal("nested dissection split did not shrink the graph".into()));
    }

    let graph_a = graph.subgraph(&part_a);
    let graph_b = graph.subgraph(&part_b);
    let labels_a: Vec<usize> = part_a.iter().map(|&v| labels[v]).collect();
    let labels_b: Vec<usize> = part_b.iter().map(|&v| labels[v]).collect();

    let (order_a, order_b) = if opts.parallel && graph.n > 4 * opts.leaf_size {
        rayon::join(
            || dissect(&graph_a, &labels_a, opts, depth + 1),
            || dissect(&graph_b, &labels_b, opts, depth + 1),
        )
    } else {
        (
            dissect(&graph_a, &labels_a, opts, depth + 1),
            dissect(&graph_b, &labels_b, opts, depth + 1),
        )
    };

    let mut out = order_a?;
    out.reserve(graph.n - out.len());
    out.extend(order_b?);
    out.extend(sep.iter().map(|&v| labels[v]));
    Ok(out)
}

/// Split a connected graph; `None` when no useful separator exists.
fn bisect(graph: &Graph, bisection: Bisection) -> Option<Vec<Side>> {
    let n = graph.n;
    let (_, levels) = graph.pseudo_peripheral(0);
    if levels.depth() < 3 {
        return None;
    }

    let mut side = vec![Side::B; n];
    match bisection {
        Bisection::LevelSet => {
            let half = n / 2;
            let mut sep_level = 1;
            while sep_level + 1 < levels.depth() - 1 && levels.level_ptr[sep_level + 1] <= half {
                sep_level += 1;
            }
            for l in 0..levels.depth() {
                let which = match l.cmp(&sep_level) {
                    std::cmp::Ordering::Less => Side::A,
                    std::cmp::Ordering::Equal => Side::Sep,
                    std::cmp::Ordering::Greater => Side::B,
                };
                for &v in levels.level(l) {
                    side[v] = which;
                }
            }
        }
        Bisection::Bfs => {
            for &v in &levels.order[..n / 2] {
                side[v] = Side::A;
            }
            for &v in &levels.order[n / 2..] {
                if graph.neighbors(v).iter().any(|&w| side[w] == Side::A) {
                    side[v] = Side::Sep;
                }
            }
        }
    }

    // Thin the separator
    for v in 0..n {
        if side[v] == Side::Sep && !graph.neighbors(v).iter().any(|&w| side[w] == Side::B) {
            side[v] = Side::A;
        }
    }
    Some(side)
}
