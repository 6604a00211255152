//! Minimum degree orderings.
//!
//! [`amd`] delegates to faer's approximate minimum degree. [`minimum_fill`]
//! runs a quotient-graph elimination keyed on approximate fill instead of
//! degree.
//!
//! # Minimum fill
//!
//! Eliminated vertices become *elements*; each remaining variable keeps a
//! list of adjacent variables `A_i` and adjacent elements `E_i`, and each
//! element `e` keeps its member variables `L_e`. Eliminating the pivot `p`
//! forms `L_p = A_p ∪ (∪ L_e for e ∈ E_p) \ {p}` and absorbs every element
//! of `E_p`. Degrees of the variables in `L_p` are refreshed with the
//! approximate bound of Amestoy, Davis and Duff:
//!
//! ```text
//! d_i = min(n_live - 1, d_i + |L_p \ i|, |A_i| + |L_p \ i| + Σ_{e ∈ E_i \ p} |L_e \ L_p|)
//! ```
//!
//! The pivot key is the approximate deficiency `d(d-1)/2 - c(c-1)/2`, `c`
//! being the size of the newest clique the variable belongs to. Elements
//! with `|L_e \ L_p| = 0` are absorbed aggressively. Rows denser than
//! `max(16, 10√n)` are removed up front and ordered last.

use super::graph::Graph;
use crate::error::{SolverError, SolverResult};
use faer::dyn_stack::{MemBuffer, MemStack};
use faer::sparse::linalg::amd as faer_amd;
use faer::sparse::SymbolicSparseColMatRef;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Variable,
    Element,
    Absorbed,
    Dense,
}

fn deficiency(degree: usize, clique: usize) -> usize {
    let pairs = |k: usize| k.saturating_mul(k.saturating_sub(1)) / 2;
    pairs(degree).saturating_sub(pairs(clique))
}

/// Approximate minimum degree order of `graph` computed by faer;
/// `order[k]` is the k-th pivot.
pub fn amd(graph: &Graph) -> SolverResult<Vec<usize>> {
    let n = graph.n;
    if n == 0 {
        return Ok(Vec::new());
    }
    let pattern = SymbolicSparseColMatRef::new_checked(n, n, &graph.xadj, None, &graph.adj);
    let mut perm = vec![0usize; n];
    let mut perm_inv = vec![0usize; n];
    let mut work = MemBuffer::new(faer_amd::order_scratch::<usize>(n, graph.adj.len()));
    faer_amd::order(&mut perm, &mut perm_inv, pattern, faer_amd::Control::default(), MemStack::new(&mut work))
        .map_err(|err| SolverError::Internal(format!("faer AMD failed: {err:?}")))?;
    Ok(perm)
}

/// Minimum fill elimination order; `order[k]` is the k-th pivot.
pub fn minimum_fill(graph: &Graph) -> Vec<usize> {
    let n = graph.n;
    if n == 0 {
        return Vec::new();
    }

    let dense_threshold = ((10.0 * (n as f64).sqrt()) as usize).max(16);
    let mut status: Vec<Status> = (0..n)
        .map(|v| if graph.degree(v) > dense_threshold { Status::Dense } else { Status::Variable })
        .collect();

    let mut vars: Vec<Vec<usize>> = (0..n)
        .map(|v| {
            if status[v] == Status::Dense {
                Vec::new()
            } else {
                graph.neighbors(v).iter().copied().filter(|&w| status[w] != Status::Dense).collect()
            }
        })
        .collect();
    let mut elems: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut degree: Vec<usize> = vars.iter().map(|a| a.len()).collect();
    let mut score: Vec<usize> = degree.iter().map(|&d| deficiency(d, 0)).collect();

    let mut heap = BinaryHeap::with_capacity(n);
    let mut live = 0usize;
    for v in 0..n {
        if status[v] == Status::Variable {
            heap.push(Reverse((score[v], v)));
            live += 1;
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut mark = vec![0usize; n];
    let mut stamp = 0usize;
    let mut w = vec![0isize; n];
    let mut w_stamp = vec![0usize; n];

    while let Some(Reverse((s, p))) = heap.pop() {
        if status[p] != Status::Variable || s != score[p] {
            continue;
        }

        // Pivot clique L_p
        stamp += 1;
        mark[p] = stamp;
        let mut lp = Vec::new();
        for &j in &vars[p] {
            if mark[j] != stamp {
                mark[j] = stamp;
                lp.push(j);
            }
        }
        let absorbed = std::mem::take(&mut elems[p]);
        for &e in &absorbed {
            for &j in &members[e] {
                if mark[j] != stamp && status[j] == Status::Variable {
                    mark[j] = stamp;
                    lp.push(j);
                }
            }
            status[e] = Status::Absorbed;
            members[e] = Vec::new();
        }
        vars[p] = Vec::new();
        status[p] = Status::Element;
        order.push(p);
        live -= 1;

        for &i in &lp {
            vars[i].retain(|&j| mark[j] != stamp);
            elems[i].retain(|&e| status[e] == Status::Element);
            elems[i].push(p);
        }

        // |L_e \ L_p| for every element adjacent to the pivot clique
        for &i in &lp {
            for &e in &elems[i] {
                if e == p {
                    continue;
                }
                if w_stamp[e] != stamp {
                    w_stamp[e] = stamp;
                    w[e] = members[e].len() as isize;
                }
                w[e] -= 1;
            }
        }

        // Aggressive absorption of elements covered by L_p
        for &i in &lp {
            for &e in &elems[i] {
                if e != p && status[e] == Status::Element && w[e] <= 0 {
                    status[e] = Status::Absorbed;
                    members[e] = Vec::new();
                }
            }
        }

        let clique = lp.len();
        for &i in &lp {
            elems[i].retain(|&e| status[e] == Status::Element);
            let external: usize = elems[i]
                .iter()
                .filter(|&&e| e != p)
                .map(|&e| w[e].max(0) as usize)
                .sum();
            let bound = vars[i].len() + (clique - 1) + external;
            let d = bound.min(degree[i] + clique - 1).min(live.saturating_sub(1));
            degree[i] = d;
            score[i] = deficiency(d, clique - 1);
            heap.push(Reverse((score[i], i)));
        }
        members[p] = lp;
    }

    let mut dense: Vec<usize> = (0..n).filter(|&v| status[v] == Status::Dense).collect();
    dense.sort_by_key(|&v| (graph.degree(v), v));
    order.extend(dense);
    order
}
