//! Static pivoting by weighted bipartite matching.
//!
//! Finds a row for every column so that the product of the matched
//! magnitudes is maximal (the MC64 objective). With costs
//! `c(i, j) = ln(max_k |a_kj|) - ln |a_ij|` this is a minimum-cost perfect
//! matching, solved by successive shortest augmenting paths (Dijkstra on
//! reduced costs `c - u_i - v_j`, which stay non-negative because the dual
//! potentials are updated after every augmentation).
//!
//! Without values every off-diagonal entry costs one and diagonal entries
//! cost nothing, which yields a maximum matching that keeps existing
//! diagonal entries in place.

use crate::error::{SolverError, SolverResult};
use crate::matrix::CsrPattern;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const UNMATCHED: usize = usize::MAX;

/// Cost assigned to explicitly stored zeros.
const ZERO_ENTRY_COST: f64 = 1.0e8;

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    dist: f64,
    row: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance, ties by row
        other.dist.total_cmp(&self.dist).then_with(|| other.row.cmp(&self.row))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute `col_to_row[j]`, the row placed on the diagonal of column `j`.
///
/// `magnitudes[p]` is `|a_p|` for the p-th stored entry (row-major order).
pub fn static_pivoting(pattern: &CsrPattern, magnitudes: Option<&[f64]>) -> SolverResult<Vec<usize>> {
    let n = pattern.n;
    let (col_ptr, row_idx, src) = pattern.transpose();

    let mut cost = vec![0.0f64; row_idx.len()];
    for j in 0..n {
        let range = col_ptr[j]..col_ptr[j + 1];
        match magnitudes {
            Some(mag) => {
                let col_max = range.clone().map(|q| mag[src[q]]).fold(0.0f64, f64::max);
                if col_max > 0.0 && col_max.is_finite() {
                    let log_max = col_max.ln();
                    for q in range {
                        let a = mag[src[q]];
                        cost[q] = if a > 0.0 { (log_max - a.ln()).max(0.0) } else { ZERO_ENTRY_COST };
                    }
                }
            }
            None => {
                for q in range {
                    cost[q] = if row_idx[q] == j { 0.0 } else { 1.0 };
                }
            }
        }
    }

    let mut u = vec![0.0f64; n];
    let mut v = vec![0.0f64; n];
    let mut row_match = vec![UNMATCHED; n];
    let mut col_match = vec![UNMATCHED; n];

    // Cheap initial matching on zero reduced cost entries
    for j in 0..n {
        for q in col_ptr[j]..col_ptr[j + 1] {
            let i = row_idx[q];
            if cost[q] == 0.0 && row_match[i] == UNMATCHED {
                row_match[i] = j;
                col_match[j] = i;
                break;
            }
        }
    }

    let mut dist = vec![f64::INFINITY; n];
    let mut done = vec![false; n];
    let mut pred = vec![UNMATCHED; n];
    let mut col_dist = vec![0.0f64; n];
    let mut touched_rows: Vec<usize> = Vec::new();
    let mut settled_rows: Vec<usize> = Vec::new();
    let mut settled_cols: Vec<usize> = Vec::new();
    let mut heap = BinaryHeap::new();

    for j0 in 0..n {
        if col_match[j0] != UNMATCHED {
            continue;
        }
        heap.clear();
        settled_rows.clear();
        settled_cols.clear();

        let relax = |j: usize,
                     base: f64,
                     dist: &mut [f64],
                     pred: &mut [usize],
                     touched: &mut Vec<usize>,
                     heap: &mut BinaryHeap<HeapEntry>| {
            for q in col_ptr[j]..col_ptr[j + 1] {
                let i = row_idx[q];
                let reduced = (cost[q] - u[i] - v[j]).max(0.0);
                let nd = base + reduced;
                if nd < dist[i] {
                    if dist[i] == f64::INFINITY {
                        touched.push(i);
                    }
                    dist[i] = nd;
                    pred[i] = j;
                    heap.push(HeapEntry { dist: nd, row: i });
                }
            }
        };

        col_dist[j0] = 0.0;
        settled_cols.push(j0);
        relax(j0, 0.0, &mut dist, &mut pred, &mut touched_rows, &mut heap);

        let mut free_row = UNMATCHED;
        let mut shortest = 0.0;
        while let Some(HeapEntry { dist: d, row: i }) = heap.pop() {
            if done[i] || d > dist[i] {
                continue;
            }
            done[i] = true;
            settled_rows.push(i);
            if row_match[i] == UNMATCHED {
                free_row = i;
                shortest = d;
                break;
            }
            let next_col = row_match[i];
            col_dist[next_col] = d;
            settled_cols.push(next_col);
            relax(next_col, d, &mut dist, &mut pred, &mut touched_rows, &mut heap);
        }

        if free_row == UNMATCHED {
            return Err(SolverError::StructurallySingular { index: j0 });
        }

        for &i in &settled_rows {
            u[i] -= shortest - dist[i];
        }
        for &j in &settled_cols {
            v[j] += shortest - col_dist[j];
        }

        // Augment along the alternating path
        let mut i = free_row;
        loop {
            let j = pred[i];
            let previous = col_match[j];
            col_match[j] = i;
            row_match[i] = j;
            if j == j0 {
                break;
            }
            i = previous;
        }

        for &i in &touched_rows {
            dist[i] = f64::INFINITY;
            done[i] = false;
        }
        touched_rows.clear();
    }

    Ok(col_match)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(n: usize, rows: &[&[usize]]) -> CsrPattern {
        let mut ap = vec![0usize];
        let mut ai = Vec::new();
        for r in rows {
            ai.extend_from_slice(r);
            ap.push(ai.len());
        }
        CsrPattern::from_raw(n as i64, &ap.iter().map(|&v| v as i64).collect::<Vec<_>>(), &ai.iter().map(|&v| v as i64).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_structural_matching_keeps_diagonal() {
        let p = pattern(3, &[&[0, 1], &[0, 1, 2], &[1, 2]]);
        let m = static_pivoting(&p, None).unwrap();
        assert_eq!(m, vec![0, 1, 2]);
    }

    #[test]
    fn test_structural_matching_on_permutation() {
        let p = pattern(3, &[&[2], &[0], &[1]]);
        let m = static_pivoting(&p, None).unwrap();
        // column 0 lives in row 1, column 1 in row 2, column 2 in row 0
        assert_eq!(m, vec![1, 2, 0]);
    }

    #[test]
    fn test_weighted_matching_prefers_large_entries() {
        // [1 10]
        // [10 1]
        let p = pattern(2, &[&[0, 1], &[0, 1]]);
        let mags = [1.0, 10.0, 10.0, 1.0];
        let m = static_pivoting(&p, Some(&mags)).unwrap();
        assert_eq!(m, vec![1, 0]);
    }

    #[test]
    fn test_weighted_matching_needs_augmenting_path() {
        // Column maxima all sit in row 0, so the greedy pass matches only
        // column 0 and the others need augmenting paths.
        // [9 8 7]
        // [1 4 .]
        // [. 2 3]
        let p = pattern(3, &[&[0, 1, 2], &[0, 1], &[1, 2]]);
        let mags = [9.0, 8.0, 7.0, 1.0, 4.0, 2.0, 3.0];
        let m = static_pivoting(&p, Some(&mags)).unwrap();
        // products: diag 9*4*3 = 108 beats any other perfect matching
        assert_eq!(m, vec![0, 1, 2]);
    }

    #[test]
    fn test_structurally_singular() {
        let p = pattern(3, &[&[0], &[0], &[1, 2]]);
        let err = static_pivoting(&p, None).unwrap_err();
        assert_eq!(err.code(), -5);
    }
}
