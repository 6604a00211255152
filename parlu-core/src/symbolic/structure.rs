//! Supernodal structure of L and U for a fixed column partition.
//!
//! # Algorithm
//!
//! Supernode `s` owns the dense diagonal block of columns `first[s]..=last[s]`,
//! the rows `S_L(s)` below the block (the L21 panel) and the columns `S_U(s)`
//! right of the block (the U12 panel). Entry `(i, j)` belongs to the
//! supernode owning `min(i, j)`.
//!
//! Supernode `t` updates every entry of `S_L(t) x S_U(t)`. Processing
//! supernodes in increasing order, once `S_L(t)` and `S_U(t)` are final,
//! each later supernode `u` touched by them receives:
//!
//! - `S_L(t) ∩ (last[u], n)` if `S_U(t)` has a column inside `u`'s block,
//! - `S_U(t) ∩ (last[u], n)` if `S_L(t)` has a row inside `u`'s block.
//!
//! After the first `u` that receives both, the rest of `t`'s structure
//! reaches later supernodes through `u` and propagation stops; the update
//! links from `t` are still recorded for every touched supernode.

use crate::error::{SolverError, SolverResult};

/// Update relation between an earlier supernode and a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Contributing (earlier) supernode.
    pub from: usize,
    /// `S_U(from)` has a column in the target block: the target's L panel
    /// receives an update, and the target's solution feeds `from` in the
    /// upper triangular solve.
    pub lower: bool,
    /// `S_L(from)` has a row in the target block: the target's U panel
    /// receives an update, and `from` feeds the target in the lower solve.
    pub upper: bool,
}

/// Supernode partition together with the exact panel structure.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    /// Column ranges: supernode `s` is `first[s]..first[s + 1]`.
    pub first: Vec<usize>,
    /// Owning supernode of each column.
    pub owner: Vec<usize>,
    /// Sorted rows below each diagonal block.
    pub rows: Vec<Vec<usize>>,
    /// Sorted columns right of each diagonal block.
    pub cols: Vec<Vec<usize>>,
    /// Incoming links of each supernode, sorted by `from`.
    pub incoming: Vec<Vec<Link>>,
}

impl Structure {
    #[inline]
    pub fn count(&self) -> usize {
        self.first.len() - 1
    }

    #[inline]
    pub fn width(&self, s: usize) -> usize {
        self.first[s + 1] - self.first[s]
    }

    #[inline]
    pub fn last(&self, s: usize) -> usize {
        self.first[s + 1] - 1
    }

    /// Leading dimension of the L panel (block rows plus `S_L`).
    #[inline]
    pub fn height(&self, s: usize) -> usize {
        self.width(s) + self.rows[s].len()
    }

    /// Sub-range of a sorted index list falling in `lo..=hi`.
    #[inline]
    pub fn range_in(list: &[usize], lo: usize, hi: usize) -> std::ops::Range<usize> {
        let start = list.partition_point(|&x| x < lo);
        let end = list.partition_point(|&x| x <= hi);
        start..end.max(start)
    }

    /// Row position inside the L panel of `s`, if the row is stored there.
    pub fn row_position(&self, s: usize, row: usize) -> Option<usize> {
        let (f, l) = (self.first[s], self.last(s));
        if row < f {
            None
        } else if row <= l {
            Some(row - f)
        } else {
            self.rows[s].binary_search(&row).ok().map(|p| self.width(s) + p)
        }
    }

    /// Column position inside the U panel of `s`.
    pub fn col_position(&self, s: usize, col: usize) -> Option<usize> {
        self.cols[s].binary_search(&col).ok()
    }

    /// Stored entries of L with dense diagonal blocks, diagonal included.
    pub fn stored_l(&self) -> usize {
        (0..self.count())
            .map(|s| {
                let w = self.width(s);
                w * (w + 1) / 2 + w * self.rows[s].len()
            })
            .sum()
    }

    /// Stored entries of U with dense diagonal blocks, diagonal excluded.
    pub fn stored_u(&self) -> usize {
        (0..self.count())
            .map(|s| {
                let w = self.width(s);
                w * (w - 1) / 2 + w * self.cols[s].len()
            })
            .sum()
    }

    /// Stored panel entries (dense diagonal blocks counted in full).
    pub fn panel_entries(&self) -> usize {
        (0..self.count())
            .map(|s| {
                let w = self.width(s);
                w * self.height(s) + w * self.cols[s].len()
            })
            .sum()
    }
}

/// Compute the panel structure for the partition `first` of the square
/// pattern given by rows (`row_ptr`, `col_idx`).
pub fn supernodal_structure(first: &[usize], row_ptr: &[usize], col_idx: &[usize]) -> SolverResult<Structure> {
    let ns = first.len().saturating_sub(1);
    let n = *first.last().unwrap_or(&0);
    if ns == 0 || first[0] != 0 || row_ptr.len() != n + 1 {
        return Err(SolverError::Internal("inconsistent supernode partition".into()));
    }

    let mut owner = vec![0usize; n];
    for s in 0..ns {
        if first[s + 1] <= first[s] {
            return Err(SolverError::Internal("empty supernode".into()));
        }
        owner[first[s]..first[s + 1]].iter_mut().for_each(|o| *o = s);
    }
    let last = |s: usize| first[s + 1] - 1;

    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); ns];
    let mut cols: Vec<Vec<usize>> = vec![Vec::new(); ns];
    for i in 0..n {
        for &j in &col_idx[row_ptr[i]..row_ptr[i + 1]] {
            if i < j {
                let s = owner[i];
                if j > last(s) {
                    cols[s].push(j);
                }
            } else if j < i {
                let s = owner[j];
                if i > last(s) {
                    rows[s].push(i);
                }
            }
        }
    }

    let mut incoming: Vec<Vec<Link>> = vec![Vec::new(); ns];
    let mut targets: Vec<usize> = Vec::new();
    for t in 0..ns {
        rows[t].sort_unstable();
        rows[t].dedup();
        cols[t].sort_unstable();
        cols[t].dedup();

        targets.clear();
        targets.extend(rows[t].iter().map(|&i| owner[i]));
        targets.extend(cols[t].iter().map(|&j| owner[j]));
        targets.sort_unstable();
        targets.dedup();

        let mut covered = false;
        for &u in &targets {
            let (fu, lu) = (first[u], last(u));
            let lower = !Structure::range_in(&cols[t], fu, lu).is_empty();
            let upper = !Structure::range_in(&rows[t], fu, lu).is_empty();
            if !covered {
                if lower {
                    let start = rows[t].partition_point(|&x| x <= lu);
                    let tail: Vec<usize> = rows[t][start..].to_vec();
                    rows[u].extend(tail);
                }
                if upper {
                    let start = cols[t].partition_point(|&x| x <= lu);
                    let tail: Vec<usize> = cols[t][start..].to_vec();
                    cols[u].extend(tail);
                }
                covered = lower && upper;
            }
            incoming[u].push(Link { from: t, lower, upper });
        }
    }

    Ok(Structure { first: first.to_vec(), owner, rows, cols, incoming })
}

/// Nonzeros of L (diagonal included) and U (diagonal excluded) of the
/// elimination of the pattern without pivoting, before any column grouping.
///
/// Same propagation as [`supernodal_structure`] on singleton supernodes,
/// keeping only the counts.
pub fn elimination_counts(row_ptr: &[usize], col_idx: &[usize]) -> (usize, usize) {
    let n = row_ptr.len().saturating_sub(1);
    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut cols: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for &j in &col_idx[row_ptr[i]..row_ptr[i + 1]] {
            if i < j {
                cols[i].push(j);
            } else if j < i {
                rows[j].push(i);
            }
        }
    }

    let (mut nnz_l, mut nnz_u) = (n, 0);
    for t in 0..n {
        let mut below = std::mem::take(&mut rows[t]);
        let mut right = std::mem::take(&mut cols[t]);
        below.sort_unstable();
        below.dedup();
        right.sort_unstable();
        right.dedup();
        nnz_l += below.len();
        nnz_u += right.len();

        // Walk targets in increasing order; `a` and `b` end up past `u`
        let (mut a, mut b) = (0, 0);
        loop {
            let u = match (below.get(a), right.get(b)) {
                (Some(&i), Some(&j)) => i.min(j),
                (Some(&i), None) => i,
                (None, Some(&j)) => j,
                (None, None) => break,
            };
            let upper = below[a..].first() == Some(&u);
            let lower = right[b..].first() == Some(&u);
            if upper {
                a += 1;
            }
            if lower {
                b += 1;
            }
            if lower {
                rows[u].extend_from_slice(&below[a..]);
            }
            if upper {
                cols[u].extend_from_slice(&right[b..]);
            }
            if lower && upper {
                break;
            }
        }
    }
    (nnz_l, nnz_u)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_reference(n: usize, rows: &[Vec<usize>]) -> Vec<Vec<bool>> {
        // Plain Gaussian elimination on the boolean pattern
        let mut m = vec![vec![false; n]; n];
        for (i, r) in rows.iter().enumerate() {
            for &j in r {
                m[i][j] = true;
            }
            m[i][i] = true;
        }
        for k in 0..n {
            for i in k + 1..n {
                if m[i][k] {
                    for j in k + 1..n {
                        if m[k][j] {
                            m[i][j] = true;
                        }
                    }
                }
            }
        }
        m
    }

    fn to_csr(rows: &[Vec<usize>]) -> (Vec<usize>, Vec<usize>) {
        let mut ap = vec![0];
        let mut ai = Vec::new();
        for r in rows {
            ai.extend_from_slice(r);
            ap.push(ai.len());
        }
        (ap, ai)
    }

    #[test]
    fn test_singleton_supernodes_match_elimination() {
        // Unsymmetric 5x5 pattern
        let rows = vec![vec![0, 3], vec![1, 4], vec![0, 2], vec![1, 3], vec![2, 4]];
        let (ap, ai) = to_csr(&rows);
        let first: Vec<usize> = (0..=5).collect();
        let st = supernodal_structure(&first, &ap, &ai).unwrap();
        let reference = dense_reference(5, &rows);
        for s in 0..5 {
            let expect_rows: Vec<usize> = (s + 1..5).filter(|&i| reference[i][s]).collect();
            let expect_cols: Vec<usize> = (s + 1..5).filter(|&j| reference[s][j]).collect();
            assert_eq!(st.rows[s], expect_rows, "rows of {s}");
            assert_eq!(st.cols[s], expect_cols, "cols of {s}");
        }
    }

    #[test]
    fn test_blocks_cover_elimination_fill() {
        let rows = vec![
            vec![0, 5],
            vec![1, 2],
            vec![0, 2, 6],
            vec![3, 1],
            vec![4, 7],
            vec![5, 3],
            vec![6, 4, 0],
            vec![7, 2],
        ];
        let (ap, ai) = to_csr(&rows);
        let first = vec![0, 2, 3, 6, 8];
        let st = supernodal_structure(&first, &ap, &ai).unwrap();
        let reference = dense_reference(8, &rows);
        for i in 0..8 {
            for j in 0..8 {
                if !reference[i][j] {
                    continue;
                }
                let s = st.owner[i.min(j)];
                if j >= st.first[s] && j <= st.last(s) {
                    assert!(st.row_position(s, i).is_some(), "({i},{j}) missing from L panel of {s}");
                } else {
                    assert!(st.col_position(s, j).is_some(), "({i},{j}) missing from U panel of {s}");
                }
            }
        }
    }

    #[test]
    fn test_links_and_counts() {
        // Arrow matrix: everything couples to the last column
        let rows = vec![vec![0, 3], vec![1, 3], vec![2, 3], vec![0, 1, 2, 3]];
        let (ap, ai) = to_csr(&rows);
        let first: Vec<usize> = (0..=4).collect();
        let st = supernodal_structure(&first, &ap, &ai).unwrap();
        assert_eq!(st.incoming[3].len(), 3);
        assert!(st.incoming[3].iter().all(|l| l.lower && l.upper));
        assert_eq!(st.stored_l(), 4 + 3);
        assert_eq!(st.stored_u(), 3);
        assert_eq!(elimination_counts(&ap, &ai), (4 + 3, 3));
        assert_eq!(Structure::range_in(&[1, 3, 5, 7], 2, 6), 1..3);
        assert_eq!(Structure::range_in(&[1, 3], 4, 6), 2..2);
    }

    #[test]
    fn test_elimination_counts_match_dense_elimination() {
        let rows = vec![
            vec![0, 5],
            vec![1, 2],
            vec![0, 2, 6],
            vec![3, 1],
            vec![4, 7],
            vec![5, 3],
            vec![6, 4, 0],
            vec![7, 2],
        ];
        let (ap, ai) = to_csr(&rows);
        let reference = dense_reference(8, &rows);
        let lower = (0..8).map(|j| (j..8).filter(|&i| reference[i][j]).count()).sum::<usize>();
        let upper = (0..8).map(|i| (i + 1..8).filter(|&j| reference[i][j]).count()).sum::<usize>();
        assert_eq!(elimination_counts(&ap, &ai), (lower, upper));

        // Grouping columns pads the panels but never loses an entry
        let st = supernodal_structure(&[0, 2, 3, 6, 8], &ap, &ai).unwrap();
        assert!(st.stored_l() >= lower);
        assert!(st.stored_u() >= upper);
    }
}
