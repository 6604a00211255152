//! Symbolic factorization.
//!
//! Given the row and column permutations from the ordering stage, this
//! module postorders the elimination tree, partitions the columns into
//! supernodes, computes the exact panel structure of L and U, and builds
//! the map that scatters input values into the panels.
//!
//! The permuted matrix is `B[k][l] = A[row_perm[k]][col_perm[l]]`.

pub mod etree;
pub mod structure;

use crate::config::{Config, SymbolicMode};
use crate::error::{SolverError, SolverResult};
use crate::matrix::CsrPattern;
use crate::ordering::graph::Graph;
use etree::NONE;
use structure::{supernodal_structure, Structure};

/// Row-major pattern of `B` with the source position of each entry in `A`.
#[derive(Debug, Clone)]
pub struct PermutedPattern {
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
    pub src: Vec<usize>,
}

/// Apply `B[k][l] = A[row_perm[k]][col_perm[l]]` to a pattern.
pub fn permute_pattern(pattern: &CsrPattern, row_perm: &[usize], col_perm: &[usize]) -> PermutedPattern {
    let n = pattern.n;
    let mut inv_col = vec![0usize; n];
    for (l, &j) in col_perm.iter().enumerate() {
        inv_col[j] = l;
    }
    let mut row_ptr = Vec::with_capacity(n + 1);
    let mut col_idx = Vec::with_capacity(pattern.nnz());
    let mut src = Vec::with_capacity(pattern.nnz());
    row_ptr.push(0);
    for &i in row_perm {
        for p in pattern.row_ptr[i]..pattern.row_ptr[i + 1] {
            col_idx.push(inv_col[pattern.col_idx[p]]);
            src.push(p);
        }
        row_ptr.push(col_idx.len());
    }
    PermutedPattern { row_ptr, col_idx, src }
}

/// Relaxed amalgamation limits: a merge giving `ns` columns is taken when,
/// for some `(cols, fraction)` with `ns <= cols`, the explicit zeros are at
/// most `fraction` of the merged L panel.
const RELAX: [(usize, f64); 4] = [(4, 1.0), (16, 0.5), (48, 0.1), (usize::MAX, 0.05)];

fn relaxed_merge_allowed(ns: usize, zeros: usize, entries: usize) -> bool {
    RELAX
        .iter()
        .any(|&(cols, fraction)| ns <= cols && zeros as f64 <= fraction * entries as f64)
}

/// Supernode column ranges of a postordered elimination tree.
///
/// Fundamental supernodes (chains with nested structure) are formed first.
/// A supernode narrower than `min_cols` is then merged into the adjacent
/// parent supernode when the estimated panel height stays within `max_rows`
/// and the explicit zeros of the merged panel stay within the relaxation
/// limits.
pub fn partition(parent: &[usize], colcount: &[usize], min_cols: usize, max_rows: usize) -> Vec<usize> {
    let n = parent.len();
    if n == 0 {
        return vec![0];
    }
    let children = etree::child_counts(parent);
    let mut fundamental = vec![0];
    for j in 1..n {
        let chain = parent[j - 1] == j && children[j] == 1 && colcount[j - 1] == colcount[j] + 1;
        if !chain {
            fundamental.push(j);
        }
    }
    fundamental.push(n);

    let mut first = vec![0];
    let (mut start, mut end) = (fundamental[0], fundamental[1]);
    // Panel height and explicit zeros of the group being grown
    let mut rows = colcount[start];
    let mut zeros = 0usize;
    for g in 1..fundamental.len() - 1 {
        let (b0, b1) = (fundamental[g], fundamental[g + 1]);
        let p = parent[end - 1];
        let (width, next) = (end - start, b1 - b0);
        let ns = width + next;
        let height = rows.max(colcount[b0] + width);
        let added = zeros.saturating_add(width.saturating_mul(height - rows));
        let entries = ns * (ns + 1) / 2 + ns * height.saturating_sub(ns);
        let adjacent = p != NONE && p >= b0 && p < b1;
        if adjacent
            && width < min_cols
            && height <= max_rows
            && relaxed_merge_allowed(ns, added, entries)
        {
            end = b1;
            rows = height;
            zeros = added;
        } else {
            first.push(b0);
            start = b0;
            end = b1;
            rows = colcount[b0];
            zeros = 0;
        }
    }
    first.push(n);
    first
}

/// Destination of one input entry inside the factor panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyEntry {
    /// Position in the caller's value array.
    pub src: usize,
    /// Offset inside the L panel (`upper == false`) or the U panel.
    pub dst: usize,
    pub upper: bool,
}

/// Result of the symbolic stage.
#[derive(Debug, Clone)]
pub struct Symbolic {
    pub n: usize,
    pub row_perm: Vec<usize>,
    pub col_perm: Vec<usize>,
    /// Mode actually used (`Symmetric` or `Unsymmetric`).
    pub mode: SymbolicMode,
    pub structure: Structure,
    /// Assembly entries of supernode `s`: `assembly[assembly_ptr[s]..assembly_ptr[s + 1]]`.
    pub assembly_ptr: Vec<usize>,
    pub assembly: Vec<AssemblyEntry>,
    /// Structural nonzeros of L (diagonal included) and U.
    pub nnz_l: usize,
    pub nnz_u: usize,
    pub factor_flops: f64,
    pub solve_flops: f64,
}

impl Symbolic {
    pub fn supernodes(&self) -> usize {
        self.structure.count()
    }

    pub fn assembly_of(&self, s: usize) -> &[AssemblyEntry] {
        &self.assembly[self.assembly_ptr[s]..self.assembly_ptr[s + 1]]
    }
}

/// Run the symbolic factorization for `B = P A Q`.
///
/// The permutations are refined by an elimination-tree postorder before the
/// supernodes are formed.
pub fn analyze(pattern: &CsrPattern, row_perm: &[usize], col_perm: &[usize], config: &Config) -> SolverResult<Symbolic> {
    let n = pattern.n;

    // Postorder the elimination tree of the symmetrized permuted pattern
    let b0 = permute_pattern(pattern, row_perm, col_perm);
    let g0 = Graph::symmetrized(n, |k| &b0.col_idx[b0.row_ptr[k]..b0.row_ptr[k + 1]]);
    let post = etree::postorder(&etree::etree(&g0));
    let row_perm: Vec<usize> = post.iter().map(|&k| row_perm[k]).collect();
    let col_perm: Vec<usize> = post.iter().map(|&k| col_perm[k]).collect();

    let b = permute_pattern(pattern, &row_perm, &col_perm);
    let graph = Graph::symmetrized(n, |k| &b.col_idx[b.row_ptr[k]..b.row_ptr[k + 1]]);
    let parent = etree::etree(&graph);
    let colcount = etree::column_counts(&graph, &parent);
    let first = partition(
        &parent,
        &colcount,
        config.min_supernode_cols.max(1),
        config.effective_max_rows(),
    );

    let mode = match config.symbolic {
        SymbolicMode::Auto => {
            let b_pattern = CsrPattern { n, row_ptr: b.row_ptr.clone(), col_idx: b.col_idx.clone() };
            if b_pattern.symmetry_ratio() >= config.symmetry_threshold {
                SymbolicMode::Symmetric
            } else {
                SymbolicMode::Unsymmetric
            }
        }
        mode => mode,
    };

    let structure = match mode {
        SymbolicMode::Symmetric => supernodal_structure(&first, &graph.xadj, &graph.adj)?,
        _ => supernodal_structure(&first, &b.row_ptr, &b.col_idx)?,
    };

    let (assembly_ptr, assembly) = assembly_map(&structure, &b)?;
    // Structural counts: the padding of relaxed supernodes is not reported
    let (nnz_l, nnz_u) = match mode {
        SymbolicMode::Symmetric => {
            let l: usize = colcount.iter().sum();
            (l, l - n)
        }
        _ => structure::elimination_counts(&b.row_ptr, &b.col_idx),
    };
    let (factor_flops, solve_flops) = flop_counts(&structure, n);

    log::debug!(
        "symbolic {:?}: {} supernodes, nnz(L)={} nnz(U)={} flops={:.3e}",
        mode,
        structure.count(),
        nnz_l,
        nnz_u,
        factor_flops
    );

    Ok(Symbolic {
        n,
        row_perm,
        col_perm,
        mode,
        structure,
        assembly_ptr,
        assembly,
        nnz_l,
        nnz_u,
        factor_flops,
        solve_flops,
    })
}

fn assembly_map(st: &Structure, b: &PermutedPattern) -> SolverResult<(Vec<usize>, Vec<AssemblyEntry>)> {
    let ns = st.count();
    let n = b.row_ptr.len() - 1;
    let mut per_node: Vec<Vec<AssemblyEntry>> = vec![Vec::new(); ns];
    for k in 0..n {
        for p in b.row_ptr[k]..b.row_ptr[k + 1] {
            let l = b.col_idx[p];
            let s = st.owner[k.min(l)];
            let (f, last) = (st.first[s], st.last(s));
            let entry = if l >= f && l <= last {
                let row = st
                    .row_position(s, k)
                    .ok_or_else(|| SolverError::Internal(format!("entry ({k},{l}) outside L panel")))?;
                AssemblyEntry { src: b.src[p], dst: (l - f) * st.height(s) + row, upper: false }
            } else {
                let col = st
                    .col_position(s, l)
                    .ok_or_else(|| SolverError::Internal(format!("entry ({k},{l}) outside U panel")))?;
                AssemblyEntry { src: b.src[p], dst: col * st.width(s) + (k - f), upper: true }
            };
            per_node[s].push(entry);
        }
    }
    let mut ptr = Vec::with_capacity(ns + 1);
    let mut flat = Vec::with_capacity(b.col_idx.len());
    ptr.push(0);
    for entries in per_node {
        flat.extend(entries);
        ptr.push(flat.len());
    }
    Ok((ptr, flat))
}

/// Floating point operations of the factorization and of one solve.
fn flop_counts(st: &Structure, n: usize) -> (f64, f64) {
    let mut factor = 0.0f64;
    for s in 0..st.count() {
        let (w, h, nu) = (st.width(s), st.height(s), st.cols[s].len());
        for k in 0..w {
            let below = (h - k - 1) as f64;
            let right = (w - k - 1) as f64;
            factor += below + 2.0 * below * right + 2.0 * right * nu as f64;
        }
        for link in &st.incoming[s] {
            let t = link.from;
            let (fs, ls) = (st.first[s], st.last(s));
            let rows_t = &st.rows[t];
            let cols_t = &st.cols[t];
            let rows_ge = rows_t.len() - rows_t.partition_point(|&x| x < fs);
            let cols_in = Structure::range_in(cols_t, fs, ls).len();
            let rows_in = Structure::range_in(rows_t, fs, ls).len();
            let cols_gt = cols_t.len() - cols_t.partition_point(|&x| x <= ls);
            factor += 2.0 * st.width(t) as f64 * (rows_ge * cols_in + rows_in * cols_gt) as f64;
        }
    }
    let solve = 2.0 * (st.stored_l().saturating_sub(n) + st.stored_u()) as f64 + n as f64;
    (factor, solve)
}
