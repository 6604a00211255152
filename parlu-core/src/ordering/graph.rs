//! Undirected adjacency graph used by the ordering algorithms.

use std::collections::VecDeque;

/// Undirected graph in compressed adjacency form (no self loops).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    pub n: usize,
    pub xadj: Vec<usize>,
    pub adj: Vec<usize>,
}

/// Breadth-first level structure rooted at one vertex.
#[derive(Debug, Clone)]
pub struct LevelSet {
    /// Vertices in visiting order.
    pub order: Vec<usize>,
    /// `order[level_ptr[l]..level_ptr[l + 1]]` is level `l`.
    pub level_ptr: Vec<usize>,
}

impl LevelSet {
    pub fn depth(&self) -> usize {
        self.level_ptr.len() - 1
    }

    pub fn level(&self, l: usize) -> &[usize] {
        &self.order[self.level_ptr[l]..self.level_ptr[l + 1]]
    }
}

impl Graph {
    /// Adjacency of `A + A^T` for a square pattern given by rows.
    ///
    /// `rows(i)` yields the column indices stored in row `i`.
    pub fn symmetrized<'a, F>(n: usize, rows: F) -> Self
    where
        F: Fn(usize) -> &'a [usize],
    {
        let mut deg = vec![0usize; n];
        for i in 0..n {
            for &j in rows(i) {
                if i != j {
                    deg[i] += 1;
                    deg[j] += 1;
                }
            }
        }
        let mut xadj = vec![0usize; n + 1];
        for i in 0..n {
            xadj[i + 1] = xadj[i] + deg[i];
        }
        let mut fill = xadj.clone();
        let mut raw = vec![0usize; xadj[n]];
        for i in 0..n {
            for &j in rows(i) {
                if i != j {
                    raw[fill[i]] = j;
                    fill[i] += 1;
                    raw[fill[j]] = i;
                    fill[j] += 1;
                }
            }
        }
        Self::from_raw_lists(n, &xadj, &raw)
    }

    /// Sort and deduplicate adjacency lists.
    fn from_raw_lists(n: usize, xadj: &[usize], raw: &[usize]) -> Self {
        let mut out_ptr = Vec::with_capacity(n + 1);
        let mut out = Vec::with_capacity(raw.len());
        out_ptr.push(0);
        let mut scratch = Vec::new();
        for v in 0..n {
            scratch.clear();
            scratch.extend_from_slice(&raw[xadj[v]..xadj[v + 1]]);
            scratch.sort_unstable();
            scratch.dedup();
            out.extend_from_slice(&scratch);
            out_ptr.push(out.len());
        }
        Self { n, xadj: out_ptr, adj: out }
    }

    #[inline]
    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.adj[self.xadj[v]..self.xadj[v + 1]]
    }

    #[inline]
    pub fn degree(&self, v: usize) -> usize {
        self.xadj[v + 1] - self.xadj[v]
    }

    pub fn num_edges(&self) -> usize {
        self.adj.len() / 2
    }

    /// Induced subgraph on `vertices`; local vertex `k` is `vertices[k]`.
    /// Adjacency lists stay sorted.
    pub fn subgraph(&self, vertices: &[usize]) -> Graph {
        let mut local = vec![usize::MAX; self.n];
        for (k, &v) in vertices.iter().enumerate() {
            local[v] = k;
        }
        let mut xadj = Vec::with_capacity(vertices.len() + 1);
        let mut adj = Vec::new();
        xadj.push(0);
        for &v in vertices {
            let start = adj.len();
            adj.extend(
                self.neighbors(v)
                    .iter()
                    .map(|&w| local[w])
                    .filter(|&w| w != usize::MAX),
            );
            adj[start..].sort_unstable();
            xadj.push(adj.len());
        }
        Graph { n: vertices.len(), xadj, adj }
    }

    /// Graph with vertex `order[k]` relabelled as `k`.
    pub fn permuted(&self, order: &[usize]) -> Graph {
        let mut inv = vec![0usize; self.n];
        for (k, &v) in order.iter().enumerate() {
            inv[v] = k;
        }
        let mut xadj = Vec::with_capacity(self.n + 1);
        let mut adj = Vec::with_capacity(self.adj.len());
        xadj.push(0);
        for &v in order {
            let start = adj.len();
            adj.extend(self.neighbors(v).iter().map(|&w| inv[w]));
            adj[start..].sort_unstable();
            xadj.push(adj.len());
        }
        Graph { n: self.n, xadj, adj }
    }

    /// Connected components, each listed in breadth-first order.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.n];
        let mut comps = Vec::new();
        let mut queue = VecDeque::new();
        for root in 0..self.n {
            if seen[root] {
                continue;
            }
            seen[root] = true;
            queue.push_back(root);
            let mut comp = Vec::new();
            while let Some(v) = queue.pop_front() {
                comp.push(v);
                for &w in self.neighbors(v) {
                    if !seen[w] {
                        seen[w] = true;
                        queue.push_back(w);
                    }
                }
            }
            comps.push(comp);
        }
        comps
    }

    /// Breadth-first levels from `root` over its component.
    pub fn level_set(&self, root: usize) -> LevelSet {
        let mut seen = vec![false; self.n];
        let mut order = vec![root];
        let mut level_ptr = vec![0, 1];
        seen[root] = true;
        let mut start = 0;
        while start < order.len() {
            let end = order.len();
            for k in start..end {
                let v = order[k];
                for &w in self.neighbors(v) {
                    if !seen[w] {
                        seen[w] = true;
                        order.push(w);
                    }
                }
            }
            if order.len() > end {
                level_ptr.push(order.len());
            }
            start = end;
        }
        LevelSet { order, level_ptr }
    }

    /// Root of a long level structure (George-Liu pseudo-peripheral search).
    pub fn pseudo_peripheral(&self, start: usize) -> (usize, LevelSet) {
        let mut root = start;
        let mut levels = self.level_set(root);
        loop {
            let last = levels.level(levels.depth() - 1);
            let candidate = last
                .iter()
                .copied()
                .min_by_key(|&v| self.degree(v))
                .unwrap_or(root);
            let trial = self.level_set(candidate);
            if trial.depth() > levels.depth() {
                root = candidate;
                levels = trial;
            } else {
                return (root, levels);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> Graph {
        let rows: Vec<Vec<usize>> = (0..n).map(|i| if i + 1 < n { vec![i + 1] } else { vec![] }).collect();
        Graph::symmetrized(n, |i| rows[i].as_slice())
    }

    #[test]
    fn test_symmetrized_dedups_and_drops_diagonal() {
        let rows = vec![vec![0, 1], vec![0, 1, 2], vec![2]];
        let g = Graph::symmetrized(3, |i| rows[i].as_slice());
        assert_eq!(g.neighbors(0), &[1]);
        assert_eq!(g.neighbors(1), &[0, 2]);
        assert_eq!(g.neighbors(2), &[1]);
        assert_eq!(g.num_edges(), 2);
    }

    #[test]
    fn test_pseudo_peripheral_on_path() {
        let g = path(7);
        let (root, levels) = g.pseudo_peripheral(3);
        assert!(root == 0 || root == 6, "root {root}");
        assert_eq!(levels.depth(), 7);
    }

    #[test]
    fn test_components_and_subgraph() {
        let rows = vec![vec![1], vec![], vec![3], vec![], vec![]];
        let g = Graph::symmetrized(5, |i| rows[i].as_slice());
        let comps = g.components();
        assert_eq!(comps.len(), 3);
        let sub = g.subgraph(&[2, 3]);
        assert_eq!(sub.neighbors(0), &[1]);
        assert_eq!(sub.neighbors(1), &[0]);
    }

    #[test]
    fn test_permuted_relabels() {
        let g = path(3);
        let p = g.permuted(&[1, 0, 2]);
        // old vertex 1 (the middle) is now vertex 0
        assert_eq!(p.neighbors(0), &[1, 2]);
        assert_eq!(p.neighbors(1), &[0]);
    }
}
