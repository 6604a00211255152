//! Elimination tree, postorder and column counts of a symmetric pattern.

use crate::ordering::graph::Graph;

/// Marker for a root in a parent array.
pub const NONE: usize = usize::MAX;

/// Elimination tree of a symmetric graph (Liu's algorithm with path
/// compression). `parent[j]` is `NONE` for roots.
pub fn etree(graph: &Graph) -> Vec<usize> {
    let n = graph.n;
    let mut parent = vec![NONE; n];
    let mut ancestor = vec![NONE; n];
    for k in 0..n {
        for &i in graph.neighbors(k) {
            if i >= k {
                continue;
            }
            let mut r = i;
            while ancestor[r] != NONE && ancestor[r] != k {
                let next = ancestor[r];
                ancestor[r] = k;
                r = next;
            }
            if ancestor[r] == NONE {
                ancestor[r] = k;
                parent[r] = k;
            }
        }
    }
    parent
}

/// Postorder of a forest: `post[k]` is the k-th node visited.
///
/// Children are visited in increasing index order, so a postordered tree
/// keeps every subtree contiguous.
pub fn postorder(parent: &[usize]) -> Vec<usize> {
    let n = parent.len();
    let mut head = vec![NONE; n];
    let mut next = vec![NONE; n];
    // Build child lists in reverse so that traversal sees ascending children
    for j in (0..n).rev() {
        if parent[j] != NONE {
            next[j] = head[parent[j]];
            head[parent[j]] = j;
        }
    }
    let mut post = Vec::with_capacity(n);
    let mut stack = Vec::new();
    for root in 0..n {
        if parent[root] != NONE {
            continue;
        }
        stack.push(root);
        while let Some(&top) = stack.last() {
            let child = head[top];
            if child == NONE {
                stack.pop();
                post.push(top);
            } else {
                head[top] = next[child];
                stack.push(child);
            }
        }
    }
    post
}

/// Number of nonzeros in each column of the Cholesky factor of the
/// pattern, diagonal included, by counting row subtrees.
pub fn column_counts(graph: &Graph, parent: &[usize]) -> Vec<usize> {
    let n = graph.n;
    let mut count = vec![1usize; n];
    let mut mark = vec![NONE; n];
    for i in 0..n {
        mark[i] = i;
        for &k in graph.neighbors(i) {
            if k >= i {
                continue;
            }
            let mut j = k;
            while j != NONE && mark[j] != i {
                count[j] += 1;
                mark[j] = i;
                j = parent[j];
            }
        }
    }
    count
}

/// Number of children of every node.
pub fn child_counts(parent: &[usize]) -> Vec<usize> {
    let mut children = vec![0usize; parent.len()];
    for &p in parent {
        if p != NONE {
            children[p] += 1;
        }
    }
    children
}

/// Predicted nonzeros of the Cholesky factor under `order`.
pub fn predicted_fill(graph: &Graph, order: &[usize]) -> usize {
    let permuted = graph.permuted(order);
    let parent = etree(&permuted);
    column_counts(&permuted, &parent).iter().sum()
}
