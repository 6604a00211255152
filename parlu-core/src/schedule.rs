//! Dependency-counted task execution on the instance thread pool.
//!
//! Tasks are supernodes (or supernode solves). Every task holds a counter
//! of unfinished predecessors; finishing a task decrements the counters of
//! its successors and spawns those that reach zero. The first error stops
//! new tasks from starting and is returned once all running tasks drain.
//!
//! Edges always go from a lower to a higher task id, so running tasks in
//! id order is a valid sequential schedule.

use crate::error::{SolverError, SolverResult};
use crate::symbolic::structure::{Link, Structure};
use rayon::{Scope, ThreadPool};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Directed acyclic task graph with edges from lower to higher ids.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<usize>,
}

impl TaskGraph {
    pub fn new(n: usize) -> Self {
        Self { successors: vec![Vec::new(); n], predecessors: vec![0; n] }
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        debug_assert!(from < to, "task edges must increase ids");
        self.successors[from].push(to);
        self.predecessors[to] += 1;
    }

    pub fn successors(&self, task: usize) -> &[usize] {
        &self.successors[task]
    }

    /// Tasks with no predecessor.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&t| self.predecessors[t] == 0)
    }

    /// Graph over supernodes keeping the links selected by `keep`.
    ///
    /// With `reversed`, supernode `s` becomes task `count - 1 - s` and
    /// every kept link points from the later supernode to the earlier one.
    pub fn from_links(structure: &Structure, keep: impl Fn(&Link) -> bool, reversed: bool) -> Self {
        let ns = structure.count();
        let mut graph = Self::new(ns);
        for (s, links) in structure.incoming.iter().enumerate() {
            for link in links.iter().filter(|l| keep(l)) {
                if reversed {
                    graph.add_edge(ns - 1 - s, ns - 1 - link.from);
                } else {
                    graph.add_edge(link.from, s);
                }
            }
        }
        graph
    }

    /// Length of the longest dependency chain.
    pub fn depth(&self) -> usize {
        let mut level = vec![0usize; self.len()];
        let mut depth = 0;
        for t in 0..self.len() {
            depth = depth.max(level[t] + 1);
            for &next in &self.successors[t] {
                level[next] = level[next].max(level[t] + 1);
            }
        }
        depth
    }
}

struct RunState<'a, F> {
    graph: &'a TaskGraph,
    task: &'a F,
    pending: Vec<AtomicUsize>,
    finished: AtomicUsize,
    abort: AtomicBool,
    error: Mutex<Option<SolverError>>,
}

impl<F> RunState<'_, F> {
    fn fail(&self, err: SolverError) {
        self.abort.store(true, Ordering::Release);
        let mut slot = self.error.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

fn launch<'s, 'a: 's, F>(scope: &Scope<'s>, state: &'s RunState<'a, F>, id: usize)
where
    F: Fn(usize) -> SolverResult<()> + Sync,
{
    scope.spawn(move |scope| {
        if state.abort.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = (state.task)(id) {
            state.fail(err);
            return;
        }
        state.finished.fetch_add(1, Ordering::AcqRel);
        for &next in state.graph.successors(id) {
            if state.pending[next].fetch_sub(1, Ordering::AcqRel) == 1 {
                launch(scope, state, next);
            }
        }
    });
}

/// Run every task of `graph`, in parallel on `pool` when one is given.
pub fn run<F>(graph: &TaskGraph, pool: Option<&ThreadPool>, task: F) -> SolverResult<()>
where
    F: Fn(usize) -> SolverResult<()> + Sync,
{
    let pool = match pool {
        Some(pool) if graph.len() > 1 && pool.current_num_threads() > 1 => pool,
        _ => return (0..graph.len()).try_for_each(&task),
    };

    let state = RunState {
        graph,
        task: &task,
        pending: graph.predecessors.iter().map(|&c| AtomicUsize::new(c)).collect(),
        finished: AtomicUsize::new(0),
        abort: AtomicBool::new(false),
        error: Mutex::new(None),
    };
    pool.scope(|scope| {
        for root in graph.roots() {
            launch(scope, &state, root);
        }
    });

    let error = state.error.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(err) = error {
        return Err(err);
    }
    let finished = state.finished.into_inner();
    if finished != graph.len() {
        return Err(SolverError::Internal(format!(
            "task schedule stalled after {finished} of {} tasks",
            graph.len()
        )));
    }
    Ok(())
}
