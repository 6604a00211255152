//! Engine-reported telemetry.
//!
//! Each field is overwritten only by the call that produces it; the rest
//! keep the value from earlier calls.

use crate::config::{parm, OrderingMethod, TimerMode};
use std::time::Duration;

/// Library version packed as `major * 10000 + minor * 100 + patch`.
pub fn version() -> i64 {
    let part = |s: &str| s.parse::<i64>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Thread counts of the solver instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Physical cores (approximate).
    pub physical: usize,
    pub logical: usize,
    /// Worker threads in the instance's pool (1 when sequential).
    pub created: usize,
}

impl ThreadInfo {
    /// Pack as three 16-bit fields, lowest first.
    pub fn packed(&self) -> i64 {
        let field = |v: usize| (v.min(0xffff)) as i64;
        field(self.physical) | (field(self.logical) << 16) | (field(self.created) << 32)
    }
}

/// Output telemetry of the last analyze/factorize/solve calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub version: i64,
    /// Concrete ordering chosen by the last analysis.
    pub selected_ordering: Option<OrderingMethod>,
    /// Duration of the last call in the configured timer unit (0 when off).
    pub elapsed: i64,
    pub offdiag_pivots: usize,
    pub supernodes: usize,
    pub perturbed_pivots: usize,
    pub current_memory: usize,
    pub peak_memory: usize,
    pub threads: ThreadInfo,
    pub refinements: usize,
    pub nnz_l: usize,
    pub nnz_u: usize,
    pub factor_flops: f64,
    pub solve_flops: f64,
}

impl Stats {
    pub fn new(threads: ThreadInfo) -> Self {
        Self { version: version(), threads, ..Default::default() }
    }

    /// Record the duration of a call according to `mode`.
    pub fn record_elapsed(&mut self, mode: TimerMode, dt: Duration) {
        let clamp = |v: u128| i64::try_from(v).unwrap_or(i64::MAX);
        self.elapsed = match mode {
            TimerMode::Off => 0,
            TimerMode::Microseconds => clamp(dt.as_micros()),
            TimerMode::Milliseconds => clamp(dt.as_millis()),
        };
    }

    /// Track instance memory and its high-water mark.
    pub fn set_memory(&mut self, bytes: usize) {
        self.current_memory = bytes;
        self.peak_memory = self.peak_memory.max(bytes);
    }

    /// Write the outputs into a key-compatible parameter array.
    pub fn write_parm(&self, out: &mut [i64]) {
        let mut put = |key: usize, v: i64| {
            if let Some(slot) = out.get_mut(key) {
                *slot = v;
            }
        };
        let count = |v: usize| i64::try_from(v).unwrap_or(i64::MAX);
        put(parm::VERSION, self.version);
        put(parm::SELECTED_ORDERING, self.selected_ordering.map_or(0, |m| m.code()));
        put(parm::ELAPSED, self.elapsed);
        put(parm::OFFDIAG_PIVOTS, count(self.offdiag_pivots));
        put(parm::SUPERNODES, count(self.supernodes));
        put(parm::PERTURBED_PIVOTS, count(self.perturbed_pivots));
        put(parm::CURRENT_MEMORY, count(self.current_memory));
        put(parm::PEAK_MEMORY, count(self.peak_memory));
        put(parm::THREADS, self.threads.packed());
        put(parm::REFINEMENTS_DONE, count(self.refinements));
        put(parm::NNZ_L, count(self.nnz_l));
        put(parm::NNZ_U, count(self.nnz_u));
        put(parm::FACTOR_FLOPS, self.factor_flops as i64);
        put(parm::SOLVE_FLOPS, self.solve_flops as i64);
    }
}
