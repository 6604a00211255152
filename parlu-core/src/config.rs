//! Caller-controlled solver configuration.
//!
//! [`Config`] holds the inputs that persist across calls on one solver
//! instance. The integer parameter array of the C interface maps onto it
//! through [`Config::from_parm`] / [`Config::write_parm`]; the key
//! constants live in [`parm`].

/// Keys of the key-compatible parameter array.
pub mod parm {
    /// Output: library version.
    pub const VERSION: usize = 0;
    /// Input: timer (0 off, >0 microseconds, <0 milliseconds).
    pub const TIMER: usize = 1;
    /// Input: ordering method selector (0..=7).
    pub const ORDERING: usize = 2;
    /// Input: ordering switch point (0 = automatic).
    pub const ORDERING_SWITCH: usize = 3;
    /// Output: ordering actually used (1..=4).
    pub const SELECTED_ORDERING: usize = 4;
    /// Input: minimum supernode columns.
    pub const MIN_SUPERNODE_COLS: usize = 5;
    /// Input: maximum supernode rows (0 = automatic).
    pub const MAX_SUPERNODE_ROWS: usize = 6;
    /// Output: elapsed time of the last call.
    pub const ELAPSED: usize = 7;
    /// Output: off-diagonal pivots.
    pub const OFFDIAG_PIVOTS: usize = 8;
    /// Output: number of supernodes.
    pub const SUPERNODES: usize = 9;
    /// Input: pivot perturbation exponent.
    pub const PERTURBATION: usize = 10;
    /// Output: perturbed pivots.
    pub const PERTURBED_PIVOTS: usize = 11;
    /// Output: current memory in bytes (needed bytes after an allocation failure).
    pub const CURRENT_MEMORY: usize = 12;
    /// Output: peak memory in bytes.
    pub const PEAK_MEMORY: usize = 13;
    /// Output: packed thread counts.
    pub const THREADS: usize = 14;
    /// Input: refinement policy.
    pub const REFINEMENT: usize = 15;
    /// Output: refinement iterations performed.
    pub const REFINEMENTS_DONE: usize = 16;
    /// Output: nonzeros in L including the diagonal.
    pub const NNZ_L: usize = 17;
    /// Output: nonzeros in U excluding the diagonal.
    pub const NNZ_U: usize = 18;
    /// Output: factorization flops.
    pub const FACTOR_FLOPS: usize = 19;
    /// Output: solve flops.
    pub const SOLVE_FLOPS: usize = 20;
    /// Input: scaling mode (>0 dynamic, <0 static, 0 off).
    pub const SCALING: usize = 21;
    /// Input: symbolic mode (0 auto, >0 unsymmetric, <0 symmetric).
    pub const SYMBOLIC: usize = 22;
    /// Input: parallel nested dissection (0 off).
    pub const PARALLEL_ND: usize = 23;
    /// Length of the parameter array.
    pub const LEN: usize = 32;
}

/// Timer resolution for the elapsed-time statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    #[default]
    Off,
    Microseconds,
    Milliseconds,
}

/// Fill-reducing ordering selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMethod {
    /// Pick by size and density.
    #[default]
    Auto,
    /// Approximate minimum degree.
    Amd,
    /// Approximate minimum fill (AMD with a fill-based score).
    AmdVariant,
    /// Level-set nested dissection.
    NestedDissection,
    /// Nested dissection with breadth-first bisection.
    NestedDissectionVariant,
    /// Best of `Amd` and `AmdVariant`.
    BestOfAmd,
    /// Best of the two nested dissection methods.
    BestOfNd,
    /// Best of all four concrete methods.
    BestOfAll,
}

impl OrderingMethod {
    pub fn code(self) -> i64 {
        match self {
            OrderingMethod::Auto => 0,
            OrderingMethod::Amd => 1,
            OrderingMethod::AmdVariant => 2,
            OrderingMethod::NestedDissection => 3,
            OrderingMethod::NestedDissectionVariant => 4,
            OrderingMethod::BestOfAmd => 5,
            OrderingMethod::BestOfNd => 6,
            OrderingMethod::BestOfAll => 7,
        }
    }

    /// Unknown codes fall back to `Auto`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => OrderingMethod::Amd,
            2 => OrderingMethod::AmdVariant,
            3 => OrderingMethod::NestedDissection,
            4 => OrderingMethod::NestedDissectionVariant,
            5 => OrderingMethod::BestOfAmd,
            6 => OrderingMethod::BestOfNd,
            7 => OrderingMethod::BestOfAll,
            _ => OrderingMethod::Auto,
        }
    }

    /// Concrete methods compared by this selector.
    pub fn candidates(self) -> &'static [OrderingMethod] {
        use OrderingMethod::*;
        match self {
            Amd => &[Amd],
            AmdVariant => &[AmdVariant],
            NestedDissection => &[NestedDissection],
            NestedDissectionVariant => &[NestedDissectionVariant],
            BestOfAmd => &[Amd, AmdVariant],
            BestOfNd => &[NestedDissection, NestedDissectionVariant],
            BestOfAll => &[Amd, AmdVariant, NestedDissection, NestedDissectionVariant],
            Auto => &[],
        }
    }
}

/// Iterative refinement control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefinementPolicy {
    /// Refine while the residual keeps improving, up to `auto_refine_limit`.
    #[default]
    Auto,
    /// Refine while improving, at most `n` times.
    AtMost(u32),
    /// Run exactly `n` correction steps, returning the best iterate.
    Forced(u32),
}

impl RefinementPolicy {
    pub fn from_code(code: i64) -> Self {
        let n = u32::try_from(code.unsigned_abs()).unwrap_or(u32::MAX);
        match code {
            0 => RefinementPolicy::Auto,
            c if c > 0 => RefinementPolicy::AtMost(n),
            _ => RefinementPolicy::Forced(n),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            RefinementPolicy::Auto => 0,
            RefinementPolicy::AtMost(n) => i64::from(n),
            RefinementPolicy::Forced(n) => -i64::from(n),
        }
    }
}

/// Row/column equilibration mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingMode {
    /// Recompute scale factors from the values of every factorization.
    #[default]
    Dynamic,
    /// Compute scale factors once from the values given at analysis.
    Static,
    Off,
}

impl ScalingMode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ScalingMode::Off,
            c if c > 0 => ScalingMode::Dynamic,
            _ => ScalingMode::Static,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            ScalingMode::Dynamic => 1,
            ScalingMode::Static => -1,
            ScalingMode::Off => 0,
        }
    }
}

/// Symbolic factorization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolicMode {
    /// Pick by pattern symmetry.
    #[default]
    Auto,
    /// Exact structure of the unsymmetric pattern.
    Unsymmetric,
    /// Structure of the symmetrized pattern.
    Symmetric,
}

impl SymbolicMode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => SymbolicMode::Auto,
            c if c > 0 => SymbolicMode::Unsymmetric,
            _ => SymbolicMode::Symmetric,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            SymbolicMode::Auto => 0,
            SymbolicMode::Unsymmetric => 1,
            SymbolicMode::Symmetric => -1,
        }
    }
}

impl TimerMode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TimerMode::Off,
            c if c > 0 => TimerMode::Microseconds,
            _ => TimerMode::Milliseconds,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            TimerMode::Off => 0,
            TimerMode::Microseconds => 1,
            TimerMode::Milliseconds => -1,
        }
    }
}

/// Solver configuration; persists across calls until changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub timer: TimerMode,
    pub ordering: OrderingMethod,
    /// Dimension at which `Auto` ordering switches from AMD to nested
    /// dissection (0 = automatic).
    pub ordering_switch: usize,
    /// Supernodes narrower than this are merged into their parent while
    /// the explicit zeros stay bounded.
    pub min_supernode_cols: usize,
    /// Estimated panel height cap for amalgamation (0 = automatic).
    pub max_supernode_rows: usize,
    /// Small pivots are replaced by `10^perturbation_exponent * ||A||`.
    pub perturbation_exponent: i32,
    pub refinement: RefinementPolicy,
    pub scaling: ScalingMode,
    pub symbolic: SymbolicMode,
    pub parallel_nd: bool,

    /// Permute large entries onto the diagonal before ordering.
    pub static_pivoting: bool,
    /// Diagonal is kept when `|d| >= pivot_tolerance * max|column|`.
    pub pivot_tolerance: f64,
    /// Ruiz sweeps for row/column scaling.
    pub scaling_iterations: usize,
    /// Pattern symmetry ratio above which `Auto` symbolic mode is symmetric.
    pub symmetry_threshold: f64,
    /// Average row length above which `Auto` ordering prefers AMD.
    pub dense_row_ratio: f64,
    /// Iteration cap for `RefinementPolicy::Auto`.
    pub auto_refine_limit: u32,
    /// Subgraphs at or below this size are ordered with AMD inside nested dissection.
    pub nd_leaf_size: usize,
    /// Recursion depth after which nested dissection finishes with AMD.
    pub nd_max_depth: usize,
    /// Minimum dimension for the parallel triangular solve.
    pub parallel_solve_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        // Environment overrides, mainly for benchmarking from the shell
        let env_i64 = |key: &str| std::env::var(key).ok().and_then(|s| s.trim().parse::<i64>().ok());

        let ordering = env_i64("PARLU_ORDERING")
            .map(OrderingMethod::from_code)
            .unwrap_or_default();
        let refinement = env_i64("PARLU_REFINE")
            .map(RefinementPolicy::from_code)
            .unwrap_or_default();
        let scaling = env_i64("PARLU_SCALING")
            .map(ScalingMode::from_code)
            .unwrap_or_default();
        let symbolic = env_i64("PARLU_SYMBOLIC")
            .map(SymbolicMode::from_code)
            .unwrap_or_default();
        let perturbation_exponent = env_i64("PARLU_PERTURB_EXP")
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(-15);
        let min_supernode_cols = env_i64("PARLU_MIN_SNODE")
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(32);
        let parallel_nd = env_i64("PARLU_PARALLEL_ND").map(|v| v != 0).unwrap_or(true);
        let static_pivoting = env_i64("PARLU_STATIC_PIVOT").map(|v| v != 0).unwrap_or(true);

        Self {
            timer: TimerMode::Off,
            ordering,
            ordering_switch: 0,
            min_supernode_cols,
            max_supernode_rows: 0,
            perturbation_exponent,
            refinement,
            scaling,
            symbolic,
            parallel_nd,
            static_pivoting,
            pivot_tolerance: 1e-3,
            scaling_iterations: 10,
            symmetry_threshold: 0.8,
            dense_row_ratio: 32.0,
            auto_refine_limit: 3,
            nd_leaf_size: 256,
            nd_max_depth: 64,
            parallel_solve_threshold: 20_000,
        }
    }
}

impl Config {
    /// Dimension at which `Auto` switches to nested dissection.
    pub fn effective_switch(&self) -> usize {
        if self.ordering_switch == 0 {
            10_000
        } else {
            self.ordering_switch
        }
    }

    /// Panel height cap used by amalgamation.
    pub fn effective_max_rows(&self) -> usize {
        if self.max_supernode_rows == 0 {
            256
        } else {
            self.max_supernode_rows
        }
    }

    /// Update the key-compatible inputs from a parameter array.
    ///
    /// Keys not present in the slice keep their current value.
    pub fn from_parm(&mut self, parm: &[i64]) {
        let get = |key: usize| parm.get(key).copied();
        if let Some(v) = get(parm::TIMER) {
            self.timer = TimerMode::from_code(v);
        }
        if let Some(v) = get(parm::ORDERING) {
            self.ordering = OrderingMethod::from_code(v);
        }
        if let Some(v) = get(parm::ORDERING_SWITCH) {
            self.ordering_switch = usize::try_from(v).unwrap_or(0);
        }
        if let Some(v) = get(parm::MIN_SUPERNODE_COLS) {
            self.min_supernode_cols = usize::try_from(v).unwrap_or(1).max(1);
        }
        if let Some(v) = get(parm::MAX_SUPERNODE_ROWS) {
            self.max_supernode_rows = usize::try_from(v).unwrap_or(0);
        }
        if let Some(v) = get(parm::PERTURBATION) {
            self.perturbation_exponent = i32::try_from(v).unwrap_or(-15);
        }
        if let Some(v) = get(parm::REFINEMENT) {
            self.refinement = RefinementPolicy::from_code(v);
        }
        if let Some(v) = get(parm::SCALING) {
            self.scaling = ScalingMode::from_code(v);
        }
        if let Some(v) = get(parm::SYMBOLIC) {
            self.symbolic = SymbolicMode::from_code(v);
        }
        if let Some(v) = get(parm::PARALLEL_ND) {
            self.parallel_nd = v != 0;
        }
    }

    /// Write the key-compatible inputs into a parameter array.
    pub fn write_parm(&self, parm: &mut [i64]) {
        let mut put = |key: usize, v: i64| {
            if let Some(slot) = parm.get_mut(key) {
                *slot = v;
            }
        };
        let to_i64 = |v: usize| i64::try_from(v).unwrap_or(i64::MAX);
        put(parm::TIMER, self.timer.code());
        put(parm::ORDERING, self.ordering.code());
        put(parm::ORDERING_SWITCH, to_i64(self.ordering_switch));
        put(parm::MIN_SUPERNODE_COLS, to_i64(self.min_supernode_cols));
        put(parm::MAX_SUPERNODE_ROWS, to_i64(self.max_supernode_rows));
        put(parm::PERTURBATION, i64::from(self.perturbation_exponent));
        put(parm::REFINEMENT, self.refinement.code());
        put(parm::SCALING, self.scaling.code());
        put(parm::SYMBOLIC, self.symbolic.code());
        put(parm::PARALLEL_ND, i64::from(self.parallel_nd));
    }
}
