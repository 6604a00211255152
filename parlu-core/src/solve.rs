//! Triangular solves with the supernodal factors.
//!
//! With `B = P A Q` (scaled) and local row pivoting inside each diagonal
//! block, `B z = c` is solved as
//!
//! 1. forward: per supernode, gather the updates of earlier supernodes,
//!    permute the block rows and apply the unit lower L11;
//! 2. backward: per supernode in reverse, subtract `U12 * x` and apply U11.
//!
//! Each block solve only reads finished blocks, so both sweeps run through
//! the dependency scheduler and can use the instance pool. The transposed
//! system `B^T z = c` (plain transpose, no conjugation) is solved
//! sequentially.

use crate::error::{try_alloc, SolverError, SolverResult};
use crate::numeric::Factors;
use crate::scalar::{Scalar, Triangle};
use crate::scaling::Scaling;
use crate::schedule::{self, TaskGraph};
use crate::symbolic::structure::Structure;
use crate::symbolic::Symbolic;
use rayon::ThreadPool;
use std::sync::OnceLock;

/// Everything needed to apply `A^{-1}` or `A^{-T}`.
#[derive(Debug, Clone, Copy)]
pub struct SolveContext<'a, T> {
    pub symbolic: &'a Symbolic,
    pub scaling: &'a Scaling,
    pub factors: &'a Factors<T>,
}

impl<T: Scalar> SolveContext<'_, T> {
    /// Solve `A x = b` (or `A^T x = b`), writing `x`.
    pub fn solve(&self, b: &[T], x: &mut [T], transpose: bool, pool: Option<&ThreadPool>) -> SolverResult<()> {
        let n = self.symbolic.n;
        let (rp, cp) = (&self.symbolic.row_perm, &self.symbolic.col_perm);
        let (dr, dc) = (&self.scaling.row_scale, &self.scaling.col_scale);
        let st = &self.symbolic.structure;
        let mut z = try_alloc(n, T::zero())?;
        if transpose {
            for (l, zl) in z.iter_mut().enumerate() {
                let j = cp[l];
                *zl = b[j].scale(dc[j]);
            }
            solve_transposed(st, self.factors, &mut z)?;
            for (k, &zk) in z.iter().enumerate() {
                let i = rp[k];
                x[i] = zk.scale(dr[i]);
            }
        } else {
            for (k, zk) in z.iter_mut().enumerate() {
                let i = rp[k];
                *zk = b[i].scale(dr[i]);
            }
            solve_factored(st, self.factors, &mut z, pool)?;
            for (l, &zl) in z.iter().enumerate() {
                let j = cp[l];
                x[j] = zl.scale(dc[j]);
            }
        }
        Ok(())
    }
}

fn not_ready(s: usize) -> SolverError {
    SolverError::Internal(format!("solve block {s} read before it was computed"))
}

/// Solve `B z = c` in place.
pub fn solve_factored<T: Scalar>(
    st: &Structure,
    factors: &Factors<T>,
    z: &mut [T],
    pool: Option<&ThreadPool>,
) -> SolverResult<()> {
    let ns = st.count();
    let ys: Vec<OnceLock<Vec<T>>> = (0..ns).map(|_| OnceLock::new()).collect();
    let xs: Vec<OnceLock<Vec<T>>> = (0..ns).map(|_| OnceLock::new()).collect();
    {
        let rhs: &[T] = z;
        let forward = TaskGraph::from_links(st, |l| l.upper, false);
        schedule::run(&forward, pool, |s| {
            let y = forward_block(st, factors, s, rhs, &ys)?;
            ys[s].set(y).map_err(|_| not_ready(s))
        })?;
        let backward = TaskGraph::from_links(st, |l| l.lower, true);
        schedule::run(&backward, pool, |task| {
            let s = ns - 1 - task;
            let x = backward_block(st, factors, s, &ys, &xs)?;
            xs[s].set(x).map_err(|_| not_ready(s))
        })?;
    }
    for (s, seg) in xs.into_iter().enumerate() {
        let seg = seg.into_inner().ok_or_else(|| not_ready(s))?;
        z[st.first[s]..st.first[s + 1]].copy_from_slice(&seg);
    }
    Ok(())
}

fn forward_block<T: Scalar>(
    st: &Structure,
    factors: &Factors<T>,
    s: usize,
    rhs: &[T],
    ys: &[OnceLock<Vec<T>>],
) -> SolverResult<Vec<T>> {
    let (f, last) = (st.first[s], st.last(s));
    let sf = &factors.supernodes[s];
    let mut seg = rhs[f..=last].to_vec();
    let mut upd = Vec::new();
    for link in st.incoming[s].iter().filter(|link| link.upper) {
        let t = link.from;
        let tf = &factors.supernodes[t];
        let yt = ys[t].get().ok_or_else(|| not_ready(t))?;
        let rr = Structure::range_in(&st.rows[t], f, last);
        let m = rr.len();
        upd.clear();
        upd.resize(m, T::zero());
        T::gemm(m, 1, tf.width, &tf.lower[tf.width + rr.start..], tf.height, yt, tf.width, &mut upd, m);
        for (&row, &v) in st.rows[t][rr].iter().zip(&upd) {
            seg[row - f] -= v;
        }
    }

    let w = sf.width;
    let mut y: Vec<T> = sf.perm.iter().map(|&p| seg[p]).collect();
    T::trsm(Triangle::UnitLower, false, w, 1, &sf.lower, sf.height, &mut y, w);
    Ok(y)
}

fn backward_block<T: Scalar>(
    st: &Structure,
    factors: &Factors<T>,
    s: usize,
    ys: &[OnceLock<Vec<T>>],
    xs: &[OnceLock<Vec<T>>],
) -> SolverResult<Vec<T>> {
    let sf = &factors.supernodes[s];
    let w = sf.width;
    let mut x = ys[s].get().ok_or_else(|| not_ready(s))?.clone();
    let gathered = st.cols[s]
        .iter()
        .map(|&col| {
            let u = st.owner[col];
            xs[u].get().map(|xu| xu[col - st.first[u]]).ok_or_else(|| not_ready(u))
        })
        .collect::<SolverResult<Vec<T>>>()?;
    let nu = gathered.len();
    T::gemm_sub(w, 1, nu, &sf.upper, w, &gathered, nu, &mut x, w);
    T::trsm(Triangle::Upper, false, w, 1, &sf.lower, sf.height, &mut x, w);
    Ok(x)
}

/// Solve `B^T z = c` in place.
pub fn solve_transposed<T: Scalar>(st: &Structure, factors: &Factors<T>, z: &mut [T]) -> SolverResult<()> {
    let ns = st.count();
    let mut v = Vec::new();
    let mut acc = Vec::new();

    // U^T w = c, column order
    for s in 0..ns {
        let sf = &factors.supernodes[s];
        let (f, w) = (st.first[s], sf.width);
        T::trsm(Triangle::Upper, true, w, 1, &sf.lower, sf.height, &mut z[f..f + w], w);
        let nu = st.cols[s].len();
        if nu > 0 {
            // (U12^T w_s)^T = w_s^T U12
            acc.clear();
            acc.resize(nu, T::zero());
            T::gemm(1, nu, w, &z[f..f + w], 1, &sf.upper, w, &mut acc, 1);
            for (&col, &a) in st.cols[s].iter().zip(&acc) {
                z[col] -= a;
            }
        }
    }

    // L^T v = w, reverse order, scattering each block back to row labels
    for s in (0..ns).rev() {
        let sf = &factors.supernodes[s];
        let (f, w) = (st.first[s], sf.width);
        v.clear();
        v.extend_from_slice(&z[f..f + w]);
        let below = st.rows[s].len();
        if below > 0 {
            acc.clear();
            acc.extend(st.rows[s].iter().map(|&row| z[row]));
            T::gemm_sub(1, w, below, &acc, 1, &sf.lower[w..], sf.height, &mut v, 1);
        }
        T::trsm(Triangle::UnitLower, true, w, 1, &sf.lower, sf.height, &mut v, w);
        for (q, &p) in sf.perm.iter().enumerate() {
            z[f + p] = v[q];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::matrix::CsrPattern;
    use crate::numeric::{factorize, scaled_values};
    use crate::sparse;
    use crate::symbolic;
    use num_complex::Complex64;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    struct Case<T> {
        n: usize,
        ap: Vec<usize>,
        ai: Vec<usize>,
        ax: Vec<T>,
    }

    fn random_case<T: Scalar>(n: usize, seed: u64, value: impl Fn(&mut ChaCha8Rng) -> T) -> Case<T> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut ap = vec![0];
        let mut ai = Vec::new();
        let mut ax = Vec::new();
        for i in 0..n {
            let mut cols: Vec<usize> = (0..3).map(|_| rng.gen_range(0..n)).collect();
            // Diagonal occasionally zero so pivoting is exercised
            if i % 5 != 0 {
                cols.push(i);
            }
            let shift = (i + 1) % n;
            cols.push(shift);
            cols.sort_unstable();
            cols.dedup();
            for j in cols {
                ai.push(j);
                let v = value(&mut rng);
                // The cyclic shift dominates each row, so matching moves it onto the diagonal
                ax.push(if j == shift { v + T::from_real(50.0) } else { v });
            }
            ap.push(ai.len());
        }
        Case { n, ap, ai, ax }
    }

    fn check<T: Scalar>(case: &Case<T>, cfg: &Config, pool: Option<&ThreadPool>) {
        let ap: Vec<i64> = case.ap.iter().map(|&v| v as i64).collect();
        let ai: Vec<i64> = case.ai.iter().map(|&v| v as i64).collect();
        let pattern = CsrPattern::from_raw(case.n as i64, &ap, &ai).unwrap();
        let mags: Vec<f64> = case.ax.iter().map(|v| v.modulus()).collect();
        let matching = crate::ordering::matching::static_pivoting(&pattern, Some(&mags)).unwrap();
        let order: Vec<usize> = (0..case.n).collect();
        let sym = symbolic::analyze(&pattern, &matching, &order, cfg).unwrap();
        let scaling = Scaling::equilibrate(&pattern, &case.ax, 10);
        let scaled = scaled_values(&pattern, &scaling, &case.ax).unwrap();
        let factors = factorize(&sym, &scaled, cfg, pool).unwrap();
        let ctx = SolveContext { symbolic: &sym, scaling: &scaling, factors: &factors };

        let b: Vec<T> = (0..case.n).map(|i| T::from_real(1.0 + (i % 7) as f64)).collect();
        for transpose in [false, true] {
            let mut x = vec![T::zero(); case.n];
            ctx.solve(&b, &mut x, transpose, pool).unwrap();
            let rel = sparse::relative_residual(case.n, &case.ap, &case.ai, &case.ax, &x, &b, transpose);
            assert!(rel < 1e-9, "transpose={transpose} residual {rel:e}");
        }
    }

    #[test]
    fn test_real_random_solves() {
        for (seed, min_cols) in [(1, 1), (2, 4), (3, 32)] {
            let case = random_case(60, seed, |r| r.gen_range(-10.0..10.0));
            check(&case, &Config { min_supernode_cols: min_cols, ..Default::default() }, None);
        }
    }

    #[test]
    fn test_complex_random_solves() {
        let case = random_case(40, 9, |r| Complex64::new(r.gen_range(-3.0..3.0), r.gen_range(-3.0..3.0)));
        check(&case, &Config { min_supernode_cols: 2, ..Default::default() }, None);
    }

    #[test]
    fn test_parallel_solve() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let case = random_case(150, 5, |r| r.gen_range(-1.0..1.0));
        check(&case, &Config { min_supernode_cols: 3, ..Default::default() }, Some(&pool));
    }

    #[test]
    fn test_block_pivoting_both_directions() {
        // Zero diagonal everywhere; one supernode pivots inside its block
        let case = Case {
            n: 4,
            ap: vec![0, 2, 4, 6, 8],
            ai: vec![1, 3, 0, 2, 1, 3, 0, 2],
            ax: vec![2.0, 1.0, 3.0, 1.0, 1.0, 4.0, 1.0, 5.0],
        };
        let pattern = CsrPattern::from_raw(4i32, &[0, 2, 4, 6, 8], &[1, 3, 0, 2, 1, 3, 0, 2]).unwrap();
        let id: Vec<usize> = (0..4).collect();
        let cfg = Config::default();
        let sym = symbolic::analyze(&pattern, &id, &id, &cfg).unwrap();
        assert_eq!(sym.supernodes(), 1);
        let scaling = Scaling::identity(4);
        let factors = factorize(&sym, &case.ax, &cfg, None).unwrap();
        assert!(factors.offdiag_pivots > 0);
        let ctx = SolveContext { symbolic: &sym, scaling: &scaling, factors: &factors };
        let b = [1.0, -2.0, 3.0, 0.5];
        for transpose in [false, true] {
            let mut x = vec![0.0; 4];
            ctx.solve(&b, &mut x, transpose, None).unwrap();
            let rel = sparse::relative_residual(4, &case.ap, &case.ai, &case.ax, &x, &b, transpose);
            assert!(rel < 1e-13, "transpose={transpose} residual {rel:e}");
        }
    }

    #[test]
    fn test_scenario_system() {
        // [2 1 0; 0 3 0; 1 0 4] x = [3 3 5] has x = [1 1 1]
        let case = Case { n: 3, ap: vec![0, 2, 3, 5], ai: vec![0, 1, 1, 0, 2], ax: vec![2.0, 1.0, 3.0, 1.0, 4.0] };
        let pattern = CsrPattern::from_raw(3i32, &[0, 2, 3, 5], &[0, 1, 1, 0, 2]).unwrap();
        let id = vec![0, 1, 2];
        let cfg = Config::default();
        let sym = symbolic::analyze(&pattern, &id, &id, &cfg).unwrap();
        let scaling = Scaling::identity(3);
        let factors = factorize(&sym, &case.ax, &cfg, None).unwrap();
        let ctx = SolveContext { symbolic: &sym, scaling: &scaling, factors: &factors };
        let mut x = vec![0.0; 3];
        ctx.solve(&[3.0, 3.0, 5.0], &mut x, false, None).unwrap();
        for v in x {
            assert!((v - 1.0).abs() < 1e-14);
        }
    }
}
