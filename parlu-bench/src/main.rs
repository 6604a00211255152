//! Command-line driver for the parlu sparse LU solver.
//!
//! Reads a coordinate-format matrix, builds a random right-hand side and
//! runs analyze, factorize and solve, printing the solver telemetry and the
//! relative residual of the result.

mod mtx;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mtx::MtxMatrix;
use num_complex::Complex64;
use parlu_core::sparse;
use parlu_core::{Config, OrderingMethod, RefinementPolicy, Scalar, Solver, SolverIndex, TimerMode};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Instant;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Family {
    /// Real values, 32-bit indices
    Real,
    /// Real values, 64-bit indices
    LongReal,
    /// Complex values, 32-bit indices
    Complex,
    /// Complex values, 64-bit indices
    LongComplex,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderingChoice {
    Auto,
    Amd,
    AmdVariant,
    Nd,
    NdVariant,
    BestAmd,
    BestNd,
    BestAll,
}

impl From<OrderingChoice> for OrderingMethod {
    fn from(choice: OrderingChoice) -> Self {
        match choice {
            OrderingChoice::Auto => OrderingMethod::Auto,
            OrderingChoice::Amd => OrderingMethod::Amd,
            OrderingChoice::AmdVariant => OrderingMethod::AmdVariant,
            OrderingChoice::Nd => OrderingMethod::NestedDissection,
            OrderingChoice::NdVariant => OrderingMethod::NestedDissectionVariant,
            OrderingChoice::BestAmd => OrderingMethod::BestOfAmd,
            OrderingChoice::BestNd => OrderingMethod::BestOfNd,
            OrderingChoice::BestAll => OrderingMethod::BestOfAll,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "parlu-bench", version, about = "Solve a coordinate-format sparse system with parlu")]
struct Args {
    /// Coordinate-format matrix file
    matrix: PathBuf,

    /// Worker threads: 1 sequential, 0 all physical cores, negative all logical cores
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    threads: i32,

    /// Value and index family
    #[arg(short, long, value_enum, default_value_t = Family::Real)]
    family: Family,

    /// Fill-reducing ordering
    #[arg(short, long, value_enum, default_value_t = OrderingChoice::Auto)]
    ordering: OrderingChoice,

    /// Refinement: 0 automatic, >0 at most this many steps, <0 exactly -N steps
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    refine: i64,

    /// Solve the transposed system
    #[arg(long)]
    transpose: bool,

    /// Also report the determinant and the condition number estimate
    #[arg(long)]
    diagnostics: bool,

    /// Seed of the random right-hand side
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let matrix = mtx::read_mtx(&args.matrix)?;
    println!("Matrix {}: n = {}, nnz = {}", args.matrix.display(), matrix.n, matrix.nnz());

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    match args.family {
        Family::Real => {
            let values = matrix.values.clone();
            run::<i32, f64>(&args, &matrix, values, &mut rng, |r| r.gen_range(-50.0..50.0))
        }
        Family::LongReal => {
            let values = matrix.values.clone();
            run::<i64, f64>(&args, &matrix, values, &mut rng, |r| r.gen_range(-50.0..50.0))
        }
        Family::Complex => {
            let values = complex_values(&matrix, &mut rng);
            run::<i32, Complex64>(&args, &matrix, values, &mut rng, random_complex)
        }
        Family::LongComplex => {
            let values = complex_values(&matrix, &mut rng);
            run::<i64, Complex64>(&args, &matrix, values, &mut rng, random_complex)
        }
    }
}

/// Complex values with the file's real parts and imaginary parts `v * U(-4, 4)`.
fn complex_values(matrix: &MtxMatrix, rng: &mut ChaCha8Rng) -> Vec<Complex64> {
    matrix
        .values
        .iter()
        .map(|&v| Complex64::new(v, v * rng.gen_range(-4.0..4.0)))
        .collect()
}

fn random_complex(rng: &mut ChaCha8Rng) -> Complex64 {
    Complex64::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0))
}

fn convert<I: SolverIndex>(v: &[usize]) -> Result<Vec<I>> {
    v.iter()
        .map(|&x| I::from_usize(x).context("index does not fit the selected index width"))
        .collect()
}

fn seconds(elapsed_us: i64) -> f64 {
    elapsed_us as f64 * 1e-6
}

fn run<I: SolverIndex, T: Scalar>(
    args: &Args,
    matrix: &MtxMatrix,
    values: Vec<T>,
    rng: &mut ChaCha8Rng,
    mut random: impl FnMut(&mut ChaCha8Rng) -> T,
) -> Result<()> {
    let n = I::from_usize(matrix.n).context("dimension does not fit the selected index width")?;
    let row_ptr = convert::<I>(&matrix.row_ptr)?;
    let col_idx = convert::<I>(&matrix.col_idx)?;

    let config = Config {
        timer: TimerMode::Microseconds,
        ordering: args.ordering.into(),
        refinement: RefinementPolicy::from_code(args.refine),
        ..Default::default()
    };
    let mut solver = Solver::<I, T>::with_config(args.threads, config)?;
    let threads = solver.stats().threads;
    println!(
        "Threads: {} created ({} physical, {} logical cores)",
        threads.created, threads.physical, threads.logical
    );

    solver
        .analyze(false, n, &row_ptr, &col_idx, Some(&values))
        .context("Analysis failed")?;
    let stats = solver.stats();
    println!("Analysis time = {:.6} s", seconds(stats.elapsed));
    println!("  ordering       = {:?}", stats.selected_ordering.unwrap_or_default());
    println!("  nnz(L)         = {}", stats.nnz_l);
    println!("  nnz(U)         = {}", stats.nnz_u);
    println!("  flops(factor)  = {:.3e}", stats.factor_flops);
    println!("  flops(solve)   = {:.3e}", stats.solve_flops);
    println!("  supernodes     = {}", stats.supernodes);

    solver.factorize(&values).context("Factorization failed")?;
    let stats = solver.stats();
    println!("Factorization time = {:.6} s", seconds(stats.elapsed));
    println!("  swapped pivots   = {}", stats.offdiag_pivots);
    println!("  perturbed pivots = {}", stats.perturbed_pivots);
    println!("  memory           = {} bytes (peak {})", stats.current_memory, stats.peak_memory);

    let b: Vec<T> = (0..matrix.n).map(|_| random(rng)).collect();
    let mut x = vec![T::zero(); matrix.n];
    let start = Instant::now();
    solver.solve(args.transpose, &b, &mut x).context("Solve failed")?;
    let wall = start.elapsed();
    let stats = solver.stats();
    println!("Solve time = {:.6} s (wall {:.6} s)", seconds(stats.elapsed), wall.as_secs_f64());
    println!("  refinements = {}", stats.refinements);

    let residual = sparse::relative_residual(
        matrix.n,
        &matrix.row_ptr,
        &matrix.col_idx,
        &values,
        &x,
        &b,
        args.transpose,
    );
    println!("Relative residual = {residual:.3e}");

    if args.diagnostics {
        let det = solver.determinant()?;
        println!("Determinant = {:?} x 10^{}", det.mantissa, det.exponent);
        println!("Condition number estimate = {:.3e}", solver.condition_number()?);
    }
    Ok(())
}
