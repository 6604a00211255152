//! C ABI for the parlu sparse LU solver.
//!
//! Four function families share one generic implementation:
//!
//! | prefix       | indices | values                         |
//! |--------------|---------|--------------------------------|
//! | `parlu_`     | `int`   | `double`                       |
//! | `parlu_l_`   | `int64` | `double`                       |
//! | `parlu_c_`   | `int`   | complex, interleaved `(re, im)` |
//! | `parlu_cl_`  | `int64` | complex, interleaved `(re, im)` |
//!
//! Every function returns `0` on success or a negative status code. Each
//! instance owns an `int64` parameter array of [`PARM_LEN`] entries whose
//! input keys are read before every call and whose output keys are written
//! after it. Panics never cross the boundary; they surface as `-10`.

#![warn(missing_docs)]
#![allow(clippy::missing_safety_doc)]

use num_complex::Complex64;
use parlu_core::config::parm;
use parlu_core::{Scalar, Solver, SolverError, SolverIndex, SolverResult};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Length of the parameter array.
pub const PARM_LEN: usize = parm::LEN;

const TAG_REAL: u32 = 0x504c_0001;
const TAG_LONG_REAL: u32 = 0x504c_0002;
const TAG_COMPLEX: u32 = 0x504c_0003;
const TAG_LONG_COMPLEX: u32 = 0x504c_0004;

/// Heap-allocated solver behind an opaque handle.
#[repr(C)]
struct Instance<I: SolverIndex, T: Scalar> {
    /// Family tag, first so that a handle of another family is rejected.
    tag: u32,
    parm: Box<[i64; PARM_LEN]>,
    solver: Solver<I, T>,
}

impl<I: SolverIndex, T: Scalar> Instance<I, T> {
    /// Run `op` with the caller's inputs applied and publish the outputs.
    fn call<R>(&mut self, op: impl FnOnce(&mut Solver<I, T>) -> SolverResult<R>) -> SolverResult<R> {
        self.solver.config_mut().from_parm(&self.parm[..]);
        let result = op(&mut self.solver);
        self.solver.stats().write_parm(&mut self.parm[..]);
        result
    }
}

fn guard(f: impl FnOnce() -> SolverResult<()>) -> i32 {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            log::debug!("parlu call failed: {err}");
            err.code()
        }
        Err(_) => SolverError::Internal("panic in solver".into()).code(),
    }
}

unsafe fn slice_arg<'a, U>(ptr: *const U, len: usize, what: &str) -> SolverResult<&'a [U]> {
    if ptr.is_null() {
        return Err(SolverError::Argument(format!("{what} pointer is null")));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}

unsafe fn instance<'a, I: SolverIndex, T: Scalar>(handle: *mut c_void, tag: u32) -> SolverResult<&'a mut Instance<I, T>> {
    // `tag` leads every layout, so it can be read before the family is known
    if handle.is_null() || handle.cast::<u32>().read() != tag {
        return Err(SolverError::InvalidHandle);
    }
    Ok(&mut *handle.cast::<Instance<I, T>>())
}

unsafe fn create<I: SolverIndex, T: Scalar>(
    tag: u32,
    handle: *mut *mut c_void,
    parm_out: *mut *mut i64,
    threads: i32,
) -> SolverResult<()> {
    if handle.is_null() {
        return Err(SolverError::Argument("instance pointer is null".into()));
    }
    let solver = Solver::<I, T>::new(threads)?;
    let mut inst = Box::new(Instance { tag, parm: Box::new([0i64; PARM_LEN]), solver });
    inst.solver.config().write_parm(&mut inst.parm[..]);
    inst.solver.stats().write_parm(&mut inst.parm[..]);
    let raw = Box::into_raw(inst);
    *handle = raw.cast();
    if !parm_out.is_null() {
        *parm_out = (*raw).parm.as_mut_ptr();
    }
    Ok(())
}

unsafe fn destroy<I: SolverIndex, T: Scalar>(tag: u32, handle: *mut c_void) -> SolverResult<()> {
    let inst = instance::<I, T>(handle, tag)?;
    inst.tag = 0;
    drop(Box::from_raw(inst as *mut Instance<I, T>));
    Ok(())
}

unsafe fn analyze<I: SolverIndex, T: Scalar>(
    tag: u32,
    handle: *mut c_void,
    repeat: bool,
    n: I,
    ap: *const I,
    ai: *const I,
    ax: *const f64,
) -> SolverResult<()> {
    let inst = instance::<I, T>(handle, tag)?;
    let len = n
        .to_usize()
        .filter(|&n| n > 0)
        .ok_or_else(|| SolverError::Argument("matrix dimension must be positive".into()))?;
    let ap = slice_arg(ap, len.checked_add(1).ok_or(SolverError::IntegerOverflow)?, "row pointer")?;
    let nnz = ap[len]
        .to_usize()
        .ok_or_else(|| SolverError::InvalidMatrix("negative row pointer".into()))?;
    let ai = slice_arg(ai, nnz, "column index")?;
    let ax = if ax.is_null() { None } else { Some(slice_arg(ax.cast::<T>(), nnz, "value")?) };
    inst.call(|s| s.analyze(repeat, n, ap, ai, ax))
}

unsafe fn factorize<I: SolverIndex, T: Scalar>(tag: u32, handle: *mut c_void, ax: *const f64) -> SolverResult<()> {
    let inst = instance::<I, T>(handle, tag)?;
    let nnz = inst
        .solver
        .nnz()
        .ok_or(SolverError::CallingProcedure("factorize called before analyze"))?;
    let ax = slice_arg(ax.cast::<T>(), nnz, "value")?;
    inst.call(|s| s.factorize(ax))
}

unsafe fn solve<I: SolverIndex, T: Scalar>(
    tag: u32,
    handle: *mut c_void,
    transpose: bool,
    b: *const f64,
    x: *mut f64,
) -> SolverResult<()> {
    let inst = instance::<I, T>(handle, tag)?;
    let n = inst
        .solver
        .n()
        .ok_or(SolverError::CallingProcedure("solve called before factorize"))?;
    // `x` may overlap `b`: copy the right-hand side before borrowing `x`
    let rhs = slice_arg(b.cast::<T>(), n, "right-hand side")?.to_vec();
    if x.is_null() {
        return Err(SolverError::Argument("solution pointer is null".into()));
    }
    let x = std::slice::from_raw_parts_mut(x.cast::<T>(), n);
    inst.call(|s| s.solve(transpose, &rhs, x))
}

unsafe fn determinant<I: SolverIndex, T: Scalar>(
    tag: u32,
    handle: *mut c_void,
    mantissa: *mut f64,
    exponent: *mut i64,
) -> SolverResult<()> {
    let inst = instance::<I, T>(handle, tag)?;
    if mantissa.is_null() || exponent.is_null() {
        return Err(SolverError::Argument("determinant output pointer is null".into()));
    }
    let det = inst.call(|s| s.determinant())?;
    mantissa.cast::<T>().write_unaligned(det.mantissa);
    exponent.write(det.exponent);
    Ok(())
}

unsafe fn condition<I: SolverIndex, T: Scalar>(tag: u32, handle: *mut c_void, estimate: *mut f64) -> SolverResult<()> {
    let inst = instance::<I, T>(handle, tag)?;
    if estimate.is_null() {
        return Err(SolverError::Argument("condition output pointer is null".into()));
    }
    let cond = inst.call(|s| s.condition_number())?;
    estimate.write(cond);
    Ok(())
}

macro_rules! ffi_family {
    (
        $name:literal, $tag:expr, $idx:ty, $val:ty,
        $create:ident, $destroy:ident, $analyze:ident, $factorize:ident,
        $solve:ident, $determinant:ident, $condition:ident
    ) => {
        #[doc = concat!("Create a ", $name, " solver instance with `threads` workers (1 sequential, 0 physical cores, negative logical cores).")]
        ///
        /// `parm` may be null; otherwise it receives the instance's parameter array.
        #[no_mangle]
        pub unsafe extern "C" fn $create(instance: *mut *mut c_void, parm: *mut *mut i64, threads: i32) -> i32 {
            guard(|| unsafe { create::<$idx, $val>($tag, instance, parm, threads) })
        }

        #[doc = concat!("Destroy a ", $name, " solver instance and its threads.")]
        #[no_mangle]
        pub unsafe extern "C" fn $destroy(instance: *mut c_void) -> i32 {
            guard(|| unsafe { destroy::<$idx, $val>($tag, instance) })
        }

        /// Order and symbolically factor the CSR matrix; `ax` may be null.
        #[no_mangle]
        pub unsafe extern "C" fn $analyze(
            instance: *mut c_void,
            repeat: bool,
            n: $idx,
            ap: *const $idx,
            ai: *const $idx,
            ax: *const f64,
        ) -> i32 {
            guard(|| unsafe { analyze::<$idx, $val>($tag, instance, repeat, n, ap, ai, ax) })
        }

        /// Factor values sharing the analyzed structure.
        #[no_mangle]
        pub unsafe extern "C" fn $factorize(instance: *mut c_void, ax: *const f64) -> i32 {
            guard(|| unsafe { factorize::<$idx, $val>($tag, instance, ax) })
        }

        /// Solve `A x = b` (or `A^T x = b`); `x` may overlap `b`.
        #[no_mangle]
        pub unsafe extern "C" fn $solve(instance: *mut c_void, transpose: bool, b: *const f64, x: *mut f64) -> i32 {
            guard(|| unsafe { solve::<$idx, $val>($tag, instance, transpose, b, x) })
        }

        /// Determinant as `mantissa * 10^exponent`.
        #[no_mangle]
        pub unsafe extern "C" fn $determinant(instance: *mut c_void, mantissa: *mut f64, exponent: *mut i64) -> i32 {
            guard(|| unsafe { determinant::<$idx, $val>($tag, instance, mantissa, exponent) })
        }

        /// Estimated 1-norm condition number.
        #[no_mangle]
        pub unsafe extern "C" fn $condition(instance: *mut c_void, estimate: *mut f64) -> i32 {
            guard(|| unsafe { condition::<$idx, $val>($tag, instance, estimate) })
        }
    };
}

ffi_family!(
    "real", TAG_REAL, i32, f64,
    parlu_create_solver, parlu_destroy_solver, parlu_analyze, parlu_factorize,
    parlu_solve, parlu_determinant, parlu_condition_number
);

ffi_family!(
    "real 64-bit index", TAG_LONG_REAL, i64, f64,
    parlu_l_create_solver, parlu_l_destroy_solver, parlu_l_analyze, parlu_l_factorize,
    parlu_l_solve, parlu_l_determinant, parlu_l_condition_number
);

ffi_family!(
    "complex", TAG_COMPLEX, i32, Complex64,
    parlu_c_create_solver, parlu_c_destroy_solver, parlu_c_analyze, parlu_c_factorize,
    parlu_c_solve, parlu_c_determinant, parlu_c_condition_number
);

ffi_family!(
    "complex 64-bit index", TAG_LONG_COMPLEX, i64, Complex64,
    parlu_cl_create_solver, parlu_cl_destroy_solver, parlu_cl_analyze, parlu_cl_factorize,
    parlu_cl_solve, parlu_cl_determinant, parlu_cl_condition_number
);
