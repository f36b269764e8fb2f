//! Tensor-level kernels: wraps [`crate::simd::VectorEngine`]'s contiguous
//! primitives with the N-dimensional partitioning and broadcast rules that
//! operate on [`crate::tensor::Tensor`] nodes.
//!
//! Every function here takes `(worker_idx, worker_count, node)` and is
//! expected to be called once per worker per phase by [`crate::pool::ThreadPool`]
//! — partitioning is computed from `worker_idx`/`worker_count` inside each
//! function, not by the caller.

use crate::simd::VectorEngine;
use crate::tensor::{Tensor, MAX_DIMS};

/// `ceil(numel / worker_count)`-sized contiguous chunk for this worker.
/// Returns `None` if this worker has no work (chunk start already past the
/// end of the range).
fn partition_range(worker_idx: u32, worker_count: u32, numel: usize) -> Option<(usize, usize)> {
    let chunk = (numel + worker_count as usize - 1) / worker_count as usize;
    let start = worker_idx as usize * chunk;
    if start >= numel {
        return None;
    }
    let end = (start + chunk).min(numel);
    Some((start, end))
}

// ---- unary / unary-scalar --------------------------------------------------

type UnaryFn = fn(&VectorEngine, &mut [f32], &[f32]);

/// Runs a unary vector primitive over this worker's partition of `r`/`x`.
pub fn unary(engine: &VectorEngine, worker_idx: u32, worker_count: u32, r: &Tensor, x: &Tensor, f: UnaryFn) {
    debug_assert!(r.is_shape_eq(x));
    let numel = r.numel() as usize;
    let Some((start, end)) = partition_range(worker_idx, worker_count, numel) else {
        return;
    };
    unsafe {
        let rs = r.as_mut_slice();
        let xs = x.as_slice();
        f(engine, &mut rs[start..end], &xs[start..end]);
    }
}

type ScalarFn = fn(&VectorEngine, &mut [f32], &[f32], f32);

/// Runs a scalar-RHS vector primitive (`Adds`/`Subs`/`Muls`/`Divs`) over this
/// worker's partition.
pub fn unary_scalar(
    engine: &VectorEngine,
    worker_idx: u32,
    worker_count: u32,
    r: &Tensor,
    x: &Tensor,
    scalar: f32,
    f: ScalarFn,
) {
    debug_assert!(r.is_shape_eq(x));
    let numel = r.numel() as usize;
    let Some((start, end)) = partition_range(worker_idx, worker_count, numel) else {
        return;
    };
    unsafe {
        let rs = r.as_mut_slice();
        let xs = x.as_slice();
        f(engine, &mut rs[start..end], &xs[start..end], scalar);
    }
}

/// Plain buffer copy, used for `OpTag::Clone`.
pub fn clone_buffer(worker_idx: u32, worker_count: u32, r: &Tensor, x: &Tensor) {
    debug_assert!(r.is_shape_eq(x));
    let numel = r.numel() as usize;
    let Some((start, end)) = partition_range(worker_idx, worker_count, numel) else {
        return;
    };
    unsafe {
        let rs = r.as_mut_slice();
        let xs = x.as_slice();
        rs[start..end].copy_from_slice(&xs[start..end]);
    }
}

// ---- reductions -------------------------------------------------------------

/// Sequential whole-tensor reductions. Never partitioned: only
/// `worker_idx == 0` performs any work, matching the source's dispatch
/// functions that never branch on `worker_idx` for these ops.
pub fn sum(worker_idx: u32, r: &Tensor, x: &Tensor, engine: &VectorEngine) {
    if worker_idx != 0 {
        return;
    }
    let acc = engine.sum_f64(unsafe { x.as_slice() });
    unsafe { r.as_mut_slice()[0] = acc as f32 };
}

pub fn mean(worker_idx: u32, r: &Tensor, x: &Tensor, engine: &VectorEngine) {
    if worker_idx != 0 {
        return;
    }
    let numel = x.numel() as f64;
    let acc = engine.sum_f64(unsafe { x.as_slice() });
    unsafe { r.as_mut_slice()[0] = (acc / numel) as f32 };
}

pub fn min(worker_idx: u32, r: &Tensor, x: &Tensor, engine: &VectorEngine) {
    if worker_idx != 0 {
        return;
    }
    unsafe { r.as_mut_slice()[0] = engine.min(x.as_slice()) };
}

pub fn max(worker_idx: u32, r: &Tensor, x: &Tensor, engine: &VectorEngine) {
    if worker_idx != 0 {
        return;
    }
    unsafe { r.as_mut_slice()[0] = engine.max(x.as_slice()) };
}

// ---- broadcast elementwise binary -------------------------------------------

type BinaryFn = fn(&VectorEngine, &mut [f32], &[f32], &[f32]);

/// Decomposes a linear outer index (over dims 1..5) into per-axis indices.
fn outer_index(mut ri: usize, shape: &[i64; MAX_DIMS]) -> [usize; MAX_DIMS] {
    let mut idx = [0usize; MAX_DIMS];
    for k in 1..MAX_DIMS {
        let dk = shape[k] as usize;
        idx[k] = ri % dk;
        ri /= dk;
    }
    idx
}

/// Runs a broadcast binary op (`Add`/`Sub`/`Mul`/`Div`) over this worker's
/// partition of the outer-5 index space, per the fast-path/strided-path
/// split on `y`'s innermost stride.
pub fn binary(engine: &VectorEngine, worker_idx: u32, worker_count: u32, r: &Tensor, x: &Tensor, y: &Tensor, f: BinaryFn) {
    debug_assert!(r.is_shape_eq(x));
    let d = x.shape;
    let e = y.shape;
    let ys = y.strides;

    let outer_numel: usize = d[1..MAX_DIMS].iter().map(|&v| v as usize).product();
    let Some((start, end)) = partition_range(worker_idx, worker_count, outer_numel) else {
        return;
    };

    let xs = unsafe { x.as_slice() };
    let ysl = unsafe { y.as_slice() };
    let rs = unsafe { r.as_mut_slice() };

    let d0 = d[0] as usize;
    let e0 = e[0] as usize;

    for ri in start..end {
        let xi = outer_index(ri, &d);
        let mut yi = [0usize; MAX_DIMS];
        for k in 1..MAX_DIMS {
            yi[k] = xi[k] % (e[k] as usize);
        }

        // Base offsets of this outer slice within the flat buffers.
        let mut x_base = 0usize;
        let mut y_base = 0usize;
        let mut stride = 1usize;
        for k in 1..MAX_DIMS {
            x_base += xi[k] * stride * d0;
            y_base += yi[k] * (ys[k] as usize);
            stride *= d[k] as usize;
        }

        if ys[0] as usize == 1 {
            let rep = d0 / e0;
            for rrow in 0..rep {
                let xr = x_base + rrow * e0;
                let rr = x_base + rrow * e0;
                f(
                    engine,
                    &mut rs[rr..rr + e0],
                    &xs[xr..xr + e0],
                    &ysl[y_base..y_base + e0],
                );
            }
        } else {
            for i in 0..d0 {
                let yi0 = i % e0;
                let y_addr = y_base + yi0 * (ys[0] as usize);
                let mut tmp = [0f32; 1];
                f(engine, &mut tmp, &xs[x_base + i..x_base + i + 1], &ysl[y_addr..y_addr + 1]);
                rs[x_base + i] = tmp[0];
            }
        }
    }
}

// ---- matrix multiplication ---------------------------------------------------

/// `R = X . Y` for `X: (M, K)`, `Y: (K, N)`, `R: (M, N)`, all row-major
/// contiguous. Unlike every other kernel in this module, matmul's shape
/// convention lists the logical dimension directly at its own index rather
/// than innermost-first: `x.shape = (M, K, 1, 1, 1, 1)`, `y.shape = (K, N, ...)`,
/// `r.shape = (M, N, ...)` (spec data model §3), so `M = x.shape[0]`,
/// `K = x.shape[1]`, `N = y.shape[1]`, and row `i` of `X`/`R` is the
/// contiguous run `[i*K, (i+1)*K)`/`[i*N, (i+1)*N)`. Partitions rows of `R`
/// across workers.
pub fn matmul(worker_idx: u32, worker_count: u32, r: &Tensor, x: &Tensor, y: &Tensor) {
    let m = x.shape[0] as usize;
    let k_dim = x.shape[1] as usize;
    let n = y.shape[1] as usize;
    debug_assert_eq!(y.shape[0] as usize, k_dim);
    debug_assert_eq!(r.shape[0] as usize, m);
    debug_assert_eq!(r.shape[1] as usize, n);

    let Some((row_start, row_end)) = partition_range(worker_idx, worker_count, m) else {
        return;
    };

    let xs = unsafe { x.as_slice() };
    let ys = unsafe { y.as_slice() };
    let rs = unsafe { r.as_mut_slice() };

    for i in row_start..row_end {
        let r_row = &mut rs[i * n..(i + 1) * n];
        r_row.fill(0.0);
        for k in 0..k_dim {
            let xik = xs[i * k_dim + k];
            let y_row = &ys[k * n..(k + 1) * n];
            for j in 0..n {
                r_row[j] += xik * y_row[j];
            }
        }
    }
}
