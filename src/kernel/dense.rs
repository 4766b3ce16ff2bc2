//! Per-column dense primitives.
//!
//! Kernels follow the BLAS convention for zero coefficients: a zero `beta`
//! (or `gamma`) means the destination is overwritten without being read, and
//! a zero `alpha` means the corresponding source term is never touched. This
//! matters for IEEE semantics — an uninitialized (NaN-filled) destination
//! must not poison `dst = alpha*x` just because `beta == 0`. The one
//! deliberate exception is [`scale_in_place`], which always performs the
//! multiplication so that `NaN * 0 = NaN` is preserved.
//!
//! Reduction kernels accumulate in `f64` regardless of the scalar type; the
//! per-column partials travel the communicator wire as `f64` and are
//! converted back afterwards.

use faer::Mat;
use num_traits::Float;
use rand::Rng;
use rand::distributions::uniform::SampleUniform;

/// x *= alpha, every element, no short-circuit for alpha == 0.
pub fn scale_in_place<T: Float>(x: &mut [T], alpha: T) {
    for xi in x.iter_mut() {
        *xi = *xi * alpha;
    }
}

/// dst = alpha * src.
pub fn scale_from<T: Float>(dst: &mut [T], alpha: T, src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());
    for (di, &si) in dst.iter_mut().zip(src) {
        *di = alpha * si;
    }
}

/// dst = alpha * x + beta * dst.
pub fn axpby<T: Float>(dst: &mut [T], alpha: T, x: &[T], beta: T) {
    debug_assert_eq!(dst.len(), x.len());
    let zero = T::zero();
    if beta == zero {
        if alpha == zero {
            dst.fill(zero);
        } else {
            for (di, &xi) in dst.iter_mut().zip(x) {
                *di = alpha * xi;
            }
        }
    } else if alpha == zero {
        for di in dst.iter_mut() {
            *di = beta * *di;
        }
    } else {
        for (di, &xi) in dst.iter_mut().zip(x) {
            *di = alpha * xi + beta * *di;
        }
    }
}

/// dst = alpha * x + beta * y + gamma * dst.
pub fn lin_comb3<T: Float>(dst: &mut [T], alpha: T, x: &[T], beta: T, y: &[T], gamma: T) {
    debug_assert_eq!(dst.len(), x.len());
    debug_assert_eq!(dst.len(), y.len());
    let zero = T::zero();
    let skip_x = alpha == zero;
    let skip_y = beta == zero;
    for i in 0..dst.len() {
        let mut acc = if gamma == zero { zero } else { gamma * dst[i] };
        if !skip_x {
            acc = acc + alpha * x[i];
        }
        if !skip_y {
            acc = acc + beta * y[i];
        }
        dst[i] = acc;
    }
}

/// dst = 1 / src elementwise; zeros produce IEEE infinities.
pub fn reciprocal_into<T: Float>(dst: &mut [T], src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());
    for (di, &si) in dst.iter_mut().zip(src) {
        *di = T::one() / si;
    }
}

/// dst = |src| elementwise.
pub fn abs_into<T: Float>(dst: &mut [T], src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());
    for (di, &si) in dst.iter_mut().zip(src) {
        *di = si.abs();
    }
}

/// dst = s_this * dst + s_ab * (a ⊙ b), with the BLAS zero-coefficient
/// convention for `s_this`.
pub fn elem_mul<T: Float>(dst: &mut [T], s_this: T, s_ab: T, a: &[T], b: &[T]) {
    debug_assert_eq!(dst.len(), a.len());
    debug_assert_eq!(dst.len(), b.len());
    let zero = T::zero();
    if s_this == zero {
        for i in 0..dst.len() {
            dst[i] = s_ab * a[i] * b[i];
        }
    } else {
        for i in 0..dst.len() {
            dst[i] = s_this * dst[i] + s_ab * a[i] * b[i];
        }
    }
}

/// Σ x[i] * y[i], accumulated in f64.
pub fn dot_local<T: Float + Send + Sync>(x: &[T], y: &[T]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .zip(y.par_iter())
            .map(|(&xi, &yi)| xi.to_f64().unwrap_or(0.0) * yi.to_f64().unwrap_or(0.0))
            .sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .zip(y.iter())
            .map(|(&xi, &yi)| xi.to_f64().unwrap_or(0.0) * yi.to_f64().unwrap_or(0.0))
            .sum()
    }
}

/// Σ x[i], accumulated in f64.
pub fn sum_local<T: Float>(x: &[T]) -> f64 {
    x.iter().map(|&xi| xi.to_f64().unwrap_or(0.0)).sum()
}

/// Σ |x[i]|, accumulated in f64.
pub fn norm1_local<T: Float + Send + Sync>(x: &[T]) -> f64 {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .map(|&xi| xi.to_f64().unwrap_or(0.0).abs())
            .sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter().map(|&xi| xi.to_f64().unwrap_or(0.0).abs()).sum()
    }
}

/// Σ x[i]², accumulated in f64. Callers take the square root after the
/// cross-process combine, never before.
pub fn sumsq_local<T: Float + Send + Sync>(x: &[T]) -> f64 {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .map(|&xi| {
                let v = xi.to_f64().unwrap_or(0.0);
                v * v
            })
            .sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .map(|&xi| {
                let v = xi.to_f64().unwrap_or(0.0);
                v * v
            })
            .sum()
    }
}

/// max |x[i]|; 0 for an empty slice (the reduction identity).
pub fn norm_inf_local<T: Float>(x: &[T]) -> f64 {
    x.iter()
        .map(|&xi| xi.to_f64().unwrap_or(0.0).abs())
        .fold(0.0, f64::max)
}

/// Uniform pseudorandom fill over `[lo, hi]`.
pub fn fill_random<T, R>(dst: &mut [T], rng: &mut R, lo: T, hi: T)
where
    T: Float + SampleUniform,
    R: Rng,
{
    for di in dst.iter_mut() {
        *di = rng.gen_range(lo..=hi);
    }
}

/// Gather a selected window into a dense matrix, optionally transposing.
/// `col_of` maps logical to physical column indices; entry `(i, j)` of the
/// window is `src[col_of(j) * lda + row_offset + i]`.
pub fn gather<T: Float>(
    src: &[T],
    lda: usize,
    row_offset: usize,
    rows: usize,
    ncols: usize,
    col_of: impl Fn(usize) -> usize,
    transpose: bool,
) -> Mat<T> {
    if transpose {
        Mat::from_fn(ncols, rows, |i, j| src[col_of(i) * lda + row_offset + j])
    } else {
        Mat::from_fn(rows, ncols, |i, j| src[col_of(j) * lda + row_offset + i])
    }
}

/// Scatter a dense matrix back into a selected window (inverse of an
/// untransposed [`gather`]).
pub fn scatter<T: Float>(
    m: &Mat<T>,
    dst: &mut [T],
    lda: usize,
    row_offset: usize,
    col_of: impl Fn(usize) -> usize,
) {
    for j in 0..m.ncols() {
        let base = col_of(j) * lda + row_offset;
        for i in 0..m.nrows() {
            dst[base + i] = m[(i, j)];
        }
    }
}

/// Dense product alpha * a * b + beta * c, with the BLAS zero-beta
/// convention. Returns a fresh matrix; `c` is only read when beta != 0.
pub fn gemm<T: Float>(alpha: T, a: &Mat<T>, b: &Mat<T>, beta: T, c: &Mat<T>) -> Mat<T> {
    debug_assert_eq!(a.ncols(), b.nrows());
    let zero = T::zero();
    if beta != zero {
        debug_assert_eq!(c.nrows(), a.nrows());
        debug_assert_eq!(c.ncols(), b.ncols());
    }
    Mat::from_fn(a.nrows(), b.ncols(), |i, j| {
        let mut acc = zero;
        for k in 0..a.ncols() {
            acc = acc + a[(i, k)] * b[(k, j)];
        }
        if beta == zero {
            alpha * acc
        } else {
            alpha * acc + beta * c[(i, j)]
        }
    })
}
