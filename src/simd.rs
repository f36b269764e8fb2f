//! Vector primitives: contiguous 1-D kernels over float32 slices.
//!
//! Every primitive has a portable scalar fallback and, where the operation
//! is simple enough to pay for the intrinsics (the four elementwise binary
//! ops, their scalar-RHS variants, and the cheap unary ops), an
//! `#[target_feature(enable = "avx2")]` specialization selected at runtime
//! via [`SimdLevel::detect`]. Transcendental unary kernels (`log`, `sin`,
//! `cos`, `softmax`, `sigmoid`, `silu`, `tanh`, `gelu`) stay on the portable
//! scalar path in both math modes; what varies between modes is whether
//! that scalar path calls the platform libm or the bounded polynomial
//! approximations in [`approx`], not whether it is vectorized.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::MathMode;

/// Detected CPU vector-instruction tier, probed once via
/// `is_x86_feature_detected!` and cached on the owning [`VectorEngine`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimdLevel {
    /// Universal x86_64 baseline; also the fallback on non-x86_64 targets.
    Sse2Baseline,
    Avx2Fma,
    Avx512,
}

impl SimdLevel {
    /// Cascades AVX-512F+DQ -> AVX2+FMA -> SSE2, mirroring the multiple
    /// per-feature-set compiled translation units this crate's lineage
    /// used to pick between at load time.
    pub fn detect() -> SimdLevel {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512dq") {
                return SimdLevel::Avx512;
            }
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return SimdLevel::Avx2Fma;
            }
        }
        SimdLevel::Sse2Baseline
    }

    /// Elements of `f32` processed per vector register at this level.
    pub fn lane_width_f32(self) -> usize {
        match self {
            SimdLevel::Sse2Baseline => 4,
            SimdLevel::Avx2Fma => 8,
            SimdLevel::Avx512 => 16,
        }
    }

    fn has_avx2(self) -> bool {
        matches!(self, SimdLevel::Avx2Fma | SimdLevel::Avx512)
    }
}

/// Owns the detected SIMD tier and the active math mode; every vector
/// primitive is called through here so kernels never re-probe CPU
/// features per call.
pub struct VectorEngine {
    level: SimdLevel,
    math_mode: MathMode,
    ops_dispatched: AtomicU64,
}

impl VectorEngine {
    /// `sqrt(2/pi)` reproduced to the source's literal precision rather
    /// than recomputed from `std::f64::consts::FRAC_2_PI`.
    const GELU_SQRT_2_OVER_PI: f32 = 0.797_884_56;
    /// `MAG_GELU_COEFF`.
    const GELU_COEFF: f32 = 0.044715;

    pub fn new(math_mode: MathMode) -> VectorEngine {
        let level = SimdLevel::detect();
        tracing::info!(?level, ?math_mode, "vector engine initialized");
        VectorEngine {
            level,
            math_mode,
            ops_dispatched: AtomicU64::new(0),
        }
    }

    pub fn level(&self) -> SimdLevel {
        self.level
    }

    pub fn math_mode(&self) -> MathMode {
        self.math_mode
    }

    pub fn ops_dispatched(&self) -> u64 {
        self.ops_dispatched.load(Ordering::Relaxed)
    }

    fn record(&self, n: usize) {
        self.ops_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(n, "vector primitive dispatched");
    }

    // ---- elementwise binary --------------------------------------------

    pub fn add(&self, o: &mut [f32], x: &[f32], y: &[f32]) {
        self.record(o.len());
        binary_dispatch(self.level, o, x, y, |a, b| a + b, avx2_add)
    }
    pub fn sub(&self, o: &mut [f32], x: &[f32], y: &[f32]) {
        self.record(o.len());
        binary_dispatch(self.level, o, x, y, |a, b| a - b, avx2_sub)
    }
    pub fn mul(&self, o: &mut [f32], x: &[f32], y: &[f32]) {
        self.record(o.len());
        binary_dispatch(self.level, o, x, y, |a, b| a * b, avx2_mul)
    }
    pub fn div(&self, o: &mut [f32], x: &[f32], y: &[f32]) {
        self.record(o.len());
        binary_dispatch(self.level, o, x, y, |a, b| a / b, avx2_div)
    }

    // ---- elementwise scalar-RHS -----------------------------------------

    pub fn adds(&self, o: &mut [f32], x: &[f32], s: f32) {
        self.record(o.len());
        scalar_dispatch(o, x, s, |a, s| a + s)
    }
    pub fn subs(&self, o: &mut [f32], x: &[f32], s: f32) {
        self.record(o.len());
        scalar_dispatch(o, x, s, |a, s| a - s)
    }
    pub fn muls(&self, o: &mut [f32], x: &[f32], s: f32) {
        self.record(o.len());
        scalar_dispatch(o, x, s, |a, s| a * s)
    }
    pub fn divs(&self, o: &mut [f32], x: &[f32], s: f32) {
        self.record(o.len());
        scalar_dispatch(o, x, s, |a, s| a / s)
    }

    // ---- simple unary (AVX2-eligible) -----------------------------------

    pub fn abs(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        unary_dispatch(self.level, o, x, f32::abs, avx2_abs)
    }
    pub fn neg(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        unary_dispatch(self.level, o, x, |v| -v, avx2_neg)
    }
    pub fn sqr(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        unary_dispatch(self.level, o, x, |v| v * v, avx2_sqr)
    }
    pub fn sqrt(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        unary_dispatch(self.level, o, x, f32::sqrt, avx2_sqrt)
    }
    pub fn step(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        unary_dispatch(
            self.level,
            o,
            x,
            |v| if v >= 0.0 { 1.0 } else { 0.0 },
            avx2_step,
        )
    }
    pub fn relu(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        unary_dispatch(self.level, o, x, |v| v.max(0.0), avx2_relu)
    }
    pub fn relu_dv(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            // Mathematically undefined at 0; the source returns 0 there by policy.
            o[i] = if x[i] <= 0.0 { 0.0 } else { 1.0 };
        }
    }

    // ---- transcendental unary (portable, mode-dependent) ----------------

    pub fn log(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        let approx = self.math_mode == MathMode::Approximate;
        for i in 0..o.len() {
            o[i] = if approx && x[i] > 0.0 {
                approx::log_f32(x[i])
            } else {
                x[i].ln()
            };
        }
    }

    pub fn sin(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        let approx = self.math_mode == MathMode::Approximate;
        for i in 0..o.len() {
            o[i] = if approx { approx::sincos_f32(x[i]).0 } else { x[i].sin() };
        }
    }

    pub fn cos(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        let approx = self.math_mode == MathMode::Approximate;
        for i in 0..o.len() {
            o[i] = if approx { approx::sincos_f32(x[i]).1 } else { x[i].cos() };
        }
    }

    fn exp_scalar(&self, v: f32) -> f32 {
        if self.math_mode == MathMode::Approximate {
            approx::exp_f32(v)
        } else {
            v.exp()
        }
    }

    fn tanh_scalar(&self, v: f32) -> f32 {
        if self.math_mode == MathMode::Approximate {
            approx::tanh_f32(v)
        } else {
            v.tanh()
        }
    }

    /// `softmax` here is the pointwise `e^x`, not a row-normalized softmax;
    /// normalization is a graph-layer concern out of scope for this kernel.
    pub fn softmax(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            o[i] = self.exp_scalar(x[i]);
        }
    }

    /// Identical to [`VectorEngine::softmax`] — not a real derivative. The
    /// full softmax Jacobian is not implemented upstream; preserved as-is.
    pub fn softmax_dv(&self, o: &mut [f32], x: &[f32]) {
        self.softmax(o, x)
    }

    pub fn sigmoid(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            o[i] = 1.0 / (1.0 + self.exp_scalar(-x[i]));
        }
    }

    /// Takes the sigmoid *output* as its argument, not the pre-activation
    /// input: `sigmoid_dv(s) = s * (1 - s)` where `s = sigmoid(x)`.
    pub fn sigmoid_dv(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            o[i] = x[i] * (1.0 - x[i]);
        }
    }

    pub fn hard_sigmoid(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            o[i] = ((x[i] + 3.0) / 6.0).clamp(0.0, 1.0);
        }
    }

    pub fn silu(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            o[i] = x[i] / (1.0 + self.exp_scalar(-x[i]));
        }
    }

    /// Unimplemented upstream (`mag_panic("NYI!")`); kept as a fatal stub
    /// rather than silently implementing a derivative the source never
    /// shipped.
    pub fn silu_dv(&self, _o: &mut [f32], _x: &[f32]) {
        panic!("silu_dv is not implemented");
    }

    pub fn tanh(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            o[i] = self.tanh_scalar(x[i]);
        }
    }

    pub fn tanh_dv(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            let c = x[i].cosh();
            o[i] = 1.0 / (c * c);
        }
    }

    pub fn gelu(&self, o: &mut [f32], x: &[f32]) {
        self.record(o.len());
        for i in 0..o.len() {
            let v = x[i];
            let inner = Self::GELU_SQRT_2_OVER_PI * v * (1.0 + Self::GELU_COEFF * v * v);
            o[i] = 0.5 * v * (1.0 + self.tanh_scalar(inner));
        }
    }

    /// Unimplemented upstream; kept as a fatal stub, see [`VectorEngine::silu_dv`].
    pub fn gelu_dv(&self, _o: &mut [f32], _x: &[f32]) {
        panic!("gelu_dv is not implemented");
    }

    // ---- reductions ------------------------------------------------------

    /// Accumulates in `f64` to limit drift on large vectors.
    pub fn sum_f64(&self, x: &[f32]) -> f64 {
        self.record(x.len());
        x.iter().map(|&v| v as f64).sum()
    }

    pub fn min(&self, x: &[f32]) -> f32 {
        self.record(x.len());
        x.iter().fold(f32::INFINITY, |acc, &v| acc.min(v))
    }

    pub fn max(&self, x: &[f32]) -> f32 {
        self.record(x.len());
        x.iter().fold(f32::NEG_INFINITY, |acc, &v| acc.max(v))
    }
}

fn binary_dispatch(
    level: SimdLevel,
    o: &mut [f32],
    x: &[f32],
    y: &[f32],
    scalar_op: impl Fn(f32, f32) -> f32,
    avx2_op: unsafe fn(&mut [f32], &[f32], &[f32]),
) {
    debug_assert_eq!(o.len(), x.len());
    debug_assert_eq!(o.len(), y.len());
    #[cfg(target_arch = "x86_64")]
    if level.has_avx2() {
        unsafe { avx2_op(o, x, y) };
        return;
    }
    let _ = level;
    for i in 0..o.len() {
        o[i] = scalar_op(x[i], y[i]);
    }
}

fn scalar_dispatch(o: &mut [f32], x: &[f32], s: f32, op: impl Fn(f32, f32) -> f32) {
    debug_assert_eq!(o.len(), x.len());
    for i in 0..o.len() {
        o[i] = op(x[i], s);
    }
}

fn unary_dispatch(
    level: SimdLevel,
    o: &mut [f32],
    x: &[f32],
    scalar_op: impl Fn(f32) -> f32,
    avx2_op: unsafe fn(&mut [f32], &[f32]),
) {
    debug_assert_eq!(o.len(), x.len());
    #[cfg(target_arch = "x86_64")]
    if level.has_avx2() {
        unsafe { avx2_op(o, x) };
        return;
    }
    let _ = level;
    for i in 0..o.len() {
        o[i] = scalar_op(x[i]);
    }
}

macro_rules! avx2_binary_fn {
    ($name:ident, $intrinsic:ident, $tail:expr) => {
        #[cfg(target_arch = "x86_64")]
        #[target_feature(enable = "avx2")]
        unsafe fn $name(o: &mut [f32], x: &[f32], y: &[f32]) {
            use std::arch::x86_64::*;
            let n = o.len();
            let lanes = n - n % 8;
            let mut i = 0;
            while i < lanes {
                let xv = _mm256_loadu_ps(x.as_ptr().add(i));
                let yv = _mm256_loadu_ps(y.as_ptr().add(i));
                let r = $intrinsic(xv, yv);
                _mm256_storeu_ps(o.as_mut_ptr().add(i), r);
                i += 8;
            }
            while i < n {
                o[i] = $tail(x[i], y[i]);
                i += 1;
            }
        }
    };
}

avx2_binary_fn!(avx2_add, _mm256_add_ps, |a: f32, b: f32| a + b);
avx2_binary_fn!(avx2_sub, _mm256_sub_ps, |a: f32, b: f32| a - b);
avx2_binary_fn!(avx2_mul, _mm256_mul_ps, |a: f32, b: f32| a * b);
avx2_binary_fn!(avx2_div, _mm256_div_ps, |a: f32, b: f32| a / b);

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_abs(o: &mut [f32], x: &[f32]) {
    use std::arch::x86_64::*;
    let n = o.len();
    let lanes = n - n % 8;
    let mask = _mm256_set1_ps(-0.0f32);
    let mut i = 0;
    while i < lanes {
        let xv = _mm256_loadu_ps(x.as_ptr().add(i));
        _mm256_storeu_ps(o.as_mut_ptr().add(i), _mm256_andnot_ps(mask, xv));
        i += 8;
    }
    while i < n {
        o[i] = x[i].abs();
        i += 1;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_neg(o: &mut [f32], x: &[f32]) {
    use std::arch::x86_64::*;
    let n = o.len();
    let lanes = n - n % 8;
    let zero = _mm256_setzero_ps();
    let mut i = 0;
    while i < lanes {
        let xv = _mm256_loadu_ps(x.as_ptr().add(i));
        _mm256_storeu_ps(o.as_mut_ptr().add(i), _mm256_sub_ps(zero, xv));
        i += 8;
    }
    while i < n {
        o[i] = -x[i];
        i += 1;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_sqr(o: &mut [f32], x: &[f32]) {
    use std::arch::x86_64::*;
    let n = o.len();
    let lanes = n - n % 8;
    let mut i = 0;
    while i < lanes {
        let xv = _mm256_loadu_ps(x.as_ptr().add(i));
        _mm256_storeu_ps(o.as_mut_ptr().add(i), _mm256_mul_ps(xv, xv));
        i += 8;
    }
    while i < n {
        o[i] = x[i] * x[i];
        i += 1;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_sqrt(o: &mut [f32], x: &[f32]) {
    use std::arch::x86_64::*;
    let n = o.len();
    let lanes = n - n % 8;
    let mut i = 0;
    while i < lanes {
        let xv = _mm256_loadu_ps(x.as_ptr().add(i));
        _mm256_storeu_ps(o.as_mut_ptr().add(i), _mm256_sqrt_ps(xv));
        i += 8;
    }
    while i < n {
        o[i] = x[i].sqrt();
        i += 1;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_relu(o: &mut [f32], x: &[f32]) {
    use std::arch::x86_64::*;
    let n = o.len();
    let lanes = n - n % 8;
    let zero = _mm256_setzero_ps();
    let mut i = 0;
    while i < lanes {
        let xv = _mm256_loadu_ps(x.as_ptr().add(i));
        _mm256_storeu_ps(o.as_mut_ptr().add(i), _mm256_max_ps(xv, zero));
        i += 8;
    }
    while i < n {
        o[i] = x[i].max(0.0);
        i += 1;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_step(o: &mut [f32], x: &[f32]) {
    use std::arch::x86_64::*;
    let n = o.len();
    let lanes = n - n % 8;
    let zero = _mm256_setzero_ps();
    let one = _mm256_set1_ps(1.0);
    let mut i = 0;
    while i < lanes {
        let xv = _mm256_loadu_ps(x.as_ptr().add(i));
        let ge = _mm256_cmp_ps(xv, zero, _CMP_GE_OQ);
        let r = _mm256_and_ps(ge, one);
        _mm256_storeu_ps(o.as_mut_ptr().add(i), r);
        i += 8;
    }
    while i < n {
        o[i] = if x[i] >= 0.0 { 1.0 } else { 0.0 };
        i += 1;
    }
}

/// Polynomial/bit-trick approximations for the transcendental kernels,
/// reproduced exactly (coefficients included) from the source this crate's
/// numeric contract descends from. Not regenerated from first principles —
/// tests compare against these documented bounds, not arbitrary precision.
mod approx {
    /// `exp(x)` via range reduction + degree-5 polynomial.
    /// Error ~1.45358 + 0.5 ulps. Saturates to `inf`/`0` outside
    /// `(-103.97, 88.38)`.
    pub fn exp_f32(x: f32) -> f32 {
        const LOG2E: f32 = f32::from_bits(0x3fb8aa3b); // 0x1.715476p+0
        const LN2_HI: f32 = f32::from_bits(0x3f317200); // 0x1.62e4p-1
        const LN2_LO: f32 = f32::from_bits(0x35bfbe8e); // 0x1.7f7d1cp-20
        const C0: f32 = f32::from_bits(0x3f7ffff6); // 0x1.ffffecp-1
        const C1: f32 = f32::from_bits(0x3efffdb6); // 0x1.fffdb6p-2
        const C2: f32 = f32::from_bits(0x3e2aaf33); // 0x1.555e66p-3
        const C3: f32 = f32::from_bits(0x3d2b9f17); // 0x1.573e2ep-5
        const C4: f32 = f32::from_bits(0x3c070201); // 0x1.0e4020p-7

        if x > 88.38 {
            return f32::INFINITY;
        }
        if x < -103.97 {
            return 0.0;
        }
        const R: f32 = 12582912.0; // 0x1.8p23
        let z = x.mul_add(LOG2E, R);
        let n = z - R;
        let b = x - n * LN2_HI - n * LN2_LO;
        let u = b * b;
        let j = C0 * b + u * (C1 + C2 * b + u * (C3 + C4 * b));
        let scale = 2f32.powi(n as i32);
        scale * (1.0 + j)
    }

    /// `tanh(x) = 2*sigmoid(2x) - 1`, built on [`exp_f32`].
    pub fn tanh_f32(x: f32) -> f32 {
        let e = exp_f32(-2.0 * x);
        let c = 1.0 + e;
        2.0 / c - 1.0
    }

    /// Mantissa/exponent-split `log(x)` for `x > 0`, degree-8 Cephes-style
    /// polynomial.
    pub fn log_f32(x: f32) -> f32 {
        const SQRTHF: f32 = 0.707_106_77;
        let bits = x.to_bits() as i32;
        let mut e = (bits >> 23) - 0x7f;
        let mantissa_bits = (bits & !0x7f80_0000u32 as i32) | (0.5f32.to_bits() as i32);
        let mut xi = f32::from_bits(mantissa_bits as u32);
        e += 1;
        let mut ef = e as f32;
        if xi < SQRTHF {
            ef -= 1.0;
            xi += xi - 1.0;
        } else {
            xi -= 1.0;
        }
        let z = xi * xi;
        let mut y = 7.037_683_6e-2;
        y = y * xi + -1.151_461e-1;
        y = y * xi + 1.167_699_9e-1;
        y = y * xi + -1.242_014e-1;
        y = y * xi + 1.424_932_3e-1;
        y = y * xi + -1.666_805_8e-1;
        y = y * xi + 2.000_071_5e-1;
        y = y * xi + -2.499_999_4e-1;
        y = y * xi + 3.333_331_2e-1;
        y *= xi * z;
        y += ef * -2.121_944_4e-4;
        y -= 0.5 * z;
        xi + y + ef * 0.693_359_38
    }

    /// Quadrant-reduction sin/cos pair, degree-5 polynomials.
    pub fn sincos_f32(x: f32) -> (f32, f32) {
        let sign_sin_neg = x < 0.0;
        let mut xa = x.abs();
        let y = xa * 1.273_239_5;
        let mut emm2 = y as i32 + 1;
        emm2 &= !1;
        let yf = emm2 as f32;
        let poly_branch = (emm2 & 2) != 0;
        xa += yf * -0.785_156_25;
        xa += yf * -2.418_756_5e-4;
        xa += yf * -3.774_895e-8;
        let sign_sin = sign_sin_neg ^ ((emm2 & 4) != 0);
        let sign_cos = ((emm2 - 2) & 4) != 0;
        let z = xa * xa;

        let y1a = 2.443_315_7e-5 * z + -1.388_731_6e-3;
        let y1b = y1a * z + 4.166_664_6e-2;
        let y2a = -1.951_529_6e-4 * z + 8.332_161e-3;
        let y2b = y2a * z + -1.666_665_5e-1;

        let mut y1 = y1b * z;
        let mut y2 = y2b * z;
        y1 *= z;
        y1 -= 0.5 * z;
        y2 = xa * y2 * xa + xa;
        y1 += 1.0;

        let (ys, yc) = if poly_branch { (y1, y2) } else { (y2, y1) };
        let sin = if sign_sin { -ys } else { ys };
        let cos = if sign_cos { yc } else { -yc };
        (sin, cos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(mode: MathMode) -> VectorEngine {
        VectorEngine::new(mode)
    }

    #[test]
    fn detect_level_reports_some_tier() {
        let level = SimdLevel::detect();
        assert!(level.lane_width_f32() >= 4);
    }

    #[test]
    fn add_matches_scalar_reference() {
        let e = engine(MathMode::Precise);
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let y = vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0];
        let mut o = vec![0.0; 9];
        e.add(&mut o, &x, &y);
        assert_eq!(o, vec![11.0, 22.0, 33.0, 44.0, 55.0, 66.0, 77.0, 88.0, 99.0]);
    }

    #[test]
    fn muls_scales_every_element() {
        let e = engine(MathMode::Precise);
        let x = vec![1.0, 2.0, 3.0];
        let mut o = vec![0.0; 3];
        e.muls(&mut o, &x, 2.5);
        assert_eq!(o, vec![2.5, 5.0, 7.5]);
    }

    #[test]
    fn relu_clamps_negatives() {
        let e = engine(MathMode::Precise);
        let x = vec![-1.0, 0.0, 1.0];
        let mut o = vec![0.0; 3];
        e.relu(&mut o, &x);
        assert_eq!(o, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn relu_dv_is_zero_at_and_below_zero() {
        let e = engine(MathMode::Precise);
        let x = vec![-1.0, 0.0, 1.0];
        let mut o = vec![0.0; 3];
        e.relu_dv(&mut o, &x);
        assert_eq!(o, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn sigmoid_dv_uses_output_convention() {
        let e = engine(MathMode::Precise);
        let s = vec![0.5, 0.25];
        let mut o = vec![0.0; 2];
        e.sigmoid_dv(&mut o, &s);
        assert_eq!(o, vec![0.25, 0.1875]);
    }

    #[test]
    fn softmax_dv_equals_softmax() {
        let e = engine(MathMode::Precise);
        let x = vec![0.0, 1.0, 2.0];
        let mut a = vec![0.0; 3];
        let mut b = vec![0.0; 3];
        e.softmax(&mut a, &x);
        e.softmax_dv(&mut b, &x);
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic]
    fn silu_dv_panics() {
        let e = engine(MathMode::Precise);
        let mut o = vec![0.0; 1];
        e.silu_dv(&mut o, &[1.0]);
    }

    #[test]
    #[should_panic]
    fn gelu_dv_panics() {
        let e = engine(MathMode::Precise);
        let mut o = vec![0.0; 1];
        e.gelu_dv(&mut o, &[1.0]);
    }

    #[test]
    fn sum_f64_accumulates_in_double_precision() {
        let e = engine(MathMode::Precise);
        let x = vec![1.0f32; 1000];
        assert_eq!(e.sum_f64(&x), 1000.0);
    }

    #[test]
    fn min_max_seed_with_infinities() {
        let e = engine(MathMode::Precise);
        let x = vec![3.0, -1.0, 4.0, -5.0];
        assert_eq!(e.min(&x), -5.0);
        assert_eq!(e.max(&x), 4.0);
    }

    #[test]
    fn approx_exp_matches_std_within_documented_bound() {
        for &v in &[-5.0f32, -1.0, 0.0, 1.0, 5.0, 10.0] {
            let approx = approx::exp_f32(v);
            let exact = v.exp();
            let ulp_bound = exact * 4e-6 + 1e-6;
            assert!(
                (approx - exact).abs() <= ulp_bound,
                "exp({v}) approx={approx} exact={exact}"
            );
        }
    }

    #[test]
    fn approx_exp_saturates_outside_bounds() {
        assert_eq!(approx::exp_f32(200.0), f32::INFINITY);
        assert_eq!(approx::exp_f32(-200.0), 0.0);
    }

    #[test]
    fn approx_log_matches_std_within_documented_bound() {
        for &v in &[0.1f32, 0.5, 1.0, 2.0, 10.0, 100.0] {
            let approx = approx::log_f32(v);
            let exact = v.ln();
            assert!((approx - exact).abs() < 1e-5, "log({v}) approx={approx} exact={exact}");
        }
    }

    #[test]
    fn gelu_uses_exact_coefficient() {
        let e = engine(MathMode::Precise);
        let mut o = vec![0.0; 1];
        e.gelu(&mut o, &[1.0]);
        let expected = 0.5 * (1.0 + (0.797_884_56_f32 * (1.0 + 0.044715)).tanh());
        assert!((o[0] - expected).abs() < 1e-5);
    }
}
