//! Scalar normalization helpers shared by the engine and its observers.

/// Default epsilon added to denominators by [`safe_div`].
pub const DIV_EPS: f64 = 1e-12;

/// Clamp `x` into `[0, 1]`.
///
/// NaN carries no usable signal and maps to `0.0`, so every value that leaves
/// this function lies in the unit interval.
#[must_use]
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}

/// `a / (b + DIV_EPS)`. Never divides by exact zero; the result is not bounded.
#[must_use]
pub fn safe_div(a: f64, b: f64) -> f64 {
    safe_div_eps(a, b, DIV_EPS)
}

/// `a / (b + eps)` with an explicit epsilon.
#[must_use]
pub fn safe_div_eps(a: f64, b: f64, eps: f64) -> f64 {
    a / (b + eps)
}
