//! Small numeric helpers shared across stages.

use std::f64::consts::PI;

/// Pearson product-moment correlation coefficient of two equal-length samples.
///
/// Returns `None` when the samples differ in length, hold fewer than two
/// values, or either sample has zero variance.
pub fn pearson_corr(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(cov / denom)
}

/// Pearson correlation with per-sample weights.
///
/// Returns `None` on length mismatch, non-positive total weight, or when
/// either weighted variance vanishes.
pub fn weighted_pearson_corr(a: &[f64], b: &[f64], weights: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() != weights.len() || a.len() < 2 {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    let mean_a = a.iter().zip(weights).map(|(x, w)| x * w).sum::<f64>() / total;
    let mean_b = b.iter().zip(weights).map(|(y, w)| y * w).sum::<f64>() / total;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for ((&x, &y), &w) in a.iter().zip(b).zip(weights) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += w * da * db;
        var_a += w * da * da;
        var_b += w * db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(cov / denom)
}

/// Wraps an angle in radians into `[0, period)`.
pub(crate) fn wrap_angle(angle: f64, period: f64) -> f64 {
    let wrapped = angle.rem_euclid(period);
    if wrapped >= period {
        0.0
    } else {
        wrapped
    }
}

/// Smallest difference between two axis angles (period `π`).
pub(crate) fn axis_angle_diff(a: f64, b: f64) -> f64 {
    let d = wrap_angle(a - b, PI);
    d.min(PI - d)
}

/// Converts a circular index into a signed offset centred on zero.
#[inline]
pub(crate) fn centered_index(index: usize, len: usize) -> isize {
    if index > len / 2 {
        index as isize - len as isize
    } else {
        index as isize
    }
}

/// Reflect-101 border index (`-1 -> 1`, `len -> len - 2`).
#[inline]
pub(crate) fn reflect101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = index.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}
