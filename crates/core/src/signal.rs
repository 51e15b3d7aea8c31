//! Pure numeric utilities for trajectory processing.
//!
//! Everything here operates on `(n x d)` series represented as
//! `&[Vec<f64>]` (one row per sample). These routines are deterministic
//! and allocation-light; they carry no I/O.

use nalgebra::{DMatrix, Quaternion, UnitQuaternion, Vector3};

/// Resample an `(n x d)` series to exactly `target` rows.
///
/// If `n <= target` the series is padded by edge replication (the last
/// row is repeated). Otherwise rows are linearly interpolated at `target`
/// evenly spaced positions in `[0, n-1]`. Resampling a `target`-row series
/// is the identity, which gives the round-trip property
/// `resample(resample(x, N), N) == resample(x, N)`.
pub fn resample(series: &[Vec<f64>], target: usize) -> Vec<Vec<f64>> {
    let n = series.len();
    if n == 0 || target == 0 {
        return Vec::new();
    }

    if n <= target {
        let mut out = series.to_vec();
        let last = out[n - 1].clone();
        out.resize(target, last);
        return out;
    }

    let step = (n - 1) as f64 / (target - 1) as f64;
    (0..target)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            series[lo]
                .iter()
                .zip(&series[hi])
                .map(|(a, b)| a + (b - a) * frac)
                .collect()
        })
        .collect()
}

/// L2-normalize in place. Returns false (leaving the slice untouched)
/// when the norm is zero or non-finite.
pub fn l2_normalize_in_place(values: &mut [f64]) -> bool {
    let sum: f64 = values.iter().map(|v| v * v).sum();
    if !sum.is_finite() || sum <= 0.0 {
        return false;
    }
    let norm = sum.sqrt();
    for v in values.iter_mut() {
        *v /= norm;
    }
    true
}

/// Flatten, L2-normalize, and narrow to `f32`.
///
/// Returns `None` for a degenerate (zero or non-finite) flattened vector;
/// a stored embedding is either unit-norm or absent.
pub fn unit_f32(series: &[Vec<f64>]) -> Option<Vec<f32>> {
    let mut flat: Vec<f64> = series.iter().flatten().copied().collect();
    if flat.is_empty() || !l2_normalize_in_place(&mut flat) {
        return None;
    }
    Some(flat.into_iter().map(|v| v as f32).collect())
}

/// Euclidean distance between two equal-length vectors.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Convert a quaternion `(x, y, z, w)` to its rotation vector
/// (axis scaled by angle).
pub fn quat_to_rotvec(x: f64, y: f64, z: f64, w: f64) -> [f64; 3] {
    let q = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
    let rv: Vector3<f64> = q.scaled_axis();
    [rv.x, rv.y, rv.z]
}

// ---------------------------------------------------------------------------
// Savitzky-Golay smoothing
// ---------------------------------------------------------------------------

/// Effective Savitzky-Golay window for a series of length `n`:
/// `min(33, n)` forced odd, or `None` when fewer than 5 samples are
/// available (too short to smooth).
pub fn savgol_window(n: usize) -> Option<usize> {
    let mut w = n.min(33);
    if w % 2 == 0 {
        w -= 1;
    }
    if w < 5 {
        None
    } else {
        Some(w)
    }
}

/// Smooth each column of an `(n x d)` series with a Savitzky-Golay filter.
///
/// The window is `savgol_window(n)`; series too short to smooth are
/// returned unchanged. Edges are handled by replicating the first/last
/// sample before convolution.
pub fn savgol_smooth(series: &[Vec<f64>], order: usize) -> Vec<Vec<f64>> {
    let n = series.len();
    let Some(window) = savgol_window(n) else {
        return series.to_vec();
    };
    if window <= order {
        return series.to_vec();
    }

    let coeffs = savgol_coeffs(window, order);
    let half = window / 2;
    let d = series.first().map(|r| r.len()).unwrap_or(0);

    let mut out = vec![vec![0.0; d]; n];
    for (i, row) in out.iter_mut().enumerate() {
        for (k, c) in coeffs.iter().enumerate() {
            // Edge replication: clamp the tap index into range.
            let idx = (i + k).saturating_sub(half).min(n - 1);
            for (dst, src) in row.iter_mut().zip(&series[idx]) {
                *dst += c * src;
            }
        }
    }
    out
}

/// Central-point Savitzky-Golay convolution coefficients for the given
/// odd `window` and polynomial `order`, via the least-squares normal
/// equations `c = e0^T (A^T A)^-1 A^T`.
fn savgol_coeffs(window: usize, order: usize) -> Vec<f64> {
    let half = (window / 2) as i64;
    let a = DMatrix::from_fn(window, order + 1, |i, j| {
        ((i as i64 - half) as f64).powi(j as i32)
    });
    let ata = a.transpose() * &a;
    let inv = ata
        .try_inverse()
        .unwrap_or_else(|| DMatrix::identity(order + 1, order + 1));
    let pinv = inv * a.transpose();
    pinv.row(0).iter().copied().collect()
}

/// Finite-difference derivative of each column against a normalized time
/// axis `linspace(0, 1, n)`: central differences inside, one-sided at the
/// boundaries (the `numpy.gradient` scheme).
pub fn gradient_unit_time(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = series.len();
    if n < 2 {
        return series.to_vec();
    }
    let dt = 1.0 / (n - 1) as f64;
    (0..n)
        .map(|i| {
            let (lo, hi, span) = if i == 0 {
                (0, 1, dt)
            } else if i == n - 1 {
                (n - 2, n - 1, dt)
            } else {
                (i - 1, i + 1, 2.0 * dt)
            };
            series[lo]
                .iter()
                .zip(&series[hi])
                .map(|(a, b)| (b - a) / span)
                .collect()
        })
        .collect()
}
