//! Spline With Inversion (SWI) quantile smoothing.
//!
//! Fits a clamped cubic spline to the empirical CDF defined by sparse
//! (quantile, probability) samples, resamples it densely, and numerically
//! inverts it to produce a smoother quantile function on a uniform
//! probability grid.

use ndarray::Array1;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of points for dense CDF evaluation (M1).
pub const DEFAULT_INTERP_POINTS: usize = 1000;
/// Number of uniformly spaced probabilities to estimate quantiles at (M2).
pub const DEFAULT_QUANTILE_POINTS: usize = 501;

const JITTER_EPS: f64 = 1e-5;

#[derive(Debug, Error)]
enum SplineError {
    #[error("at least two points are required for a spline fit")]
    TooFewPoints,
    #[error("quantile values must be strictly increasing")]
    NotStrictlyIncreasing,
    #[error("non-finite value in spline input")]
    NonFinite,
    #[error("singular tridiagonal system")]
    Singular,
}

/// A smoothed quantile curve: `quantiles[i]` is the estimated quantile at
/// cumulative probability `probs[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedQuantiles {
    pub quantiles: Vec<f64>,
    pub probs: Vec<f64>,
}

/// Outcome of a smoothing attempt.
///
/// The degraded case returns an all-zero quantile curve instead of erroring,
/// for compatibility with downstream aggregation; it is modeled as an explicit
/// variant so callers can detect silent data loss.
#[derive(Debug, Clone, PartialEq)]
pub enum SmoothingOutcome {
    /// The spline fit succeeded on the raw input.
    Smoothed(SmoothedQuantiles),
    /// The raw input was not strictly increasing; an epsilon-jitter pass made
    /// it so and the retry succeeded.
    JitteredAndSmoothed(SmoothedQuantiles),
    /// Both attempts failed; quantiles are all zero.
    DegradedZero(SmoothedQuantiles),
}

impl SmoothingOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SmoothingOutcome::DegradedZero(_))
    }

    pub fn inner(&self) -> &SmoothedQuantiles {
        match self {
            SmoothingOutcome::Smoothed(s)
            | SmoothingOutcome::JitteredAndSmoothed(s)
            | SmoothingOutcome::DegradedZero(s) => s,
        }
    }

    pub fn into_inner(self) -> SmoothedQuantiles {
        match self {
            SmoothingOutcome::Smoothed(s)
            | SmoothingOutcome::JitteredAndSmoothed(s)
            | SmoothingOutcome::DegradedZero(s) => s,
        }
    }
}

/// Smooth a sparse quantile function with the default resolution
/// (M1 = 1000 interpolation points, M2 = 501 output probabilities).
///
/// `quantiles` and `probs` must be sorted ascending by probability, with
/// `probs` spanning approximately [0, 1].
pub fn smooth(quantiles: &[f64], probs: &[f64]) -> SmoothingOutcome {
    smooth_with_resolution(quantiles, probs, DEFAULT_INTERP_POINTS, DEFAULT_QUANTILE_POINTS)
}

pub fn smooth_with_resolution(
    quantiles: &[f64],
    probs: &[f64],
    m1: usize,
    m2: usize,
) -> SmoothingOutcome {
    let probs_new = Array1::linspace(0.0, 1.0, m2).to_vec();

    if quantiles.len() != probs.len() || quantiles.len() < 2 {
        warn!(
            points = quantiles.len(),
            "quantile smoothing input too small or mismatched; returning degraded zero quantiles"
        );
        return SmoothingOutcome::DegradedZero(SmoothedQuantiles {
            quantiles: vec![0.0; m2],
            probs: probs_new,
        });
    }

    match spline_inversion(quantiles, probs, m1, &probs_new) {
        Ok(smoothed) => SmoothingOutcome::Smoothed(SmoothedQuantiles {
            quantiles: smoothed,
            probs: probs_new,
        }),
        Err(e) => {
            debug!("cubic spline failed: {e}; retrying with jittered quantiles");
            let jittered = jitter_nonincreasing(quantiles, JITTER_EPS);
            match spline_inversion(&jittered, probs, m1, &probs_new) {
                Ok(smoothed) => SmoothingOutcome::JitteredAndSmoothed(SmoothedQuantiles {
                    quantiles: smoothed,
                    probs: probs_new,
                }),
                Err(e2) => {
                    warn!("cubic spline failed after jittering: {e2}; returning degraded zero quantiles");
                    SmoothingOutcome::DegradedZero(SmoothedQuantiles {
                        quantiles: vec![0.0; m2],
                        probs: probs_new,
                    })
                }
            }
        }
    }
}

/// Make `q` strictly increasing by bumping any element that is <= its
/// predecessor by a tiny epsilon. Long flat runs become a tiny staircase;
/// non-finite values are skipped unchanged.
pub fn jitter_nonincreasing(q: &[f64], eps: f64) -> Vec<f64> {
    let mut out = q.to_vec();
    for i in 1..out.len() {
        if !out[i].is_finite() || !out[i - 1].is_finite() {
            continue;
        }
        if out[i] <= out[i - 1] {
            out[i] = out[i - 1] + eps;
        }
    }
    out
}

/// Fit F(q) = P(X <= q), sample it densely, and invert to Q(p) at the target
/// probabilities.
fn spline_inversion(
    q: &[f64],
    p: &[f64],
    m1: usize,
    targets: &[f64],
) -> Result<Vec<f64>, SplineError> {
    let n = q.len();
    if n < 2 {
        return Err(SplineError::TooFewPoints);
    }

    // Approximate endpoint derivatives by finite difference.
    let dy_start = (p[1] - p[0]) / (q[1] - q[0]);
    let dy_end = (p[n - 1] - p[n - 2]) / (q[n - 1] - q[n - 2]);
    if !dy_start.is_finite() || !dy_end.is_finite() {
        return Err(SplineError::NonFinite);
    }

    let spline = ClampedCubicSpline::fit(q, p, dy_start, dy_end)?;

    let x_smooth = Array1::linspace(q[0], q[n - 1], m1).to_vec();
    let y_smooth: Vec<f64> = x_smooth.iter().map(|&t| spline.eval(t)).collect();

    Ok(find_inverse(&x_smooth, &y_smooth, targets))
}

/// Nearest-neighbor inversion: for each target y, the x whose smoothed y is
/// closest in absolute difference.
fn find_inverse(x_smooth: &[f64], y_smooth: &[f64], targets: &[f64]) -> Vec<f64> {
    targets
        .iter()
        .map(|&target| {
            let mut best = 0;
            let mut best_diff = f64::INFINITY;
            for (j, &y) in y_smooth.iter().enumerate() {
                let diff = (y - target).abs();
                if diff < best_diff {
                    best_diff = diff;
                    best = j;
                }
            }
            x_smooth[best]
        })
        .collect()
}

/// Cubic spline with clamped (first-derivative) boundary conditions.
struct ClampedCubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    h: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl ClampedCubicSpline {
    fn fit(x: &[f64], y: &[f64], dy_start: f64, dy_end: f64) -> Result<Self, SplineError> {
        let n = x.len();
        if n < 2 {
            return Err(SplineError::TooFewPoints);
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(SplineError::NonFinite);
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SplineError::NotStrictlyIncreasing);
        }

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

        // Tridiagonal system in the knot second derivatives, with the clamped
        // endpoint rows carrying the prescribed first derivatives.
        let mut sub = vec![0.0; n];
        let mut diag = vec![0.0; n];
        let mut sup = vec![0.0; n];
        let mut rhs = vec![0.0; n];

        diag[0] = 2.0 * h[0];
        sup[0] = h[0];
        rhs[0] = 6.0 * ((y[1] - y[0]) / h[0] - dy_start);

        for i in 1..n - 1 {
            sub[i] = h[i - 1];
            diag[i] = 2.0 * (h[i - 1] + h[i]);
            sup[i] = h[i];
            rhs[i] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
        }

        sub[n - 1] = h[n - 2];
        diag[n - 1] = 2.0 * h[n - 2];
        rhs[n - 1] = 6.0 * (dy_end - (y[n - 1] - y[n - 2]) / h[n - 2]);

        let m = solve_tridiagonal(&sub, &diag, &sup, &rhs)?;

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            h,
            m,
        })
    }

    fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        let i = match self.x.partition_point(|&xi| xi <= t) {
            0 => 0,
            p if p >= n => n - 2,
            p => p - 1,
        };

        let h = self.h[i];
        let a = self.x[i + 1] - t;
        let b = t - self.x[i];
        (self.m[i] * a.powi(3) + self.m[i + 1] * b.powi(3)) / (6.0 * h)
            + (self.y[i] / h - self.m[i] * h / 6.0) * a
            + (self.y[i + 1] / h - self.m[i + 1] * h / 6.0) * b
    }
}

/// Thomas algorithm. The spline system is diagonally dominant, so the forward
/// sweep only fails on degenerate spacing.
fn solve_tridiagonal(
    sub: &[f64],
    diag: &[f64],
    sup: &[f64],
    rhs: &[f64],
) -> Result<Vec<f64>, SplineError> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];

    let mut beta = diag[0];
    if beta.abs() < f64::EPSILON {
        return Err(SplineError::Singular);
    }
    c[0] = sup[0] / beta;
    d[0] = rhs[0] / beta;

    for i in 1..n {
        beta = diag[i] - sub[i] * c[i - 1];
        if beta.abs() < f64::EPSILON {
            return Err(SplineError::Singular);
        }
        if i < n - 1 {
            c[i] = sup[i] / beta;
        }
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / beta;
    }

    for i in (0..n - 1).rev() {
        let next = d[i + 1];
        d[i] -= c[i] * next;
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn jitter_turns_flat_run_into_staircase() {
        let q = [3.02, 3.02, 3.02, 3.05];
        let fixed = jitter_nonincreasing(&q, 1e-5);
        assert_relative_eq!(fixed[0], 3.02);
        assert_relative_eq!(fixed[1], 3.02001);
        assert_relative_eq!(fixed[2], 3.02002);
        assert_relative_eq!(fixed[3], 3.05);
        assert!(fixed.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn jitter_skips_non_finite_values() {
        let q = [1.0, f64::NAN, 1.0];
        let fixed = jitter_nonincreasing(&q, 1e-5);
        assert_relative_eq!(fixed[0], 1.0);
        assert!(fixed[1].is_nan());
        assert_relative_eq!(fixed[2], 1.0);
    }

    #[test]
    fn well_behaved_input_smooths_cleanly() {
        let quantiles = [2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 11.0];
        let probs = [0.0, 0.15, 0.35, 0.55, 0.75, 0.9, 1.0];
        let outcome = smooth(&quantiles, &probs);

        let smoothed = match &outcome {
            SmoothingOutcome::Smoothed(s) => s,
            other => panic!("expected clean smoothing, got {:?}", other),
        };
        assert_eq!(smoothed.probs.len(), DEFAULT_QUANTILE_POINTS);
        assert_eq!(smoothed.quantiles.len(), DEFAULT_QUANTILE_POINTS);
        assert_relative_eq!(smoothed.probs[0], 0.0);
        assert_relative_eq!(smoothed.probs[DEFAULT_QUANTILE_POINTS - 1], 1.0);
        assert!(smoothed.quantiles.iter().all(|q| q.is_finite()));
        // Inversion picks from the dense grid, so estimates stay in range.
        assert!(smoothed.quantiles.iter().all(|&q| (2.0..=11.0).contains(&q)));
    }

    #[test]
    fn tied_quantiles_take_the_jitter_path() {
        let quantiles = [3.02, 3.02, 3.02, 3.05];
        let probs = [0.0, 0.3, 0.6, 1.0];
        let outcome = smooth(&quantiles, &probs);
        assert!(matches!(outcome, SmoothingOutcome::JitteredAndSmoothed(_)));
        assert!(outcome.inner().quantiles.iter().all(|q| q.is_finite()));
    }

    #[test]
    fn pathological_input_degrades_to_zeros() {
        let quantiles = [1.0, f64::NAN, 2.0];
        let probs = [0.0, 0.5, 1.0];
        let outcome = smooth(&quantiles, &probs);
        assert!(outcome.is_degraded());
        let inner = outcome.inner();
        assert_eq!(inner.quantiles.len(), DEFAULT_QUANTILE_POINTS);
        assert!(inner.quantiles.iter().all(|&q| q == 0.0));
        assert_relative_eq!(inner.probs[0], 0.0);
        assert_relative_eq!(inner.probs[DEFAULT_QUANTILE_POINTS - 1], 1.0);
    }

    #[test]
    fn too_few_points_degrade_to_zeros() {
        let outcome = smooth(&[5.0], &[1.0]);
        assert!(outcome.is_degraded());
    }

    #[test]
    fn smoothing_is_near_idempotent_on_dense_input() {
        // An already-dense linear CDF should pass through nearly unchanged.
        let quantiles = Array1::linspace(2.0, 10.0, 501).to_vec();
        let probs = Array1::linspace(0.0, 1.0, 501).to_vec();
        let outcome = smooth(&quantiles, &probs);
        let smoothed = outcome.into_inner();

        let max_diff = smoothed
            .quantiles
            .iter()
            .zip(quantiles.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        assert!(max_diff < 0.05, "max deviation {} too large", max_diff);
    }
}
