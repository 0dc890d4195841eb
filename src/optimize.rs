//! Closed-form mean-variance solver for a single asset bucket.
//!
//! Maximizes `mu'w - (lambda/2) w'Sigma w` subject to `1'w = 1`, then enforces
//! long-only by clipping negatives and renormalizing. The clip is an
//! approximation, not the constrained optimum; outputs are always finite,
//! non-negative and sum to ~1.

use crate::error::{Result, ValidationError};
use crate::linalg::{CovarianceMatrix, dot, mat_vec_mul};

/// Ridge added to the covariance diagonal before inversion.
pub const RIDGE: f64 = 1e-8;

/// Weights whose total falls at or below this are replaced by equal weights.
const DEGENERATE_SUM: f64 = 1e-12;

/// Solve one bucket.
///
/// With `A = Sigma^-1 1`, `B = Sigma^-1 mu`, `a = 1'A`, `b = 1'B`:
/// `nu = (b - lambda) / a` and `w = (B - nu A) / lambda`. `Sigma^-1` is the
/// pseudo-inverse of `Sigma + 1e-8 I` so singular inputs still produce weights.
///
/// An empty bucket yields an empty weight vector.
pub fn solve_bucket(
    expected_returns: &[f64],
    covariance: &CovarianceMatrix,
    risk_aversion: f64,
) -> Result<Vec<f64>> {
    if !risk_aversion.is_finite() || risk_aversion <= 0.0 {
        return Err(ValidationError::NonPositiveRiskAversion(risk_aversion));
    }
    let n = expected_returns.len();
    if covariance.dim() != n {
        return Err(ValidationError::DimensionMismatch {
            what: "bucket covariance",
            expected: n,
            actual: covariance.dim(),
        });
    }
    if expected_returns.iter().any(|m| !m.is_finite()) {
        return Err(ValidationError::NonFiniteInput("expected returns"));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let inv = covariance.regularized(RIDGE).pseudo_inverse();
    let ones = vec![1.0; n];
    let a_vec = mat_vec_mul(&inv, &ones);
    let b_vec = mat_vec_mul(&inv, expected_returns);
    let a = dot(&ones, &a_vec);
    let b = dot(&ones, &b_vec);
    let nu = (b - risk_aversion) / (a + DEGENERATE_SUM);

    let raw: Vec<f64> = b_vec
        .iter()
        .zip(&a_vec)
        .map(|(bi, ai)| (bi - nu * ai) / risk_aversion)
        .collect();

    Ok(normalize_long_only(raw))
}

/// Clip to non-negative, then rescale to sum to 1 (uniform if nothing is left).
pub fn normalize_long_only(mut w: Vec<f64>) -> Vec<f64> {
    if w.is_empty() {
        return w;
    }

    for x in &mut w {
        if !x.is_finite() || *x < 0.0 {
            *x = 0.0;
        }
    }

    let sum = w.iter().sum::<f64>();
    if sum <= DEGENERATE_SUM {
        return equal_weights(w.len());
    }

    for x in &mut w {
        *x /= sum;
    }
    w
}

fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid_weights(w: &[f64], n: usize) {
        assert_eq!(w.len(), n);
        assert!(w.iter().all(|x| x.is_finite() && *x >= 0.0));
        let s: f64 = w.iter().sum();
        assert!((s - 1.0).abs() < 1e-9, "sum={s}");
    }

    fn equity_cov() -> CovarianceMatrix {
        CovarianceMatrix::new(vec![
            vec![0.036100, 0.024320, 0.036480],
            vec![0.024320, 0.025600, 0.030720],
            vec![0.036480, 0.030720, 0.057600],
        ])
        .unwrap()
    }

    #[test]
    fn weights_are_valid() {
        let w = solve_bucket(&[0.075, 0.070, 0.085], &equity_cov(), 1.0).unwrap();
        assert_valid_weights(&w, 3);
    }

    #[test]
    fn two_uncorrelated_assets_closed_form() {
        // Sigma = diag(0.04, 0.01), mu = (0.10, 0.05), lambda = 2.
        // invSigma = diag(25, 100); A = (25, 100), B = (2.5, 5)
        // a = 125, b = 7.5, nu = (7.5 - 2) / 125 = 0.044
        // w = ((2.5 - 1.1) / 2, (5 - 4.4) / 2) = (0.7, 0.3)
        let cov = CovarianceMatrix::diagonal(&[0.04, 0.01]).unwrap();
        let w = solve_bucket(&[0.10, 0.05], &cov, 2.0).unwrap();
        assert!((w[0] - 0.7).abs() < 1e-6, "w={w:?}");
        assert!((w[1] - 0.3).abs() < 1e-6, "w={w:?}");
    }

    #[test]
    fn negative_weights_are_clipped() {
        // A dominated asset with low return and high variance gets shorted by
        // the unconstrained solution; the clip removes it.
        let cov = CovarianceMatrix::diagonal(&[0.01, 0.09]).unwrap();
        let w = solve_bucket(&[0.10, -0.20], &cov, 1.0).unwrap();
        assert_valid_weights(&w, 2);
        assert_eq!(w[1], 0.0);
        assert!((w[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn equal_returns_flat_covariance_is_uniform() {
        let cov = CovarianceMatrix::new(vec![vec![0.0; 4]; 4]).unwrap();
        let w = solve_bucket(&[0.05; 4], &cov, 3.0).unwrap();
        for x in &w {
            assert!((x - 0.25).abs() < 1e-6, "w={w:?}");
        }
    }

    #[test]
    fn equal_returns_identical_assets_is_uniform() {
        let cov = CovarianceMatrix::new(vec![vec![0.04; 3]; 3]).unwrap();
        let w = solve_bucket(&[0.06; 3], &cov, 5.0).unwrap();
        for x in &w {
            assert!((x - 1.0 / 3.0).abs() < 1e-6, "w={w:?}");
        }
    }

    #[test]
    fn single_asset_gets_everything() {
        let cov = CovarianceMatrix::diagonal(&[0.02]).unwrap();
        let w = solve_bucket(&[0.07], &cov, 10.0).unwrap();
        assert_eq!(w, vec![1.0]);
    }

    #[test]
    fn empty_bucket_is_empty() {
        let cov = CovarianceMatrix::new(Vec::new()).unwrap();
        assert!(solve_bucket(&[], &cov, 1.0).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_positive_lambda() {
        let cov = CovarianceMatrix::diagonal(&[0.02]).unwrap();
        assert_eq!(
            solve_bucket(&[0.07], &cov, 0.0),
            Err(ValidationError::NonPositiveRiskAversion(0.0))
        );
        assert!(solve_bucket(&[0.07], &cov, -1.0).is_err());
        assert!(solve_bucket(&[0.07], &cov, f64::NAN).is_err());
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let err = solve_bucket(&[0.07, 0.05], &equity_cov(), 1.0).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn higher_lambda_shifts_toward_low_variance() {
        let cov = CovarianceMatrix::diagonal(&[0.04, 0.01]).unwrap();
        let aggressive = solve_bucket(&[0.10, 0.05], &cov, 1.0).unwrap();
        let conservative = solve_bucket(&[0.10, 0.05], &cov, 20.0).unwrap();
        assert!(conservative[1] > aggressive[1]);
    }

    #[test]
    fn normalize_handles_all_negative() {
        let w = normalize_long_only(vec![-1.0, -2.0]);
        assert_eq!(w, vec![0.5, 0.5]);
    }

    #[test]
    fn normalize_handles_nan() {
        let w = normalize_long_only(vec![f64::NAN, 1.0]);
        assert_eq!(w, vec![0.0, 1.0]);
    }
}
