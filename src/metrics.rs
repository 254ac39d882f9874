//! Portfolio return, risk and Sharpe ratio for a given weight vector.

use crate::stats::Estimates;
use serde::Serialize;

/// Sharpe value assigned when risk is zero and the ratio is undefined. It
/// loses against any finite Sharpe but can still fill an empty slot.
pub const UNDEFINED_SHARPE: f64 = f64::NEG_INFINITY;

pub fn expected_return(weights: &[f64], means: &[f64]) -> f64 {
    debug_assert_eq!(weights.len(), means.len());
    weights.iter().zip(means.iter()).map(|(w, r)| w * r).sum()
}

pub fn variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    debug_assert_eq!(weights.len(), cov.len());
    let n = weights.len();
    let mut var = 0.0;
    for i in 0..n {
        for j in 0..n {
            var += weights[i] * weights[j] * cov[i][j];
        }
    }
    var
}

/// Standard deviation of the portfolio. Negative variance from rounding is
/// clamped to zero; NaN is passed through rather than hidden.
pub fn risk(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let var = variance(weights, cov);
    if var < 0.0 { 0.0 } else { var.sqrt() }
}

/// `(ret - risk_free_rate) / risk`, or [`UNDEFINED_SHARPE`] when risk is not
/// strictly positive.
pub fn sharpe_ratio(ret: f64, risk: f64, risk_free_rate: f64) -> f64 {
    if risk > 0.0 {
        (ret - risk_free_rate) / risk
    } else {
        UNDEFINED_SHARPE
    }
}

/// The three metrics of one weight vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Metrics {
    #[serde(rename = "return")]
    pub ret: f64,
    pub risk: f64,
    pub sharpe: f64,
}

impl Metrics {
    pub fn sharpe_is_defined(&self) -> bool {
        self.sharpe.is_finite()
    }
}

pub fn evaluate(weights: &[f64], estimates: &Estimates, risk_free_rate: f64) -> Metrics {
    let ret = expected_return(weights, &estimates.means);
    let risk = risk(weights, &estimates.cov);
    Metrics {
        ret,
        risk,
        sharpe: sharpe_ratio(ret, risk, risk_free_rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_return_is_weighted_sum() {
        let r = expected_return(&[0.5, 0.25, 0.25], &[0.10, 0.20, -0.04]);
        assert!((r - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_variance_matches_quadratic_form() {
        let cov = vec![vec![0.04, 0.01], vec![0.01, 0.09]];
        let w = [0.6, 0.4];
        let expected = 0.36 * 0.04 + 2.0 * 0.24 * 0.01 + 0.16 * 0.09;
        assert!((variance(&w, &cov) - expected).abs() < 1e-12);
        assert!((risk(&w, &cov) - expected.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_negative_variance_is_clamped() {
        // Not PSD: a rounding-sized negative quadratic form.
        let cov = vec![vec![1e-18, -2e-18], vec![-2e-18, 1e-18]];
        let w = [0.5, 0.5];
        assert!(variance(&w, &cov) < 0.0);
        let r = risk(&w, &cov);
        assert_eq!(r, 0.0);
        assert!(!r.is_nan());
    }

    #[test]
    fn test_nan_variance_is_not_masked_as_zero_risk() {
        let cov = vec![vec![f64::INFINITY, 0.0], vec![0.0, f64::NEG_INFINITY]];
        assert!(risk(&[0.5, 0.5], &cov).is_nan());
    }

    #[test]
    fn test_sharpe_ratio() {
        assert!((sharpe_ratio(0.11, 0.2, 0.01) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_risk_sharpe_is_sentinel_not_nan() {
        let s = sharpe_ratio(0.05, 0.0, 0.01);
        assert_eq!(s, UNDEFINED_SHARPE);
        assert!(!s.is_nan());
        // Also when the excess return is zero (0/0).
        assert_eq!(sharpe_ratio(0.01, 0.0, 0.01), UNDEFINED_SHARPE);
    }

    #[test]
    fn test_evaluate_single_instrument() {
        let est = Estimates {
            means: vec![0.12],
            cov: vec![vec![0.0]],
            observations: 3,
            periods_per_year: 252.0,
        };
        let m = evaluate(&[1.0], &est, 0.01);
        assert!((m.ret - 0.12).abs() < 1e-12);
        assert_eq!(m.risk, 0.0);
        assert!(!m.sharpe_is_defined());
    }
}
