use crate::data::PriceTable;
use crate::error::{OptimizerError, Result};
use serde::Serialize;

/// Simple daily returns, one row fewer than the price table.
#[derive(Clone, Debug)]
pub struct ReturnTable {
    rows: Vec<Vec<f64>>, // [day][instrument]
    num_instruments: usize,
}

impl ReturnTable {
    /// `r[t][i] = (p[t+1][i] - p[t][i]) / p[t][i]`. Fails on fewer than two
    /// days or when a return overflows.
    pub fn from_prices(prices: &PriceTable) -> Result<Self> {
        let days = prices.num_days();
        if days < 2 {
            return Err(OptimizerError::insufficient_data(2, days));
        }

        let rows = prices
            .rows()
            .windows(2)
            .enumerate()
            .map(|(day, w)| {
                w[0].iter()
                    .zip(w[1].iter())
                    .enumerate()
                    .map(|(instrument, (&prev, &next))| {
                        let ret = (next - prev) / prev;
                        if ret.is_finite() {
                            Ok(ret)
                        } else {
                            Err(OptimizerError::NonFiniteReturn { day, instrument })
                        }
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rows,
            num_instruments: prices.num_instruments(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    fn column(&self, i: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[i])
    }
}

/// Mean return vector and return covariance matrix.
#[derive(Clone, Debug, Serialize)]
pub struct Estimates {
    pub means: Vec<f64>,
    pub cov: Vec<Vec<f64>>,
    /// Number of return observations behind the estimates.
    pub observations: usize,
    /// Scale applied to the daily statistics (1.0 when not annualized).
    pub periods_per_year: f64,
}

impl Estimates {
    /// Daily estimates straight from a price table.
    pub fn from_prices(prices: &PriceTable) -> Result<Self> {
        Self::from_returns(&ReturnTable::from_prices(prices)?)
    }

    /// Column means and the unbiased (n-1) sample covariance.
    pub fn from_returns(returns: &ReturnTable) -> Result<Self> {
        let n_obs = returns.len();
        if n_obs < 2 {
            // One return per day pair: a sample covariance needs three prices.
            return Err(OptimizerError::insufficient_data(3, n_obs + 1));
        }
        let n = returns.num_instruments;
        let denom = (n_obs - 1) as f64;

        let means: Vec<f64> = (0..n)
            .map(|i| returns.column(i).sum::<f64>() / n_obs as f64)
            .collect();

        let mut cov = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let sum: f64 = returns
                    .rows()
                    .iter()
                    .map(|row| (row[i] - means[i]) * (row[j] - means[j]))
                    .sum();
                let covariance = sum / denom;
                cov[i][j] = covariance;
                cov[j][i] = covariance;
            }
        }

        let estimates = Self {
            means,
            cov,
            observations: n_obs,
            periods_per_year: 1.0,
        };
        estimates.check_finite()?;
        Ok(estimates)
    }

    /// Fails on the first instrument whose mean or covariance row is not
    /// finite.
    pub fn check_finite(&self) -> Result<()> {
        let bad = self
            .means
            .iter()
            .zip(self.cov.iter())
            .position(|(m, row)| !m.is_finite() || row.iter().any(|c| !c.is_finite()));
        match bad {
            Some(instrument) => Err(OptimizerError::NonFiniteEstimate { instrument }),
            None => Ok(()),
        }
    }

    /// Scales mean and covariance by `trading_days`.
    pub fn annualized(&self, trading_days: f64) -> Self {
        Self {
            means: self.means.iter().map(|m| m * trading_days).collect(),
            cov: self
                .cov
                .iter()
                .map(|row| row.iter().map(|c| c * trading_days).collect())
                .collect(),
            observations: self.observations,
            periods_per_year: self.periods_per_year * trading_days,
        }
    }

    pub fn num_instruments(&self) -> usize {
        self.means.len()
    }

    /// Per-instrument standard deviation.
    pub fn volatilities(&self) -> Vec<f64> {
        (0..self.num_instruments())
            .map(|i| self.cov[i][i].max(0.0).sqrt())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prices() -> PriceTable {
        PriceTable::unlabeled(
            &["A", "B", "C"],
            vec![
                vec![100.0, 50.0, 20.0],
                vec![110.0, 51.0, 19.5],
                vec![99.0, 49.5, 21.0],
                vec![108.9, 52.0, 20.5],
                vec![112.0, 52.5, 20.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_return_table_shape_and_values() {
        let prices = sample_prices();
        let returns = ReturnTable::from_prices(&prices).unwrap();

        assert_eq!(returns.len(), prices.num_days() - 1);
        for t in 0..returns.len() {
            for i in 0..prices.num_instruments() {
                let p0 = prices.rows()[t][i];
                let p1 = prices.rows()[t + 1][i];
                assert!((returns.rows()[t][i] - (p1 - p0) / p0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_covariance_matrix_symmetry() {
        let est = Estimates::from_prices(&sample_prices()).unwrap();

        assert_eq!(est.means.len(), 3);
        assert_eq!(est.cov.len(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (est.cov[i][j] - est.cov[j][i]).abs() < 1e-15,
                    "Covariance matrix should be symmetric"
                );
            }
            assert!(est.cov[i][i] > 0.0, "Variance should be positive");
        }
    }

    #[test]
    fn test_known_sample_variance() {
        // Returns +10%, -10%, +10%: mean 1/30, unbiased variance 0.04/3.
        let prices =
            PriceTable::unlabeled(&["A"], vec![vec![100.0], vec![110.0], vec![99.0], vec![108.9]])
                .unwrap();
        let est = Estimates::from_prices(&prices).unwrap();

        assert!((est.means[0] - 0.1 / 3.0).abs() < 1e-9);
        assert!((est.cov[0][0] - 0.04 / 3.0).abs() < 1e-9);
        assert_eq!(est.observations, 3);
    }

    #[test]
    fn test_annualization_scales_linearly() {
        let daily = Estimates::from_prices(&sample_prices()).unwrap();
        let annual = daily.annualized(252.0);

        assert_eq!(annual.periods_per_year, 252.0);
        for i in 0..3 {
            assert!((annual.means[i] - daily.means[i] * 252.0).abs() < 1e-12);
            for j in 0..3 {
                assert!((annual.cov[i][j] - daily.cov[i][j] * 252.0).abs() < 1e-12);
            }
        }
        let vols = annual.volatilities();
        assert!((vols[0] - (daily.cov[0][0] * 252.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_days() {
        let one_day = PriceTable::unlabeled(&["A", "B"], vec![vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            ReturnTable::from_prices(&one_day),
            Err(OptimizerError::InsufficientData { required: 2, available: 1 })
        ));

        let empty = PriceTable::unlabeled(&["A"], vec![]).unwrap();
        assert!(matches!(
            Estimates::from_prices(&empty),
            Err(OptimizerError::InsufficientData { available: 0, .. })
        ));

        let two_days = PriceTable::unlabeled(&["A"], vec![vec![1.0], vec![1.1]]).unwrap();
        assert_eq!(ReturnTable::from_prices(&two_days).unwrap().len(), 1);
        assert!(matches!(
            Estimates::from_prices(&two_days),
            Err(OptimizerError::InsufficientData { required: 3, available: 2 })
        ));
    }

    #[test]
    fn test_overflowing_return_is_rejected() {
        let prices =
            PriceTable::unlabeled(&["A", "B"], vec![vec![1.0, 1e-300], vec![1.1, 1e300], vec![1.2, 1e300]])
                .unwrap();
        assert!(matches!(
            ReturnTable::from_prices(&prices),
            Err(OptimizerError::NonFiniteReturn { day: 0, instrument: 1 })
        ));
        assert!(Estimates::from_prices(&prices).is_err());
    }

    #[test]
    fn test_overflowing_covariance_is_rejected() {
        // Each return is finite but the squared deviations overflow.
        let prices = PriceTable::unlabeled(
            &["A", "B"],
            vec![vec![1.0, 1.0], vec![1.1, 1e200], vec![1.2, 1.0]],
        )
        .unwrap();
        assert!(ReturnTable::from_prices(&prices).is_ok());
        assert!(matches!(
            Estimates::from_prices(&prices),
            Err(OptimizerError::NonFiniteEstimate { instrument: 1 })
        ));
    }
}
