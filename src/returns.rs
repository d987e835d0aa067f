use ndarray::{s, Array1, Array2, ArrayView2};

use crate::data::PriceTable;
use crate::error::{EngineError, EngineResult};
use crate::portfolio::WeightVector;

/// T x N matrix of periodic returns: one row per observation, one column per
/// asset, columns in ticker order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsMatrix {
    tickers: Vec<String>,
    returns: Array2<f64>,
}

impl ReturnsMatrix {
    pub fn new(tickers: Vec<String>, returns: Array2<f64>) -> EngineResult<Self> {
        let (n_obs, n_assets) = returns.dim();
        if n_assets < 2 {
            return Err(EngineError::insufficient_data(format!(
                "need at least 2 assets, got {}",
                n_assets
            )));
        }
        if tickers.len() != n_assets {
            return Err(EngineError::insufficient_data(format!(
                "{} tickers for {} return columns",
                tickers.len(),
                n_assets
            )));
        }
        if n_obs == 0 {
            return Err(EngineError::insufficient_data("returns matrix has no rows"));
        }
        if let Some(((t, i), r)) = returns.indexed_iter().find(|(_, r)| !r.is_finite()) {
            return Err(EngineError::insufficient_data(format!(
                "return for {} at row {} is {}",
                tickers[i], t, r
            )));
        }
        Ok(Self { tickers, returns })
    }

    /// Period-over-period percentage change of an aligned price table. The
    /// first (undefined) row is discarded.
    pub fn from_prices(table: &PriceTable) -> EngineResult<Self> {
        let prices = &table.prices;
        let n_days = prices.nrows();
        if n_days < 2 {
            return Err(EngineError::insufficient_data(format!(
                "need at least 2 price rows, got {}",
                n_days
            )));
        }
        if let Some(((t, i), p)) = prices
            .indexed_iter()
            .find(|(_, p)| !p.is_finite() || **p <= 0.0)
        {
            return Err(EngineError::insufficient_data(format!(
                "price for column {} on row {} is {}",
                i, t, p
            )));
        }

        let previous = prices.slice(s![..-1, ..]);
        let current = prices.slice(s![1.., ..]);
        let returns = (&current - &previous) / &previous;
        Self::new(table.tickers.clone(), returns)
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn n_assets(&self) -> usize {
        self.returns.ncols()
    }

    pub fn n_observations(&self) -> usize {
        self.returns.nrows()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.returns.view()
    }

    /// Realized per-period returns of a fixed-weight portfolio.
    pub fn portfolio_returns(&self, weights: &WeightVector) -> Array1<f64> {
        self.returns.dot(weights.as_array())
    }
}

/// Compounded cumulative return after each period: prod(1 + r_t) - 1.
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |growth, r| {
            *growth *= 1.0 + r;
            Some(*growth - 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn table() -> PriceTable {
        PriceTable {
            dates: vec!["2024-01-02".into(), "2024-01-03".into(), "2024-01-04".into()],
            tickers: vec!["AAA".into(), "BBB".into()],
            prices: array![[100.0, 50.0], [110.0, 50.0], [99.0, 55.0]],
        }
    }

    #[test]
    fn pct_change_drops_first_row() {
        let r = ReturnsMatrix::from_prices(&table()).unwrap();
        assert_eq!(r.n_observations(), 2);
        assert_relative_eq!(r.view()[[0, 0]], 0.1, epsilon = 1e-12);
        assert_relative_eq!(r.view()[[1, 0]], -0.1, epsilon = 1e-12);
        assert_relative_eq!(r.view()[[1, 1]], 0.1, epsilon = 1e-12);
        assert_eq!(r.tickers(), &["AAA".to_string(), "BBB".to_string()]);
    }

    #[test]
    fn rejects_single_asset() {
        let err = ReturnsMatrix::new(vec!["AAA".into()], array![[0.01], [0.02]]).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }

    #[test]
    fn rejects_gaps() {
        let err = ReturnsMatrix::new(
            vec!["AAA".into(), "BBB".into()],
            array![[0.01, f64::NAN], [0.02, 0.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("BBB"));
    }

    #[test]
    fn rejects_non_positive_prices() {
        let mut t = table();
        t.prices[[1, 1]] = 0.0;
        assert!(ReturnsMatrix::from_prices(&t).is_err());
    }

    #[test]
    fn portfolio_returns_follow_weights() {
        let r = ReturnsMatrix::from_prices(&table()).unwrap();
        let w = WeightVector::equal(2);
        let pr = r.portfolio_returns(&w);
        assert_relative_eq!(pr[0], 0.05, epsilon = 1e-12);
        assert_relative_eq!(pr[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn cumulative_returns_compound() {
        let c = cumulative_returns(&[0.1, -0.1, 0.0]);
        assert_relative_eq!(c[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(c[1], -0.01, epsilon = 1e-12);
        assert_relative_eq!(c[2], -0.01, epsilon = 1e-12);
    }
}
