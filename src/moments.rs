use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::{EngineError, EngineResult};
use crate::portfolio::{PortfolioPoint, WeightVector};
use crate::returns::ReturnsMatrix;

/// Sample mean vector and sample covariance matrix of a returns matrix.
///
/// Both use the unbiased (T - 1) convention for the covariance and the plain
/// sample mean, matching what pandas reports for the same data.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentEstimate {
    pub mean: Array1<f64>,
    pub covariance: Array2<f64>,
}

impl MomentEstimate {
    pub fn estimate(returns: &ReturnsMatrix) -> EngineResult<Self> {
        let data = returns.view();
        let n_obs = data.nrows();
        if n_obs < 2 {
            return Err(EngineError::insufficient_data(format!(
                "need at least 2 observations to estimate covariance, got {}",
                n_obs
            )));
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| EngineError::insufficient_data("returns matrix is empty"))?;

        // Cov = 1/(T-1) * (R_centered^T * R_centered)
        let centered = &data - &mean.view().insert_axis(Axis(0));
        let factor = 1.0 / (n_obs as f64 - 1.0);
        let raw = centered.t().dot(&centered) * factor;
        // exact symmetry; matrix products may differ in the last bit
        let covariance = (&raw + &raw.t()) * 0.5;

        Ok(Self { mean, covariance })
    }

    /// Build from externally supplied moments.
    pub fn from_parts(mean: Array1<f64>, covariance: Array2<f64>) -> EngineResult<Self> {
        let n = mean.len();
        if n < 2 {
            return Err(EngineError::insufficient_data(format!(
                "need at least 2 assets, got {}",
                n
            )));
        }
        if covariance.dim() != (n, n) {
            return Err(EngineError::insufficient_data(format!(
                "covariance is {:?} for {} assets",
                covariance.dim(),
                n
            )));
        }
        if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(EngineError::insufficient_data("moments contain non-finite values"));
        }
        let covariance = (&covariance + &covariance.t()) * 0.5;
        Ok(Self { mean, covariance })
    }

    pub fn n_assets(&self) -> usize {
        self.mean.len()
    }

    pub fn portfolio_return(&self, weights: ArrayView1<f64>) -> f64 {
        weights.dot(&self.mean)
    }

    /// w' * Cov * w, floored at zero against rounding.
    pub fn portfolio_variance(&self, weights: ArrayView1<f64>) -> f64 {
        weights.dot(&self.covariance.dot(&weights)).max(0.0)
    }

    pub fn point(&self, weights: &WeightVector) -> PortfolioPoint {
        let w = weights.as_array().view();
        PortfolioPoint {
            risk: self.portfolio_variance(w).sqrt(),
            expected_return: self.portfolio_return(w),
        }
    }

    /// Largest single-asset standard deviation; the scale against which a
    /// portfolio risk counts as zero.
    pub fn max_asset_risk(&self) -> f64 {
        self.covariance
            .diag()
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.max(0.0).sqrt()))
    }

    pub fn min_mean(&self) -> f64 {
        self.mean.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_mean(&self) -> f64 {
        self.mean.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_assets() -> ReturnsMatrix {
        ReturnsMatrix::new(
            vec!["A".into(), "B".into()],
            array![[0.01, 0.03], [0.02, 0.01], [0.03, -0.01], [0.01, 0.02]],
        )
        .unwrap()
    }

    #[test]
    fn sample_mean_and_covariance() {
        let m = MomentEstimate::estimate(&two_assets()).unwrap();
        assert_relative_eq!(m.mean[0], 0.0175, epsilon = 1e-15);
        assert_relative_eq!(m.mean[1], 0.0125, epsilon = 1e-15);
        // var(A) = sum((x - 0.0175)^2) / 3
        assert_relative_eq!(m.covariance[[0, 0]], 0.000_091_666_666_666_666_7, epsilon = 1e-15);
        assert_relative_eq!(m.covariance[[1, 1]], 0.000_291_666_666_666_666_7, epsilon = 1e-15);
        assert_relative_eq!(m.covariance[[0, 1]], -0.000_158_333_333_333_333_3, epsilon = 1e-15);
        assert_eq!(m.covariance[[0, 1]], m.covariance[[1, 0]]);
    }

    #[test]
    fn estimate_is_deterministic() {
        let r = two_assets();
        let a = MomentEstimate::estimate(&r).unwrap();
        let b = MomentEstimate::estimate(&r).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn needs_two_observations() {
        let r = ReturnsMatrix::new(vec!["A".into(), "B".into()], array![[0.01, 0.02]]).unwrap();
        assert!(matches!(
            MomentEstimate::estimate(&r),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn point_of_equal_weights() {
        let m = MomentEstimate::estimate(&two_assets()).unwrap();
        let p = m.point(&WeightVector::equal(2));
        assert_relative_eq!(p.expected_return, 0.015, epsilon = 1e-15);
        let var = 0.25 * (m.covariance[[0, 0]] + m.covariance[[1, 1]] + 2.0 * m.covariance[[0, 1]]);
        assert_relative_eq!(p.risk, var.sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn from_parts_checks_shape() {
        assert!(MomentEstimate::from_parts(array![0.1, 0.2], Array2::<f64>::eye(3)).is_err());
        assert!(MomentEstimate::from_parts(array![0.1], Array2::<f64>::eye(1)).is_err());
        assert!(MomentEstimate::from_parts(array![0.1, 0.2], Array2::<f64>::eye(2)).is_ok());
    }
}
