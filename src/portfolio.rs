use ndarray::Array1;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::moments::MomentEstimate;

/// Allowed deviation of a weight vector's sum from one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Solver outputs may undershoot zero by this much before being rejected.
const NEGATIVE_WEIGHT_SLACK: f64 = 1e-6;

/// Solver outputs whose sum is further than this from one are rejected
/// instead of renormalized.
const REPAIRABLE_SUM_DRIFT: f64 = 1e-4;

/// Long-only, fully invested weights: every entry is non-negative and they
/// sum to one. Entry `i` always belongs to ticker `i` of the returns matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector(Array1<f64>);

impl WeightVector {
    /// Validate an explicit weight vector.
    pub fn new(weights: Array1<f64>) -> EngineResult<Self> {
        if weights.is_empty() {
            return Err(EngineError::invalid_weights("empty weight vector"));
        }
        if let Some((i, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(EngineError::invalid_weights(format!(
                "weight {} is {}",
                i, w
            )));
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::invalid_weights(format!(
                "weights sum to {}",
                sum
            )));
        }
        Ok(Self(weights))
    }

    /// 1/N on every asset.
    pub fn equal(n_assets: usize) -> Self {
        Self(Array1::from_elem(n_assets, 1.0 / n_assets as f64))
    }

    /// All weight on a single asset.
    pub fn single_asset(n_assets: usize, index: usize) -> Self {
        let mut weights = Array1::zeros(n_assets);
        weights[index] = 1.0;
        Self(weights)
    }

    /// Repair a raw solver iterate: clamp tiny negatives to zero and
    /// renormalize. Anything worse than rounding noise is rejected.
    pub fn from_solution(raw: &[f64]) -> EngineResult<Self> {
        if raw.is_empty() {
            return Err(EngineError::invalid_weights("empty solver output"));
        }
        let mut weights = Array1::from_vec(raw.to_vec());
        for (i, w) in weights.iter_mut().enumerate() {
            if !w.is_finite() {
                return Err(EngineError::invalid_weights(format!(
                    "solver produced non-finite weight at {}",
                    i
                )));
            }
            if *w < -NEGATIVE_WEIGHT_SLACK {
                return Err(EngineError::invalid_weights(format!(
                    "solver produced weight {} at {}",
                    w, i
                )));
            }
            *w = w.max(0.0);
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > REPAIRABLE_SUM_DRIFT {
            return Err(EngineError::invalid_weights(format!(
                "solver weights sum to {}",
                sum
            )));
        }
        weights.mapv_inplace(|w| w / sum);
        Ok(Self(weights))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.to_vec()
    }
}

/// Risk (standard deviation) and expected return of one portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioPoint {
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
}

impl PortfolioPoint {
    /// (return - r_f) / risk, or `None` when the risk is zero.
    pub fn sharpe_ratio(&self, risk_free_rate: f64) -> Option<f64> {
        if self.risk > 0.0 {
            Some((self.expected_return - risk_free_rate) / self.risk)
        } else {
            None
        }
    }
}

/// A weight vector together with the point it produces under a moment estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub weights: WeightVector,
    pub point: PortfolioPoint,
}

impl Portfolio {
    pub fn evaluate(weights: WeightVector, moments: &MomentEstimate) -> Self {
        let point = moments.point(&weights);
        Self { weights, point }
    }
}
