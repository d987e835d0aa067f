//! Random long-only portfolios for the feasible-set cloud.
//!
//! Each sample draws N uniforms in [0, 1) and normalizes them to sum to one.
//! This is not uniform over the simplex: the cloud concentrates around
//! equal-weight allocations and thins out towards the corners. Charts rely on
//! that shape, so the simple normalization is kept. The best sampled points
//! are only rough stand-ins for the optimizers in [`crate::optimization`].

use ndarray::Array1;
use rand::Rng;
use tracing::debug;

use crate::moments::MomentEstimate;
use crate::portfolio::{PortfolioPoint, WeightVector};

#[derive(Debug, Clone, PartialEq)]
pub struct SampledPortfolio {
    pub weights: WeightVector,
    pub point: PortfolioPoint,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleCloud {
    pub samples: Vec<SampledPortfolio>,
}

impl SampleCloud {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn risks(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.point.risk).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.point.expected_return).collect()
    }

    /// Sample with the highest Sharpe ratio; riskless samples are skipped.
    pub fn max_sharpe(&self, risk_free_rate: f64) -> Option<&SampledPortfolio> {
        self.samples
            .iter()
            .filter_map(|s| s.point.sharpe_ratio(risk_free_rate).map(|sr| (sr, s)))
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, s)| s)
    }

    /// Sample with the lowest risk.
    pub fn min_risk(&self) -> Option<&SampledPortfolio> {
        self.samples
            .iter()
            .min_by(|a, b| a.point.risk.total_cmp(&b.point.risk))
    }
}

/// Draw `count` random weight vectors and evaluate them.
pub fn sample_portfolios<R: Rng + ?Sized>(
    moments: &MomentEstimate,
    count: usize,
    rng: &mut R,
) -> SampleCloud {
    let n = moments.n_assets();
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let raw = Array1::from_iter((0..n).map(|_| rng.gen::<f64>()));
        let total = raw.sum();
        // every draw came out exactly zero
        let weights = if total > 0.0 {
            WeightVector::from_solution(&(raw / total).to_vec())
                .unwrap_or_else(|_| WeightVector::equal(n))
        } else {
            WeightVector::equal(n)
        };
        let point = moments.point(&weights);
        samples.push(SampledPortfolio { weights, point });
    }
    debug!(count, n_assets = n, "sampled random portfolios");
    SampleCloud { samples }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn moments() -> MomentEstimate {
        MomentEstimate::from_parts(
            array![0.01, 0.02, 0.015],
            array![[0.04, 0.01, 0.0], [0.01, 0.03, 0.005], [0.0, 0.005, 0.02]],
        )
        .unwrap()
    }

    #[test]
    fn samples_are_valid_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let cloud = sample_portfolios(&moments(), 500, &mut rng);
        assert_eq!(cloud.len(), 500);
        for s in &cloud.samples {
            let w = s.weights.as_array();
            assert!((w.sum() - 1.0).abs() < 1e-12);
            assert!(w.iter().all(|&x| (0.0..=1.0).contains(&x)));
        }
    }

    #[test]
    fn same_seed_same_cloud() {
        let a = sample_portfolios(&moments(), 100, &mut StdRng::seed_from_u64(7));
        let b = sample_portfolios(&moments(), 100, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        let c = sample_portfolios(&moments(), 100, &mut StdRng::seed_from_u64(8));
        assert_ne!(a, c);
    }

    #[test]
    fn best_samples_are_extremes_of_the_cloud() {
        let cloud = sample_portfolios(&moments(), 300, &mut StdRng::seed_from_u64(1));
        let min = cloud.min_risk().unwrap();
        assert!(cloud.samples.iter().all(|s| s.point.risk >= min.point.risk));
        let best = cloud.max_sharpe(0.0).unwrap();
        let best_sr = best.point.sharpe_ratio(0.0).unwrap();
        assert!(cloud
            .samples
            .iter()
            .all(|s| s.point.sharpe_ratio(0.0).unwrap() <= best_sr));
    }

    #[test]
    fn empty_cloud_has_no_extremes() {
        let cloud = sample_portfolios(&moments(), 0, &mut StdRng::seed_from_u64(1));
        assert!(cloud.is_empty());
        assert!(cloud.min_risk().is_none());
        assert!(cloud.max_sharpe(0.0).is_none());
    }
}
