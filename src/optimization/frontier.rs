//! Efficient frontier as a parametric sweep of target returns.
//!
//! Every grid point is its own QP: min w'Σw s.t. Σw = 1, mean'w = target,
//! 0 <= w <= 1. Grid points that no long-only portfolio can reach are dropped,
//! so the curve may come back shorter than the grid.
//!
//! A target equal to the lowest or highest asset mean only admits portfolios
//! built from the assets at that mean. Those endpoints are solved over that
//! subset directly, since the full problem has no strictly feasible point.

use ndarray::{Array1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::qp::{QpStatus, QuadraticProgram};
use super::SolverSettings;
use crate::error::{EngineError, EngineResult};
use crate::moments::MomentEstimate;
use crate::portfolio::{Portfolio, WeightVector};

const SOLVER: &str = "efficient-frontier";

/// Targets within this (relative) distance of an attainable bound are snapped
/// onto it.
const TARGET_TOLERANCE: f64 = 1e-12;

/// Spans below this are treated as a single target.
const DEGENERATE_SPAN: f64 = 1e-15;

/// Which return range the target grid covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrontierGrid {
    /// Lowest to highest per-asset mean return.
    #[default]
    AssetMeanSpan,
    /// Minimum-variance portfolio return to maximum-return portfolio return.
    MinVarianceToMaxReturn,
}

impl FrontierGrid {
    pub fn bounds(
        &self,
        moments: &MomentEstimate,
        min_variance_return: f64,
        max_return: f64,
    ) -> (f64, f64) {
        match self {
            Self::AssetMeanSpan => (moments.min_mean(), moments.max_mean()),
            Self::MinVarianceToMaxReturn => (min_variance_return, max_return),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub portfolio: Portfolio,
}

/// Frontier points in ascending target-return order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontierCurve {
    pub points: Vec<FrontierPoint>,
}

impl FrontierCurve {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn risks(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.portfolio.point.risk).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|p| p.portfolio.point.expected_return)
            .collect()
    }

    pub fn weights(&self) -> Vec<Vec<f64>> {
        self.points
            .iter()
            .map(|p| p.portfolio.weights.to_vec())
            .collect()
    }
}

/// `n_points` targets spaced linearly from `low` to `high`, both inclusive.
pub fn target_grid(low: f64, high: f64, n_points: usize) -> Vec<f64> {
    if n_points == 0 {
        return Vec::new();
    }
    if n_points == 1 || (high - low).abs() <= DEGENERATE_SPAN {
        return vec![low];
    }
    let mut grid = Array1::linspace(low, high, n_points).to_vec();
    // linspace may miss the end by an ulp
    grid[n_points - 1] = high;
    grid
}

/// Minimum-variance portfolio with an exact return target.
pub fn min_variance_for_target(
    moments: &MomentEstimate,
    target: f64,
    settings: &SolverSettings,
) -> EngineResult<Portfolio> {
    let n = moments.n_assets();
    let (low_idx, high_idx) = extreme_assets(&moments.mean);
    let min = moments.mean[low_idx];
    let max = moments.mean[high_idx];
    let slack = TARGET_TOLERANCE * min.abs().max(max.abs()).max(1.0);
    if !target.is_finite() || target < min - slack || target > max + slack {
        return Err(EngineError::InfeasibleTarget { target, min, max });
    }
    let target = target.clamp(min, max);

    for extreme in [min, max] {
        if (target - extreme).abs() <= slack {
            let members: Vec<usize> = (0..n)
                .filter(|&i| (moments.mean[i] - extreme).abs() <= slack)
                .collect();
            return min_variance_over(moments, &members, settings);
        }
    }

    let solution = QuadraticProgram::new(&moments.covariance * 2.0, Array1::zeros(n))
        .with_equality(&vec![1.0; n], 1.0)
        .with_equality(&moments.mean.to_vec(), target)
        .with_bounds(0.0, 1.0)
        .solve(settings);

    match solution.status {
        QpStatus::Solved => {}
        QpStatus::PrimalInfeasible => {
            return Err(EngineError::InfeasibleTarget { target, min, max });
        }
        QpStatus::MaxIterationsReached | QpStatus::NumericalError => {
            return Err(EngineError::diverged(SOLVER, solution.iterations));
        }
    }

    let weights = WeightVector::from_solution(&solution.x)?;
    Ok(Portfolio::evaluate(weights, moments))
}

/// Solve every target and keep the attainable ones, in grid order.
pub fn efficient_frontier(
    moments: &MomentEstimate,
    targets: &[f64],
    settings: &SolverSettings,
    parallel: bool,
) -> EngineResult<FrontierCurve> {
    let solve = |target: &f64| min_variance_for_target(moments, *target, settings);
    let solved: Vec<EngineResult<Portfolio>> = if parallel {
        targets.par_iter().map(solve).collect()
    } else {
        targets.iter().map(solve).collect()
    };

    let mut points = Vec::with_capacity(targets.len());
    let mut dropped = 0usize;
    for (target, result) in targets.iter().zip(solved) {
        match result {
            Ok(portfolio) => points.push(FrontierPoint {
                target_return: *target,
                portfolio,
            }),
            Err(EngineError::InfeasibleTarget { .. }) => {
                debug!(target, "dropping infeasible frontier point");
                dropped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    if dropped > 0 {
        warn!(dropped, kept = points.len(), "frontier grid points were infeasible");
    }

    Ok(FrontierCurve { points })
}

/// Indices of the lowest and highest mean (first occurrence of each).
fn extreme_assets(mean: &Array1<f64>) -> (usize, usize) {
    let mut low = 0;
    let mut high = 0;
    for (i, &mu) in mean.iter().enumerate() {
        if mu < mean[low] {
            low = i;
        }
        if mu > mean[high] {
            high = i;
        }
    }
    (low, high)
}

/// Minimum-variance portfolio restricted to `members`, every other weight zero.
fn min_variance_over(
    moments: &MomentEstimate,
    members: &[usize],
    settings: &SolverSettings,
) -> EngineResult<Portfolio> {
    let n = moments.n_assets();
    if let [only] = members {
        return Ok(Portfolio::evaluate(WeightVector::single_asset(n, *only), moments));
    }

    let k = members.len();
    let sub = moments
        .covariance
        .select(Axis(0), members)
        .select(Axis(1), members);
    let solution = QuadraticProgram::new(sub * 2.0, Array1::zeros(k))
        .with_equality(&vec![1.0; k], 1.0)
        .with_bounds(0.0, 1.0)
        .solve(settings);
    if solution.status != QpStatus::Solved {
        debug!(status = ?solution.status, members = k, "frontier endpoint solve failed");
        return Err(EngineError::diverged(SOLVER, solution.iterations));
    }

    let mut full = vec![0.0; n];
    for (&i, &w) in members.iter().zip(solution.x.iter()) {
        full[i] = w;
    }
    let weights = WeightVector::from_solution(&full)?;
    Ok(Portfolio::evaluate(weights, moments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn three_assets() -> MomentEstimate {
        MomentEstimate::from_parts(
            array![0.004, 0.007, 0.010],
            array![
                [0.0010, 0.0003, 0.0002],
                [0.0003, 0.0025, 0.0006],
                [0.0002, 0.0006, 0.0040]
            ],
        )
        .unwrap()
    }

    #[test]
    fn grid_is_inclusive_and_ascending() {
        let g = target_grid(0.004, 0.010, 50);
        assert_eq!(g.len(), 50);
        assert_eq!(g[0], 0.004);
        assert_eq!(g[49], 0.010);
        assert!(g.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(target_grid(0.01, 0.01, 50), vec![0.01]);
        assert!(target_grid(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn target_return_is_met() {
        let m = three_assets();
        let p = min_variance_for_target(&m, 0.008, &SolverSettings::default()).unwrap();
        assert_abs_diff_eq!(p.point.expected_return, 0.008, epsilon = 1e-7);
        assert_abs_diff_eq!(p.weights.as_array().sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn endpoints_are_single_assets() {
        let m = three_assets();
        let top = min_variance_for_target(&m, 0.010, &SolverSettings::default()).unwrap();
        assert_eq!(top.weights.as_array()[2], 1.0);
        let bottom = min_variance_for_target(&m, 0.004, &SolverSettings::default()).unwrap();
        assert_eq!(bottom.weights.as_array()[0], 1.0);
    }

    #[test]
    fn tied_endpoint_assets_are_mixed_by_variance() {
        let m = MomentEstimate::from_parts(
            array![0.004, 0.010, 0.010],
            array![
                [0.0010, 0.0, 0.0],
                [0.0, 0.0040, 0.0],
                [0.0, 0.0, 0.0010]
            ],
        )
        .unwrap();
        let top = min_variance_for_target(&m, 0.010, &SolverSettings::default()).unwrap();
        let w = top.weights.as_array();
        assert_eq!(w[0], 0.0);
        // inverse variance over the two assets at the top mean
        assert_abs_diff_eq!(w[1], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(w[2], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(top.point.expected_return, 0.010, epsilon = 1e-12);
    }

    #[test]
    fn unreachable_targets_are_reported() {
        let m = three_assets();
        assert!(matches!(
            min_variance_for_target(&m, 0.02, &SolverSettings::default()),
            Err(EngineError::InfeasibleTarget { .. })
        ));
    }

    #[test]
    fn sweep_drops_infeasible_points_and_keeps_order() {
        let m = three_assets();
        let targets = vec![0.002, 0.005, 0.008, 0.012];
        let curve = efficient_frontier(&m, &targets, &SolverSettings::default(), false).unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve.points[0].target_return, 0.005);
        assert_eq!(curve.points[1].target_return, 0.008);
    }

    #[test]
    fn parallel_sweep_matches_sequential() {
        let m = three_assets();
        let targets = target_grid(m.min_mean(), m.max_mean(), 12);
        let seq = efficient_frontier(&m, &targets, &SolverSettings::default(), false).unwrap();
        let par = efficient_frontier(&m, &targets, &SolverSettings::default(), true).unwrap();
        assert_eq!(seq, par);
    }
}
