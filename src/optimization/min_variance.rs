use ndarray::Array1;
use tracing::debug;

use super::qp::{QpStatus, QuadraticProgram};
use super::SolverSettings;
use crate::error::{EngineError, EngineResult};
use crate::moments::MomentEstimate;
use crate::portfolio::{Portfolio, WeightVector};

const SOLVER: &str = "min-variance";

/// Global minimum-variance portfolio: min w'Σw s.t. Σw = 1, 0 <= w <= 1.
pub fn min_variance(moments: &MomentEstimate, settings: &SolverSettings) -> EngineResult<Portfolio> {
    let n = moments.n_assets();
    if n < 2 {
        return Err(EngineError::insufficient_data(format!(
            "need at least 2 assets, got {}",
            n
        )));
    }

    let qp = QuadraticProgram::new(&moments.covariance * 2.0, Array1::zeros(n))
        .with_equality(&vec![1.0; n], 1.0)
        .with_bounds(0.0, 1.0);

    let solution = qp.solve(settings);
    match solution.status {
        QpStatus::Solved => {}
        _ => {
            debug!(status = ?solution.status, "minimum-variance solve failed");
            return Err(EngineError::diverged(SOLVER, solution.iterations));
        }
    }

    let weights = WeightVector::from_solution(&solution.x)?;
    Ok(Portfolio::evaluate(weights, moments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn uncorrelated_assets_mix_by_inverse_variance() {
        // w_i proportional to 1/var_i: (1/0.04, 1/0.01) -> (0.2, 0.8)
        let m = MomentEstimate::from_parts(
            array![0.01, 0.02],
            array![[0.04, 0.0], [0.0, 0.01]],
        )
        .unwrap();
        let p = min_variance(&m, &SolverSettings::default()).unwrap();
        assert_abs_diff_eq!(p.weights.as_array()[0], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(p.weights.as_array()[1], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(p.point.risk, (0.04_f64 * 0.04 + 0.64 * 0.01).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn long_only_bound_binds() {
        // unconstrained optimum shorts the first asset
        let m = MomentEstimate::from_parts(
            array![0.01, 0.02],
            array![[0.09, 0.025], [0.025, 0.01]],
        )
        .unwrap();
        let p = min_variance(&m, &SolverSettings::default()).unwrap();
        assert_abs_diff_eq!(p.weights.as_array()[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.weights.as_array()[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn riskless_asset_takes_everything() {
        let m = MomentEstimate::from_parts(
            array![0.01, 0.005, 0.02],
            array![[0.04, 0.0, 0.01], [0.0, 0.0, 0.0], [0.01, 0.0, 0.09]],
        )
        .unwrap();
        let p = min_variance(&m, &SolverSettings::default()).unwrap();
        assert_abs_diff_eq!(p.weights.as_array()[1], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.point.risk, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn tiny_budget_diverges() {
        let m = MomentEstimate::from_parts(
            array![0.01, 0.02, 0.015],
            array![[0.04, 0.01, 0.0], [0.01, 0.03, 0.005], [0.0, 0.005, 0.02]],
        )
        .unwrap();
        let settings = SolverSettings {
            max_iterations: 1,
            ..SolverSettings::default()
        };
        assert!(matches!(
            min_variance(&m, &settings),
            Err(EngineError::OptimizationDiverged { .. })
        ));
    }
}
