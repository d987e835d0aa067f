pub mod equal_weight;
pub mod frontier;
pub mod max_return;
pub mod max_sharpe;
pub mod min_variance;
pub mod qp;

use serde::Deserialize;
use tracing::info;

use crate::error::EngineResult;
use crate::moments::MomentEstimate;
use crate::portfolio::Portfolio;

pub use equal_weight::equal_weight;
pub use frontier::{efficient_frontier, FrontierCurve, FrontierGrid, FrontierPoint};
pub use max_return::max_return;
pub use max_sharpe::{max_sharpe, SharpePortfolio};
pub use min_variance::min_variance;

/// Iteration budget and tolerances shared by every solver invocation.
///
/// The QP fields map onto Clarabel's settings of the same name; tolerances
/// apply to the rescaled problem.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: u32,
    pub tol_gap_abs: f64,
    pub tol_gap_rel: f64,
    pub tol_feas: f64,
    pub tol_infeas: f64,
    pub nelder_mead_iterations: u64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tol_gap_abs: 1e-9,
            tol_gap_rel: 1e-9,
            tol_feas: 1e-9,
            tol_infeas: 1e-8,
            nelder_mead_iterations: 5_000,
        }
    }
}

/// Everything one optimization request needs besides the moments.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationSettings {
    /// Risk-free rate per period (same frequency as the returns).
    pub risk_free_rate: f64,
    pub frontier_points: usize,
    pub frontier_grid: FrontierGrid,
    pub parallel_frontier: bool,
    pub solver: SolverSettings,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            frontier_points: 50,
            frontier_grid: FrontierGrid::default(),
            parallel_frontier: false,
            solver: SolverSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizationResults {
    pub min_variance: Portfolio,
    pub max_return: Portfolio,
    pub max_sharpe: SharpePortfolio,
    pub equal_weight: Portfolio,
    pub frontier: FrontierCurve,
}

/// Run every canonical optimizer against one moment estimate.
pub fn optimize_portfolio(
    moments: &MomentEstimate,
    settings: &OptimizationSettings,
) -> EngineResult<OptimizationResults> {
    let equal_weight = equal_weight(moments)?;
    let min_variance = min_variance(moments, &settings.solver)?;
    let max_return = max_return(moments)?;
    let max_sharpe = max_sharpe(moments, settings.risk_free_rate, &settings.solver)?;

    let (low, high) = settings.frontier_grid.bounds(
        moments,
        min_variance.point.expected_return,
        max_return.point.expected_return,
    );
    let targets = frontier::target_grid(low, high, settings.frontier_points);
    let frontier = efficient_frontier(
        moments,
        &targets,
        &settings.solver,
        settings.parallel_frontier,
    )?;

    info!(
        n_assets = moments.n_assets(),
        frontier_points = frontier.len(),
        min_variance_risk = min_variance.point.risk,
        max_sharpe = max_sharpe.sharpe_ratio,
        "portfolio optimization finished"
    );

    Ok(OptimizationResults {
        min_variance,
        max_return,
        max_sharpe,
        equal_weight,
        frontier,
    })
}

/// Convert an annual rate to the equivalent compounded rate per period.
pub fn annual_to_periodic_rate(r_annual: f64, periods_per_year: f64) -> f64 {
    (1.0 + r_annual).powf(1.0 / periods_per_year) - 1.0
}
