//! Maximum Sharpe ratio portfolio.
//!
//! max (mean'w - r_f) / sqrt(w'Σw)  s.t. Σw = 1, 0 <= w <= 1
//!
//! When at least one asset beats the risk-free rate the ratio is maximized
//! exactly through the homogenized problem
//!
//! min y'Σy  s.t. (mean - r_f)'y = e, y >= 0,  w = y / Σy
//!
//! which is a convex QP. Any e > 0 gives the same w; the largest asset excess
//! is used so y stays on the scale of a weight vector. Otherwise every feasible ratio is non-positive, the
//! homogenization does not apply, and a Nelder-Mead search over a softmax
//! parametrization of the simplex is used instead.

use argmin::core::{CostFunction, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use ndarray::{Array1, Array2};
use tracing::debug;

use super::qp::{QpStatus, QuadraticProgram};
use super::SolverSettings;
use crate::error::{EngineError, EngineResult};
use crate::moments::MomentEstimate;
use crate::portfolio::{Portfolio, WeightVector};

const SOLVER: &str = "max-sharpe";

/// Relative to the riskiest single asset, below this a portfolio is riskless.
pub const DEGENERATE_RISK_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct SharpePortfolio {
    pub portfolio: Portfolio,
    pub sharpe_ratio: f64,
}

pub fn max_sharpe(
    moments: &MomentEstimate,
    risk_free_rate: f64,
    settings: &SolverSettings,
) -> EngineResult<SharpePortfolio> {
    let n = moments.n_assets();
    if n < 2 {
        return Err(EngineError::insufficient_data(format!(
            "need at least 2 assets, got {}",
            n
        )));
    }

    let excess = moments.mean.mapv(|mu| mu - risk_free_rate);
    let weights = if excess.iter().any(|&e| e > 0.0) {
        solve_homogenized(moments, &excess, settings)?
    } else {
        debug!("no asset beats the risk-free rate, falling back to nelder-mead");
        solve_nelder_mead(moments, risk_free_rate, settings)?
    };

    let portfolio = Portfolio::evaluate(weights, moments);
    let risk = portfolio.point.risk;
    if risk <= DEGENERATE_RISK_TOLERANCE * moments.max_asset_risk() {
        return Err(EngineError::DegenerateRisk {
            operation: SOLVER,
            risk,
        });
    }
    let sharpe_ratio = (portfolio.point.expected_return - risk_free_rate) / risk;

    Ok(SharpePortfolio {
        portfolio,
        sharpe_ratio,
    })
}

fn solve_homogenized(
    moments: &MomentEstimate,
    excess: &Array1<f64>,
    settings: &SolverSettings,
) -> EngineResult<WeightVector> {
    let n = moments.n_assets();
    let best_excess = excess.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let solution = QuadraticProgram::new(&moments.covariance * 2.0, Array1::zeros(n))
        .with_equality(&excess.to_vec(), best_excess)
        .with_bounds(0.0, f64::INFINITY)
        .solve(settings);
    if solution.status != QpStatus::Solved {
        debug!(status = ?solution.status, "homogenized sharpe solve failed");
        return Err(EngineError::diverged(SOLVER, solution.iterations));
    }

    let y: Vec<f64> = solution.x.iter().map(|v| v.max(0.0)).collect();
    let total: f64 = y.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(EngineError::diverged(SOLVER, solution.iterations));
    }
    let w: Vec<f64> = y.iter().map(|v| v / total).collect();
    WeightVector::from_solution(&w)
}

struct NegativeSharpe {
    mean: Array1<f64>,
    covariance: Array2<f64>,
    risk_free_rate: f64,
}

impl CostFunction for NegativeSharpe {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let w = softmax(x);
        let ret = w.dot(&self.mean);
        let var = w.dot(&self.covariance.dot(&w)).max(0.0);
        if var <= 0.0 {
            return Ok(f64::MAX);
        }
        Ok(-(ret - self.risk_free_rate) / var.sqrt())
    }
}

fn softmax(x: &[f64]) -> Array1<f64> {
    let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps = Array1::from_iter(x.iter().map(|&v| (v - max_x).exp()));
    let sum = exps.sum();
    exps / sum
}

fn solve_nelder_mead(
    moments: &MomentEstimate,
    risk_free_rate: f64,
    settings: &SolverSettings,
) -> EngineResult<WeightVector> {
    let n = moments.n_assets();
    let cost = NegativeSharpe {
        mean: moments.mean.clone(),
        covariance: moments.covariance.clone(),
        risk_free_rate,
    };

    // the origin maps to equal weights
    let x0 = vec![0.0; n];
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
        let mut point = x0.clone();
        point[i] = 1.0;
        simplex.push(point);
    }

    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(1e-12)
        .map_err(|_| EngineError::diverged(SOLVER, 0))?;
    let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(settings.nelder_mead_iterations))
        .run()
        .map_err(|_| EngineError::diverged(SOLVER, 0))?;

    let iterations = res.state.get_iter();
    // corner optima push the softmax parameters outward without converging
    if matches!(
        res.state.get_termination_reason(),
        Some(TerminationReason::MaxItersReached)
    ) {
        debug!(iterations, "nelder-mead budget exhausted, keeping best vertex");
    }
    if !res.state.get_best_cost().is_finite() {
        return Err(EngineError::diverged(SOLVER, iterations));
    }
    let best = res
        .state
        .best_param
        .ok_or_else(|| EngineError::diverged(SOLVER, iterations))?;
    WeightVector::from_solution(&softmax(&best).to_vec())
}
