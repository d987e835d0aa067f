//! One optimization request end to end: returns in, serializable report out.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::error::EngineResult;
use crate::moments::MomentEstimate;
use crate::optimization::{optimize_portfolio, OptimizationSettings};
use crate::portfolio::{Portfolio, PortfolioPoint, WeightVector};
use crate::returns::{cumulative_returns, ReturnsMatrix};
use crate::risk::{tail_risk, TailRisk};
use crate::sampler::sample_portfolios;

/// Request-level knobs on top of the optimizer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSettings {
    pub optimization: OptimizationSettings,
    pub samples: usize,
    pub var_confidence: f64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            optimization: OptimizationSettings::default(),
            samples: 1500,
            var_confidence: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub weights: Vec<f64>,
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: Option<f64>,
}

impl PortfolioSummary {
    fn new(weights: &WeightVector, point: PortfolioPoint, risk_free_rate: f64) -> Self {
        Self {
            weights: weights.to_vec(),
            expected_return: point.expected_return,
            risk: point.risk,
            sharpe_ratio: point.sharpe_ratio(risk_free_rate),
        }
    }

    fn of(portfolio: &Portfolio, risk_free_rate: f64) -> Self {
        Self::new(&portfolio.weights, portfolio.point, risk_free_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioReport {
    pub tickers: Vec<String>,
    pub normal_portfolio: PortfolioSummary,
    pub min_volatility: PortfolioSummary,
    pub max_sharpe: PortfolioSummary,
    pub max_return: PortfolioSummary,
    pub frontier_x: Vec<f64>,
    pub frontier_y: Vec<f64>,
    pub frontier_weights: Vec<Vec<f64>>,
    pub portfolios_risk: Vec<f64>,
    pub portfolios_return: Vec<f64>,
    pub sampled_max_sharpe: Option<PortfolioSummary>,
    pub sampled_min_volatility: Option<PortfolioSummary>,
    pub value_at_risk: TailRisk,
    /// Compounded return path of each named portfolio, keyed like the
    /// portfolio fields above.
    pub cumulative_returns: BTreeMap<String, Vec<f64>>,
    pub image_path: Option<String>,
    /// URL of the cumulative-returns chart; clients load it from here rather
    /// than from a separate route.
    pub cumulative_image_path: Option<String>,
    /// Realized per-period returns of the max-Sharpe portfolio.
    #[serde(skip)]
    pub max_sharpe_returns: Vec<f64>,
    #[serde(skip)]
    pub risk_free_rate: f64,
}

/// Estimate moments, run every optimizer, sample the feasible cloud and
/// collect the supporting series. Chart paths are left empty for the caller.
pub fn build_report<R: Rng + ?Sized>(
    returns: &ReturnsMatrix,
    settings: &ReportSettings,
    rng: &mut R,
) -> EngineResult<PortfolioReport> {
    let moments = MomentEstimate::estimate(returns)?;
    let results = optimize_portfolio(&moments, &settings.optimization)?;
    let rf = settings.optimization.risk_free_rate;

    let cloud = sample_portfolios(&moments, settings.samples, rng);
    let sampled_max_sharpe = cloud
        .max_sharpe(rf)
        .map(|s| PortfolioSummary::new(&s.weights, s.point, rf));
    let sampled_min_volatility = cloud
        .min_risk()
        .map(|s| PortfolioSummary::new(&s.weights, s.point, rf));

    let max_sharpe_returns = returns
        .portfolio_returns(&results.max_sharpe.portfolio.weights)
        .to_vec();
    let value_at_risk = tail_risk(&max_sharpe_returns, settings.var_confidence)?;

    let named = [
        ("normal_portfolio", &results.equal_weight),
        ("min_volatility", &results.min_variance),
        ("max_sharpe", &results.max_sharpe.portfolio),
        ("max_return", &results.max_return),
    ];
    let cumulative = named
        .iter()
        .map(|(name, p)| {
            let series = returns.portfolio_returns(&p.weights).to_vec();
            (name.to_string(), cumulative_returns(&series))
        })
        .collect();

    info!(
        tickers = ?returns.tickers(),
        observations = returns.n_observations(),
        samples = cloud.len(),
        var = value_at_risk.var,
        "portfolio report built"
    );

    Ok(PortfolioReport {
        tickers: returns.tickers().to_vec(),
        normal_portfolio: PortfolioSummary::of(&results.equal_weight, rf),
        min_volatility: PortfolioSummary::of(&results.min_variance, rf),
        max_sharpe: PortfolioSummary::of(&results.max_sharpe.portfolio, rf),
        max_return: PortfolioSummary::of(&results.max_return, rf),
        frontier_x: results.frontier.risks(),
        frontier_y: results.frontier.returns(),
        frontier_weights: results.frontier.weights(),
        portfolios_risk: cloud.risks(),
        portfolios_return: cloud.returns(),
        sampled_max_sharpe,
        sampled_min_volatility,
        value_at_risk,
        cumulative_returns: cumulative,
        image_path: None,
        cumulative_image_path: None,
        max_sharpe_returns,
        risk_free_rate: rf,
    })
}
