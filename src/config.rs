use config::{Config, File};
use serde::Deserialize;

use crate::optimization::{annual_to_periodic_rate, FrontierGrid, OptimizationSettings, SolverSettings};
use crate::report::ReportSettings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: General,
    pub data_api: DataAPI,
    pub portfolio_optimization: PortfolioOptimization,
    pub output: Output,
    pub server: Server,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct General {
    /// `csv` or `api`
    pub data_source: String,
    pub data_file: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            data_source: "api".to_string(),
            data_file: "data/prices.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataAPI {
    pub source: String,
    pub api_key: String,
    pub tickers: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub timeframe: String,
    pub save_raw: bool,
}

impl Default for DataAPI {
    fn default() -> Self {
        Self {
            source: "alphavantage".to_string(),
            api_key: String::new(),
            tickers: Vec::new(),
            start_date: String::new(),
            end_date: String::new(),
            timeframe: "daily".to_string(),
            save_raw: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortfolioOptimization {
    /// Annual rate; converted to the return frequency before use.
    pub risk_free_rate: f64,
    pub frontier_points: usize,
    pub frontier_grid: FrontierGrid,
    pub samples: usize,
    pub seed: Option<u64>,
    pub parallel_frontier: bool,
    pub var_confidence: f64,
    pub solver: SolverSettings,
}

impl Default for PortfolioOptimization {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            frontier_points: 50,
            frontier_grid: FrontierGrid::default(),
            samples: 1500,
            seed: None,
            parallel_frontier: false,
            var_confidence: 0.95,
            solver: SolverSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Output {
    pub directory: String,
    pub render_charts: bool,
    /// Chart sets kept on disk; older ones are deleted after each render.
    /// Zero keeps everything.
    pub max_chart_sets: usize,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            directory: "charts".to_string(),
            render_charts: true,
            max_chart_sets: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            // api key usually comes from .env
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    /// Return periods per year for the configured timeframe.
    pub fn periods_per_year(&self) -> f64 {
        match self.data_api.timeframe.to_lowercase().as_str() {
            "weekly" => 52.0,
            "monthly" => 12.0,
            _ => 252.0,
        }
    }

    pub fn optimization_settings(&self) -> OptimizationSettings {
        let po = &self.portfolio_optimization;
        OptimizationSettings {
            risk_free_rate: annual_to_periodic_rate(po.risk_free_rate, self.periods_per_year()),
            frontier_points: po.frontier_points,
            frontier_grid: po.frontier_grid,
            parallel_frontier: po.parallel_frontier,
            solver: po.solver.clone(),
        }
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            optimization: self.optimization_settings(),
            samples: self.portfolio_optimization.samples,
            var_confidence: self.portfolio_optimization.var_confidence,
        }
    }
}
