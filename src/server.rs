//! HTTP transport: one JSON endpoint plus the rendered charts.

use std::collections::HashSet;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::config::Settings;
use crate::data::{fetch_data, DataRequest, PriceTable};
use crate::error::EngineError;
use crate::report::{build_report, PortfolioReport};
use crate::returns::ReturnsMatrix;
use crate::utils::parse_date;
use crate::visualization::{prune_charts, render_charts};

const MIN_TICKERS: usize = 2;
const MAX_TICKERS: usize = 10;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("data provider error: {0}")]
    Data(String),
    #[error("chart rendering failed: {0}")]
    Render(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Data(_) => StatusCode::BAD_GATEWAY,
            ApiError::Render(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            info!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontierRequest {
    pub tickers: Vec<String>,
    /// `[start, end]` as `YYYY-MM-DD`.
    pub date_range: [String; 2],
    #[serde(default)]
    pub seed: Option<u64>,
}

impl FrontierRequest {
    /// Normalize tickers and check the request before anything is fetched.
    pub fn validate(&self, timeframe: &str) -> Result<DataRequest, ApiError> {
        let tickers: Vec<String> = self
            .tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .collect();
        if tickers.iter().any(|t| t.is_empty()) {
            return Err(ApiError::Validation("empty ticker symbol".into()));
        }
        let distinct: HashSet<&String> = tickers.iter().collect();
        if distinct.len() != tickers.len() {
            return Err(ApiError::Validation("duplicate ticker symbols".into()));
        }
        if !(MIN_TICKERS..=MAX_TICKERS).contains(&tickers.len()) {
            return Err(ApiError::Validation(format!(
                "expected {} to {} tickers, got {}",
                MIN_TICKERS,
                MAX_TICKERS,
                tickers.len()
            )));
        }

        let parse = |s: &str| {
            parse_date(s).map_err(|e| ApiError::Validation(format!("bad date {:?}: {}", s, e)))
        };
        let start_date = parse(&self.date_range[0])?;
        let end_date = parse(&self.date_range[1])?;
        if start_date >= end_date {
            return Err(ApiError::Validation(format!(
                "start date {} is not before end date {}",
                start_date, end_date
            )));
        }

        Ok(DataRequest {
            tickers,
            start_date,
            end_date,
            timeframe: timeframe.to_lowercase(),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let charts = ServeDir::new(&state.settings.output.directory);
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/efficient_frontier", post(efficient_frontier))
        .nest_service("/charts", charts)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(settings: Settings, host: &str, port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = create_router(AppState {
        settings: Arc::new(settings),
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("listening on http://{}", addr);
    info!("  GET  /health");
    info!("  POST /efficient_frontier");
    info!("  GET  /charts/{{file}}");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn efficient_frontier(
    State(state): State<AppState>,
    Json(body): Json<FrontierRequest>,
) -> Result<Json<PortfolioReport>, ApiError> {
    let request = body.validate(&state.settings.data_api.timeframe)?;
    info!(tickers = ?request.tickers, start = %request.start_date, end = %request.end_date, "efficient frontier requested");

    let table = fetch_data(&state.settings, &request)
        .await
        .map_err(|e| ApiError::Data(e.to_string()))?;

    let settings = state.settings.clone();
    let seed = body.seed.or(settings.portfolio_optimization.seed);
    let report = tokio::task::spawn_blocking(move || analyze(&table, &settings, seed))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(report))
}

/// Optimize one aligned price table and render its charts when enabled.
pub fn analyze(table: &PriceTable, settings: &Settings, seed: Option<u64>) -> Result<PortfolioReport, ApiError> {
    let returns = ReturnsMatrix::from_prices(table)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut report = build_report(&returns, &settings.report_settings(), &mut rng)?;

    if settings.output.render_charts {
        let directory = Path::new(&settings.output.directory);
        let stem = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let paths = render_charts(&report, directory, &stem)
            .map_err(|e| ApiError::Render(e.to_string()))?;
        report.image_path = Some(chart_url(&paths.frontier));
        report.cumulative_image_path = Some(chart_url(&paths.cumulative));

        if settings.output.max_chart_sets > 0 {
            let removed = prune_charts(directory, settings.output.max_chart_sets)
                .map_err(|e| ApiError::Render(e.to_string()))?;
            if removed > 0 {
                info!(removed, kept = settings.output.max_chart_sets, "old chart sets pruned");
            }
        }
    }
    Ok(report)
}

fn chart_url(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/charts/{}", file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn request(tickers: &[&str], start: &str, end: &str) -> FrontierRequest {
        FrontierRequest {
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            date_range: [start.to_string(), end.to_string()],
            seed: None,
        }
    }

    #[test]
    fn accepts_a_well_formed_request() {
        let r = request(&[" aapl", "MSFT"], "2023-01-01", "2023-12-31")
            .validate("Daily")
            .unwrap();
        assert_eq!(r.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(r.timeframe, "daily");
    }

    #[test]
    fn rejects_bad_requests() {
        let cases = [
            request(&["AAPL"], "2023-01-01", "2023-12-31"),
            request(&["AAPL", "aapl"], "2023-01-01", "2023-12-31"),
            request(&["AAPL", ""], "2023-01-01", "2023-12-31"),
            request(&["AAPL", "MSFT"], "2023-12-31", "2023-01-01"),
            request(&["AAPL", "MSFT"], "2023-01-01", "yesterday"),
            request(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K"], "2023-01-01", "2023-12-31"),
        ];
        for case in cases {
            assert!(matches!(case.validate("daily"), Err(ApiError::Validation(_))), "{:?}", case);
        }
    }

    #[test]
    fn request_body_deserializes() {
        let body = r#"{"tickers": ["AAPL", "MSFT"], "date_range": ["2023-01-01", "2023-06-30"]}"#;
        let req: FrontierRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.seed, None);
        assert_eq!(req.date_range[1], "2023-06-30");
    }

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(EngineError::insufficient_data("x")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::Data("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::Render("x".into()).into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn analyze_without_charts_is_seeded() {
        let mut settings = Settings::default();
        settings.output.render_charts = false;
        settings.portfolio_optimization.samples = 20;
        let prices = Array2::from_shape_fn((30, 2), |(t, i)| {
            100.0 + t as f64 * (1.0 + i as f64) + if t % 3 == i { 2.0 } else { 0.0 }
        });
        let table = PriceTable {
            dates: (0..30).map(|d| format!("2024-01-{:02}", d + 1)).collect(),
            tickers: vec!["AAA".into(), "BBB".into()],
            prices,
        };
        let a = analyze(&table, &settings, Some(5)).unwrap();
        let b = analyze(&table, &settings, Some(5)).unwrap();
        assert_eq!(a, b);
        assert!(a.image_path.is_none());
    }
}
