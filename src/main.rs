use std::error::Error;
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use frontier::config::Settings;
use frontier::data::{self, DataRequest};
use frontier::server::{analyze, run_server};
use frontier::utils::write_to_csv;

/// Mean-variance portfolio optimizer
#[derive(Parser, Debug)]
#[command(name = "frontier")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimize the portfolio described in the configuration file
    Run,
    /// Serve the efficient frontier endpoint
    Serve {
        /// Host address to bind to (defaults to the configured one)
        #[arg(short = 'H', long)]
        host: Option<String>,
        /// Port to listen on (defaults to the configured one)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "debug,tower_http=debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let settings = Settings::new().expect("Failed to load configuration");

    match args.command {
        Command::Run => run_once(settings).await,
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| settings.server.host.clone());
            let port = port.unwrap_or(settings.server.port);
            run_server(settings, &host, port).await
        }
    }
}

async fn run_once(settings: Settings) -> Result<(), Box<dyn Error + Send + Sync>> {
    let request = DataRequest::from_settings(&settings.data_api)?;
    let table = data::fetch_data(&settings, &request).await?;

    let today = Local::now().format("%Y-%m-%d").to_string();
    let output_path: PathBuf = Path::new("data/raw")
        .join(&today)
        .join(format!("hist_data_{}.csv", settings.data_api.source));
    write_to_csv(&table, &output_path)?;
    info!(path = %output_path.display(), "aligned prices exported");

    let seed = settings.portfolio_optimization.seed;
    let chart_dir = PathBuf::from(&settings.output.directory);
    let report = tokio::task::spawn_blocking(move || analyze(&table, &settings, seed)).await??;

    println!("Tickers = {:?}", report.tickers);
    for (name, p) in [
        ("Equal Weight", &report.normal_portfolio),
        ("Min Volatility", &report.min_volatility),
        ("Max Sharpe", &report.max_sharpe),
        ("Max Return", &report.max_return),
    ] {
        println!(
            "{:<15} return = {:.4}%  risk = {:.4}%  sharpe = {}  weights = {:.4?}",
            name,
            p.expected_return * 100.0,
            p.risk * 100.0,
            p.sharpe_ratio.map_or("n/a".to_string(), |s| format!("{:.4}", s)),
            p.weights
        );
    }
    println!("Frontier points = {}", report.frontier_x.len());
    let tail = &report.value_at_risk;
    println!("VaR({:.0}%) = {:.2}%", tail.confidence * 100.0, tail.var * 100.0);
    println!("CVaR({:.0}%) = {:.2}%", tail.confidence * 100.0, tail.cvar * 100.0);
    if let Some(url) = &report.image_path {
        let file = url.trim_start_matches("/charts/");
        println!("Efficient frontier chart: {}", chart_dir.join(file).display());
    }
    Ok(())
}
