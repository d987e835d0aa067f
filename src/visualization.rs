use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::{debug, info};

use crate::report::{PortfolioReport, PortfolioSummary};

pub type ChartResult<T> = Result<T, Box<dyn Error>>;

/// Files written by [`render_charts`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPaths {
    pub frontier: PathBuf,
    pub weights: PathBuf,
    pub cumulative: PathBuf,
    pub distribution: PathBuf,
}

const FRONTIER_SUFFIX: &str = "_efficient_frontier.png";
const WEIGHTS_SUFFIX: &str = "_portfolio.png";
const CUMULATIVE_SUFFIX: &str = "_cumulative_returns.png";
const DISTRIBUTION_SUFFIX: &str = "_portfolio_distribution.png";
const CHART_SUFFIXES: [&str; 4] = [
    FRONTIER_SUFFIX,
    WEIGHTS_SUFFIX,
    CUMULATIVE_SUFFIX,
    DISTRIBUTION_SUFFIX,
];

/// Render every chart of a report into `directory`, file names prefixed by
/// `stem`.
pub fn render_charts(report: &PortfolioReport, directory: &Path, stem: &str) -> ChartResult<ChartPaths> {
    std::fs::create_dir_all(directory)?;
    let paths = ChartPaths {
        frontier: directory.join(format!("{}{}", stem, FRONTIER_SUFFIX)),
        weights: directory.join(format!("{}{}", stem, WEIGHTS_SUFFIX)),
        cumulative: directory.join(format!("{}{}", stem, CUMULATIVE_SUFFIX)),
        distribution: directory.join(format!("{}{}", stem, DISTRIBUTION_SUFFIX)),
    };
    plot_efficient_frontier(report, &paths.frontier)?;
    plot_portfolio(&report.tickers, &report.max_sharpe.weights, &paths.weights)?;
    plot_cumulative_returns(report, &paths.cumulative)?;
    plot_return_distribution(
        &report.max_sharpe_returns,
        report.value_at_risk.var,
        report.value_at_risk.cvar,
        report.value_at_risk.confidence,
        &paths.distribution,
    )?;
    Ok(paths)
}

/// Delete all but the `keep` most recent chart sets in `directory`.
///
/// Sets are grouped by stem and ordered by it, so stems must sort
/// chronologically. Files that are not chart output are left alone. Returns
/// the number of sets removed.
pub fn prune_charts(directory: &Path, keep: usize) -> ChartResult<usize> {
    let mut stems = BTreeSet::new();
    for entry in std::fs::read_dir(directory)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(stem) = CHART_SUFFIXES.iter().find_map(|s| name.strip_suffix(s)) {
            stems.insert(stem.to_string());
        }
    }

    let excess = stems.len().saturating_sub(keep);
    for stem in stems.iter().take(excess) {
        for suffix in CHART_SUFFIXES {
            let path = directory.join(format!("{}{}", stem, suffix));
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        debug!(stem = %stem, "removed chart set");
    }
    Ok(excess)
}

/// (low, high) of the values with 10% padding; never an empty range.
fn padded_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.1).max(hi.abs().max(lo.abs()) * 0.05).max(1e-6);
    (lo - pad, hi + pad)
}

pub fn plot_efficient_frontier(report: &PortfolioReport, output_path: &Path) -> ChartResult<()> {
    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let named: [(&str, &PortfolioSummary, RGBColor); 4] = [
        ("Equal Weight", &report.normal_portfolio, MAGENTA),
        ("Min Volatility", &report.min_volatility, GREEN),
        ("Max Sharpe", &report.max_sharpe, RED),
        ("Max Return", &report.max_return, BLACK),
    ];

    let risks = report
        .portfolios_risk
        .iter()
        .chain(&report.frontier_x)
        .chain(named.iter().map(|(_, p, _)| &p.risk));
    let (_, x_max) = padded_range(risks);
    let returns = report
        .portfolios_return
        .iter()
        .chain(&report.frontier_y)
        .chain(named.iter().map(|(_, p, _)| &p.expected_return))
        .chain(std::iter::once(&report.risk_free_rate));
    let (y_min, y_max) = padded_range(returns);

    let mut chart = ChartBuilder::on(&root)
        .caption("Efficient Frontier", ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Standard Deviation (Risk)")
        .y_desc("Expected Return")
        .draw()?;

    chart
        .draw_series(
            report
                .portfolios_risk
                .iter()
                .zip(&report.portfolios_return)
                .map(|(&x, &y)| Circle::new((x, y), 2, BLUE.mix(0.3).filled())),
        )?
        .label("Random Portfolios")
        .legend(|(x, y)| Circle::new((x, y), 3, BLUE.filled()));

    chart
        .draw_series(LineSeries::new(
            report
                .frontier_x
                .iter()
                .zip(&report.frontier_y)
                .map(|(&x, &y)| (x, y)),
            BLUE.stroke_width(2),
        ))?
        .label("Efficient Frontier")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    // capital allocation line from (0, r_f) through the tangency portfolio
    let tangency = &report.max_sharpe;
    chart
        .draw_series(LineSeries::new(
            vec![
                (0.0, report.risk_free_rate),
                (tangency.risk, tangency.expected_return),
            ],
            BLACK,
        ))?
        .label("Capital Allocation Line")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

    for (label, p, color) in named {
        chart
            .draw_series(std::iter::once(Circle::new(
                (p.risk, p.expected_return),
                6,
                color.filled(),
            )))?
            .label(label)
            .legend(move |(x, y)| Circle::new((x, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    info!(path = %output_path.display(), "efficient frontier chart saved");
    Ok(())
}

pub fn plot_portfolio(asset_labels: &[String], weights: &[f64], output_path: &Path) -> ChartResult<()> {
    let root = BitMapBackend::new(output_path, (640, 480)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Portfolio Weights", ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d((0..weights.len()).into_segmented(), 0f64..1.05)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(weights.len())
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(idx) => asset_labels.get(*idx).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc("Assets")
        .y_desc("Weight")
        .draw()?;

    chart.draw_series(weights.iter().enumerate().map(|(i, &w)| {
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), w)],
            BLUE.filled(),
        );
        bar.set_margin(0, 0, 8, 8);
        bar
    }))?;

    root.present()?;
    info!(path = %output_path.display(), "portfolio weights chart saved");
    Ok(())
}

pub fn plot_cumulative_returns(report: &PortfolioReport, output_path: &Path) -> ChartResult<()> {
    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let n_periods = report
        .cumulative_returns
        .values()
        .map(|s| s.len())
        .max()
        .unwrap_or(0)
        .max(1);
    let (y_min, y_max) = padded_range(report.cumulative_returns.values().flatten());

    let mut chart = ChartBuilder::on(&root)
        .caption("Cumulative Returns", ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..n_periods, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Period")
        .y_desc("Cumulative Return")
        .y_label_formatter(&|y| format!("{:.1}%", y * 100.0))
        .draw()?;

    for (idx, (name, series)) in report.cumulative_returns.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(
                series.iter().enumerate().map(|(t, &c)| (t + 1, c)),
                color.stroke_width(2),
            ))?
            .label(name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    info!(path = %output_path.display(), "cumulative returns chart saved");
    Ok(())
}

pub fn plot_return_distribution(
    returns: &[f64],
    var: f64,
    cvar: f64,
    confidence: f64,
    output_path: &Path,
) -> ChartResult<()> {
    if returns.is_empty() {
        return Err("no returns to plot".into());
    }
    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let (min_return, max_return) = padded_range(returns.iter());

    let num_bins = 50;
    let bin_width = (max_return - min_return) / num_bins as f64;

    let mut bins = vec![0usize; num_bins];
    for r in returns {
        let bin = (((*r - min_return) / bin_width) as usize).min(num_bins - 1);
        bins[bin] += 1;
    }
    let max_count = bins.iter().copied().max().unwrap_or(1);

    let mut chart = ChartBuilder::on(&root)
        .caption("Portfolio Returns Distribution", ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(min_return..max_return, 0..max_count)?;

    chart
        .configure_mesh()
        .x_desc("Return")
        .y_desc("Frequency")
        .draw()?;

    chart.draw_series(bins.iter().enumerate().map(|(i, count)| {
        let x0 = min_return + i as f64 * bin_width;
        Rectangle::new([(x0, 0), (x0 + bin_width, *count)], BLUE.filled())
    }))?;

    let pct = confidence * 100.0;
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(var, 0), (var, max_count)],
            RED,
        )))?
        .label(format!("VaR({:.0}%): {:.2}%", pct, var * 100.0))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(cvar, 0), (cvar, max_count)],
            BLACK,
        )))?
        .label(format!("CVaR({:.0}%): {:.2}%", pct, cvar * 100.0))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

    chart.configure_series_labels().border_style(BLACK).draw()?;

    root.present()?;
    info!(path = %output_path.display(), "return distribution chart saved");
    Ok(())
}
