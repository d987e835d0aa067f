pub mod alphavantage;
pub mod twelve;

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use serde_json::Value;
use tracing::debug;

use super::{DataRequest, DataResult, HistoricalData};
use crate::config::Settings;

pub async fn fetch_data(settings: &Settings, request: &DataRequest) -> DataResult<HistoricalData> {
    match settings.data_api.source.to_lowercase().as_str() {
        "alphavantage" => alphavantage::fetch_data(settings, request).await,
        "twelve" => twelve::fetch_data(settings, request).await,
        _ => Err("Unsupported data broker specified. Please open an issue, specifying your data broker and useful links.".into()),
    }
}

/// Saves the raw provider payload in
/// data/raw/{ticker}/{timeframe}/{today}/raw_{provider}.json
pub(crate) fn save_api_result(
    json_val: &Value,
    provider: &str,
    ticker: &str,
    timeframe: &str,
) -> DataResult<()> {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let dir_path: PathBuf = ["data", "raw", ticker, timeframe, &today].iter().collect();
    fs::create_dir_all(&dir_path)?;
    let file_path = dir_path.join(format!("raw_{}.json", provider));
    fs::write(&file_path, json_val.to_string())?;
    debug!(path = %file_path.display(), "saved raw provider response");
    Ok(())
}
