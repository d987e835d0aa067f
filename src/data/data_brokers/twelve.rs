use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::save_api_result;
use crate::config::Settings;
use crate::data::{DataRequest, DataResult, HistoricalData, Record};
use crate::utils::parse_date;

/// Fetch data from Twelve Data API
pub async fn fetch_data(settings: &Settings, request: &DataRequest) -> DataResult<HistoricalData> {
    let api_key = &settings.data_api.api_key;
    let timeframe = request.timeframe.as_str();

    let tf_twelve = match timeframe {
        "daily" => "1day",
        "weekly" => "1week",
        "monthly" => "1month",
        _ => return Err(format!("Unsupported timeframe: {}", timeframe).into()),
    };

    let base_url = "https://api.twelvedata.com/time_series";

    let client = Client::new();
    let mut all_records = Vec::new();

    for ticker in &request.tickers {
        let url = format!(
            "{}?symbol={}&interval={}&start_date={}&end_date={}&outputsize=5000&apikey={}",
            base_url, ticker, tf_twelve, request.start_date, request.end_date, api_key
        );

        let resp = client.get(&url).send().await?.error_for_status()?;
        let json_val: Value = resp.json().await?;

        if settings.data_api.save_raw {
            save_api_result(&json_val, "twelve", ticker, timeframe)?;
        }

        if json_val.get("status").and_then(|s| s.as_str()) == Some("error") {
            return Err(format!("Error from Twelve Data API for {}: {}", ticker, json_val).into());
        }

        let values = json_val
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or("Could not parse 'values' array from Twelve response")?;

        let before = all_records.len();
        for entry in values {
            let Some(datetime) = entry.get("datetime").and_then(|v| v.as_str()) else {
                continue;
            };
            // "2020-02-26" or "2020-02-26 15:59:00"
            let Some(date_part) = datetime.get(..10) else {
                continue;
            };
            let Ok(current_date) = parse_date(date_part) else {
                continue;
            };
            if !request.contains(current_date) {
                continue;
            }
            if let Some(close_str) = entry.get("close").and_then(|v| v.as_str()) {
                all_records.push(Record {
                    date: date_part.to_string(),
                    asset: ticker.to_string(),
                    price: close_str.parse::<f64>()?,
                });
            }
        }
        debug!(ticker = %ticker, records = all_records.len() - before, "twelve data series parsed");
    }

    Ok(all_records)
}
