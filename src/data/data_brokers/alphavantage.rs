use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::save_api_result;
use crate::config::Settings;
use crate::data::{DataRequest, DataResult, HistoricalData, Record};
use crate::utils::parse_date;

/// Alpha Vantage fetcher
pub async fn fetch_data(settings: &Settings, request: &DataRequest) -> DataResult<HistoricalData> {
    let api_key = &settings.data_api.api_key;
    let timeframe = request.timeframe.as_str();

    let (function, time_series_key) = series_endpoint(timeframe)?;

    let client = Client::new();
    let mut all_records = Vec::new();

    for ticker in &request.tickers {
        let url = format!(
            "https://www.alphavantage.co/query?function={function}&symbol={symbol}&outputsize=full&apikey={apikey}",
            function = function,
            symbol = ticker,
            apikey = api_key
        );

        let resp = client.get(&url).send().await?.error_for_status()?;
        let json_val: Value = resp.json().await?;

        if settings.data_api.save_raw {
            save_api_result(&json_val, "alphavantage", ticker, timeframe)?;
        }

        let records = parse_series(&json_val, time_series_key, ticker, request)?;
        debug!(ticker = %ticker, records = records.len(), "alphavantage series parsed");
        all_records.extend(records);
    }

    Ok(all_records)
}

/// Query function and response key of the split/dividend adjusted series.
fn series_endpoint(timeframe: &str) -> DataResult<(&'static str, &'static str)> {
    match timeframe {
        "daily" => Ok(("TIME_SERIES_DAILY_ADJUSTED", "Time Series (Daily)")),
        "weekly" => Ok(("TIME_SERIES_WEEKLY_ADJUSTED", "Weekly Adjusted Time Series")),
        "monthly" => Ok(("TIME_SERIES_MONTHLY_ADJUSTED", "Monthly Adjusted Time Series")),
        _ => Err(format!("Unsupported timeframe: {}", timeframe).into()),
    }
}

fn parse_series(
    json_val: &Value,
    time_series_key: &str,
    ticker: &str,
    request: &DataRequest,
) -> DataResult<HistoricalData> {
    let series_obj = json_val[time_series_key].as_object().ok_or_else(|| {
        format!(
            "Could not parse time series JSON from Alpha Vantage for {}",
            ticker
        )
    })?;

    let mut records = Vec::new();
    for (date_str, values) in series_obj {
        let Ok(current_date) = parse_date(date_str) else {
            continue;
        };
        if !request.contains(current_date) {
            continue;
        }

        let close_val = values["5. adjusted close"]
            .as_str()
            .ok_or("Missing adjusted close value in JSON")?;

        records.push(Record {
            date: date_str.clone(),
            asset: ticker.to_string(),
            price: close_val.parse::<f64>()?,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn request() -> DataRequest {
        DataRequest {
            tickers: vec!["IBM".to_string()],
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            timeframe: "daily".to_string(),
        }
    }

    #[test]
    fn every_timeframe_queries_the_adjusted_series() {
        for timeframe in ["daily", "weekly", "monthly"] {
            let (function, _) = series_endpoint(timeframe).unwrap();
            assert!(function.ends_with("_ADJUSTED"), "{}", function);
        }
        assert!(series_endpoint("hourly").is_err());
    }

    #[test]
    fn adjusted_close_is_read_within_the_window() {
        let body = json!({
            "Time Series (Daily)": {
                "2024-01-05": {"4. close": "160.00", "5. adjusted close": "155.50"},
                "2024-01-04": {"4. close": "158.00", "5. adjusted close": "153.60"},
                "2023-12-29": {"4. close": "163.55", "5. adjusted close": "158.90"}
            }
        });
        let mut records = parse_series(&body, "Time Series (Daily)", "IBM", &request()).unwrap();
        records.sort_by(|a, b| a.date.cmp(&b.date));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, "2024-01-04");
        assert_eq!(records[0].price, 153.60);
        assert_eq!(records[1].price, 155.50);
    }

    #[test]
    fn missing_series_is_an_error() {
        let body = json!({"Note": "rate limited"});
        assert!(parse_series(&body, "Time Series (Daily)", "IBM", &request()).is_err());
    }
}
