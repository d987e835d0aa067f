pub mod data_brokers;

use std::collections::BTreeMap;
use std::error::Error;

use chrono::NaiveDate;
use ndarray::Array2;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{DataAPI, Settings};
use crate::utils::parse_date;

/// Errors from the I/O glue. `Send + Sync` so they can cross task boundaries.
pub type DataError = Box<dyn Error + Send + Sync>;
pub type DataResult<T> = Result<T, DataError>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    pub date: String,
    pub asset: String,
    pub price: f64,
}

pub type HistoricalData = Vec<Record>;

/// Tickers and date window for one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequest {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub timeframe: String,
}

impl DataRequest {
    pub fn from_settings(data_api: &DataAPI) -> DataResult<Self> {
        Ok(Self {
            tickers: data_api.tickers.clone(),
            start_date: parse_date(&data_api.start_date)?,
            end_date: parse_date(&data_api.end_date)?,
            timeframe: data_api.timeframe.to_lowercase(),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Closing prices aligned on dates common to every ticker. Rows ascend by
/// date, columns follow the requested ticker order.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    pub dates: Vec<String>,
    pub tickers: Vec<String>,
    pub prices: Array2<f64>,
}

/// Inner-join provider records on date. Dates missing any ticker are dropped.
pub fn align_prices(data: &[Record], tickers: &[String]) -> DataResult<PriceTable> {
    let column: BTreeMap<&str, usize> = tickers
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let mut rows: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for record in data {
        let Some(&i) = column.get(record.asset.as_str()) else {
            continue;
        };
        if !record.price.is_finite() || record.price <= 0.0 {
            return Err(format!(
                "invalid price {} for {} on {}",
                record.price, record.asset, record.date
            )
            .into());
        }
        rows.entry(record.date.as_str())
            .or_insert_with(|| vec![None; tickers.len()])[i] = Some(record.price);
    }

    let total = rows.len();
    let complete: Vec<(&str, Vec<f64>)> = rows
        .into_iter()
        .filter_map(|(date, row)| row.into_iter().collect::<Option<Vec<f64>>>().map(|r| (date, r)))
        .collect();
    let dropped = total - complete.len();
    if dropped > 0 {
        warn!(dropped, kept = complete.len(), "dropped dates missing at least one ticker");
    }
    if complete.is_empty() {
        return Err(format!("no dates with prices for all of {:?}", tickers).into());
    }

    let dates = complete.iter().map(|(d, _)| d.to_string()).collect();
    let flat: Vec<f64> = complete.into_iter().flat_map(|(_, r)| r).collect();
    let prices = Array2::from_shape_vec((flat.len() / tickers.len(), tickers.len()), flat)?;

    Ok(PriceTable {
        dates,
        tickers: tickers.to_vec(),
        prices,
    })
}

/// Reads a wide CSV (`date` column, then one column per asset) into records
/// inside the requested window.
pub fn read_csv(path: &str, request: &DataRequest) -> DataResult<HistoricalData> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let mut data = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let date = record.get(0).ok_or("CSV row without a date column")?;
        match parse_date(date) {
            Ok(d) if request.contains(d) => {}
            _ => continue,
        }
        for (i, asset_name) in headers.iter().enumerate().skip(1) {
            // blank cells are gaps, not errors
            if let Some(Ok(price)) = record.get(i).map(|p| p.parse::<f64>()) {
                data.push(Record {
                    date: date.to_string(),
                    asset: asset_name.to_string(),
                    price,
                });
            }
        }
    }
    Ok(data)
}

/// Fetch from the configured source and align into a price table.
pub async fn fetch_data(settings: &Settings, request: &DataRequest) -> DataResult<PriceTable> {
    let records = match settings.general.data_source.as_str() {
        "csv" => read_csv(&settings.general.data_file, request)?,
        "api" => data_brokers::fetch_data(settings, request).await?,
        other => return Err(format!("Unknown data source specified: {}", other).into()),
    };
    let table = align_prices(&records, &request.tickers)?;
    info!(
        tickers = ?request.tickers,
        rows = table.dates.len(),
        source = %settings.general.data_source,
        "price history loaded"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rec(date: &str, asset: &str, price: f64) -> Record {
        Record {
            date: date.into(),
            asset: asset.into(),
            price,
        }
    }

    fn tickers(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aligns_on_common_dates_in_requested_order() {
        let data = vec![
            rec("2024-01-03", "AAA", 11.0),
            rec("2024-01-02", "BBB", 20.0),
            rec("2024-01-02", "AAA", 10.0),
            rec("2024-01-03", "BBB", 21.0),
            rec("2024-01-04", "AAA", 12.0),
            rec("2024-01-04", "ZZZ", 1.0),
        ];
        let table = align_prices(&data, &tickers(&["BBB", "AAA"])).unwrap();
        assert_eq!(table.dates, vec!["2024-01-02", "2024-01-03"]);
        assert_eq!(table.tickers, tickers(&["BBB", "AAA"]));
        assert_eq!(table.prices.row(0).to_vec(), vec![20.0, 10.0]);
        assert_eq!(table.prices.row(1).to_vec(), vec![21.0, 11.0]);
    }

    #[test]
    fn rejects_non_positive_prices_and_empty_joins() {
        let bad = vec![rec("2024-01-02", "AAA", -1.0)];
        assert!(align_prices(&bad, &tickers(&["AAA", "BBB"])).is_err());
        let disjoint = vec![rec("2024-01-02", "AAA", 1.0), rec("2024-01-03", "BBB", 1.0)];
        assert!(align_prices(&disjoint, &tickers(&["AAA", "BBB"])).is_err());
    }

    #[test]
    fn csv_reader_filters_window_and_skips_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date,AAA,BBB").unwrap();
        writeln!(file, "2023-12-29,9.0,19.0").unwrap();
        writeln!(file, "2024-01-02,10.0,").unwrap();
        writeln!(file, "2024-01-03,11.0,21.0").unwrap();
        file.flush().unwrap();

        let request = DataRequest {
            tickers: tickers(&["AAA", "BBB"]),
            start_date: parse_date("2024-01-01").unwrap(),
            end_date: parse_date("2024-12-31").unwrap(),
            timeframe: "daily".into(),
        };
        let records = read_csv(file.path().to_str().unwrap(), &request).unwrap();
        assert_eq!(records.len(), 3);
        let table = align_prices(&records, &request.tickers).unwrap();
        assert_eq!(table.dates, vec!["2024-01-03"]);
    }
}
