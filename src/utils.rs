use std::path::Path;

use chrono::{NaiveDate, ParseError};
use csv::WriterBuilder;

use crate::data::{DataResult, PriceTable};

/// Writes an aligned price table to CSV: `date` then one column per ticker.
pub fn write_to_csv(table: &PriceTable, output_path: &Path) -> DataResult<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(output_path)?;

    let mut header = vec!["date".to_string()];
    header.extend(table.tickers.iter().cloned());
    wtr.write_record(&header)?;

    for (date, prices) in table.dates.iter().zip(table.prices.rows()) {
        let mut row = vec![date.clone()];
        row.extend(prices.iter().map(|p| p.to_string()));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn parse_date(date_str: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{align_prices, read_csv, DataRequest};
    use ndarray::array;

    #[test]
    fn csv_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prices.csv");
        let table = PriceTable {
            dates: vec!["2024-01-02".into(), "2024-01-03".into()],
            tickers: vec!["MSFT".into(), "AAPL".into()],
            prices: array![[370.5, 185.25], [371.0, 184.0]],
        };
        write_to_csv(&table, &path).unwrap();

        let request = DataRequest {
            tickers: table.tickers.clone(),
            start_date: parse_date("2024-01-01").unwrap(),
            end_date: parse_date("2024-01-31").unwrap(),
            timeframe: "daily".into(),
        };
        let records = read_csv(path.to_str().unwrap(), &request).unwrap();
        assert_eq!(align_prices(&records, &table.tickers).unwrap(), table);
    }

    #[test]
    fn parses_iso_dates_only() {
        assert!(parse_date("2024-02-29").is_ok());
        assert!(parse_date("02/29/2024").is_err());
    }
}
