//! # Price Tables
//!
//! $$
//! \text{date},\ p^{(1)}_t,\ \dots,\ p^{(N)}_t
//! $$
//!
//! Wide CSV loader: the first column is an ISO date, every further column is
//! one asset's closing price. Empty cells are missing observations.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use chrono::NaiveDate;

use crate::portfolio::PriceSeries;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn read_price_csv<P: AsRef<Path>>(path: P) -> Result<PriceSeries> {
  let path = path.as_ref();
  let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
  parse_price_csv(file).with_context(|| format!("failed to read prices from {}", path.display()))
}

/// Rows may come in any order; they are sorted by date. A repeated date is
/// an error.
pub fn parse_price_csv<R: Read>(reader: R) -> Result<PriceSeries> {
  let mut reader = csv::ReaderBuilder::new()
    .trim(csv::Trim::All)
    .from_reader(reader);

  let headers = reader.headers().context("failed to read CSV header")?.clone();
  if headers.len() < 2 {
    bail!("expected a date column followed by at least one asset column");
  }
  let assets: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

  let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
  for (idx, record) in reader.records().enumerate() {
    let line = idx + 2;
    let record = record.with_context(|| format!("malformed CSV record on line {line}"))?;
    if record.len() != headers.len() {
      bail!(
        "line {line}: {} fields, header has {}",
        record.len(),
        headers.len()
      );
    }

    let date = NaiveDate::parse_from_str(&record[0], DATE_FORMAT)
      .with_context(|| format!("line {line}: invalid date '{}'", &record[0]))?;
    let prices = record
      .iter()
      .skip(1)
      .zip(assets.iter())
      .map(|(cell, asset)| parse_price(cell).with_context(|| format!("line {line}: bad price for {asset}")))
      .collect::<Result<Vec<f64>>>()?;
    rows.push((date, prices));
  }

  rows.sort_by_key(|(date, _)| *date);
  if let Some(pair) = rows.windows(2).find(|pair| pair[0].0 == pair[1].0) {
    bail!("duplicate date {}", pair[0].0);
  }

  let timestamps: Vec<NaiveDate> = rows.iter().map(|(date, _)| *date).collect();
  let columns = assets
    .into_iter()
    .enumerate()
    .map(|(j, asset)| (asset, rows.iter().map(|(_, prices)| prices[j]).collect()))
    .collect();

  Ok(PriceSeries::new(timestamps, columns)?)
}

/// Empty cells and `NA`/`NaN` read as missing.
fn parse_price(cell: &str) -> Result<f64> {
  if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan") {
    return Ok(f64::NAN);
  }
  let price: f64 = cell.parse().with_context(|| format!("'{cell}' is not a number"))?;
  if price <= 0.0 {
    bail!("price {price} is not positive");
  }
  Ok(price)
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn reads_wide_table_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "date,AAA,BBB").unwrap();
    writeln!(file, "2024-01-03,101.0,").unwrap();
    writeln!(file, "2024-01-02,100.0,50.0").unwrap();
    writeln!(file, "2024-01-04,102.5,51.0").unwrap();

    let prices = read_price_csv(file.path()).unwrap();

    assert_eq!(prices.n_periods(), 3);
    assert_eq!(prices.universe().ids(), &["AAA".to_string(), "BBB".to_string()]);
    assert_eq!(
      prices.timestamps()[0],
      NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    );
    let bbb = prices.column("BBB").unwrap();
    assert_eq!(bbb[0], 50.0);
    assert!(bbb[1].is_nan());
  }

  #[test]
  fn duplicate_dates_are_rejected() {
    let csv = "date,AAA\n2024-01-02,1\n2024-01-02,2\n";
    let err = parse_price_csv(csv.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("duplicate date"));
  }

  #[test]
  fn non_numeric_price_names_the_line() {
    let csv = "date,AAA\n2024-01-02,1\n2024-01-03,abc\n";
    let err = parse_price_csv(csv.as_bytes()).unwrap_err();
    assert!(format!("{err:#}").contains("line 3"));
  }

  #[test]
  fn missing_file_has_context() {
    let err = read_price_csv("/definitely/not/here.csv").unwrap_err();
    assert!(err.to_string().contains("failed to open"));
  }
}
