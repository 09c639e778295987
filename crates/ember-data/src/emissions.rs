//! Low-granularity emissions loading.
//!
//! Reads the raw annual emissions table (one row per parent entity and year),
//! keeps only companies that appear in the configured company mapping and
//! projects the result to `(Ticker, Year, Total_CO2_Mt)`.

use crate::error::{DataError, Result};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Default location of the raw emissions table.
pub const DEFAULT_EMISSIONS_PATH: &str = "data/raw/emissions_low_granularity.csv";

/// Raw column holding the reporting year.
pub const RAW_YEAR: &str = "year";
/// Raw column holding the company display name.
pub const RAW_COMPANY: &str = "parent_entity";
/// Raw column holding total emissions in MtCO2e.
pub const RAW_TOTAL_EMISSIONS: &str = "total_emissions_MtCO2e";

/// Output column names.
pub mod columns {
    /// Ticker symbol.
    pub const TICKER: &str = "Ticker";
    /// Calendar year.
    pub const YEAR: &str = "Year";
    /// Company display name (renamed from `parent_entity`).
    pub const COMPANY: &str = "Company";
    /// Total emissions in megatons CO2-equivalent.
    pub const TOTAL_CO2_MT: &str = "Total_CO2_Mt";
}

/// One emissions observation for a configured company.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionRecord {
    /// Ticker the company maps to
    pub ticker: String,
    /// Reporting year
    pub year: i32,
    /// Total emissions in MtCO2e; `None` when the raw cell is empty
    pub total_co2_mt: Option<f64>,
}

impl EmissionRecord {
    /// Create a new emission record.
    pub fn new(ticker: impl Into<String>, year: i32, total_co2_mt: Option<f64>) -> Self {
        Self {
            ticker: ticker.into(),
            year,
            total_co2_mt,
        }
    }
}

/// Load emissions for the companies in `name_to_ticker`.
///
/// Rows whose company is not a key of the mapping are dropped silently.
/// Output order follows the input row order.
///
/// # Errors
/// - [`DataError::FileNotFound`] if `path` does not exist
/// - [`DataError::MissingColumn`] if a required raw column is absent
/// - [`DataError::Parse`] if a kept row has a malformed year or emissions value
pub fn load_emissions(
    path: impl AsRef<Path>,
    name_to_ticker: &HashMap<String, String>,
) -> Result<Vec<EmissionRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DataError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let reader = csv::Reader::from_path(path)?;
    read_emissions(reader, name_to_ticker, &path.display().to_string())
}

/// Load emissions from any CSV source.
///
/// Same semantics as [`load_emissions`], minus the file lookup.
pub fn read_emissions<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    name_to_ticker: &HashMap<String, String>,
    source_name: &str,
) -> Result<Vec<EmissionRecord>> {
    let headers = reader.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DataError::MissingColumn {
                column: name.to_string(),
                source_name: source_name.to_string(),
            })
    };
    let year_idx = find(RAW_YEAR)?;
    let company_idx = find(RAW_COMPANY)?;
    let emissions_idx = find(RAW_TOTAL_EMISSIONS)?;

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let company = record.get(company_idx).unwrap_or_default();

        let Some(ticker) = name_to_ticker.get(company) else {
            dropped += 1;
            continue;
        };

        // +2: header line plus one-based numbering
        let line = row + 2;
        let year = parse_year(record.get(year_idx).unwrap_or_default(), line)?;
        let total = parse_optional_f64(record.get(emissions_idx).unwrap_or_default(), line)?;

        records.push(EmissionRecord::new(ticker.clone(), year, total));
    }

    debug!(
        source = source_name,
        kept = records.len(),
        dropped,
        "loaded emissions"
    );

    Ok(records)
}

/// Convert emission records into a DataFrame with columns
/// `Ticker`, `Year`, `Total_CO2_Mt`.
pub fn emissions_frame(records: &[EmissionRecord]) -> Result<DataFrame> {
    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    let years: Vec<i32> = records.iter().map(|r| r.year).collect();
    let totals: Vec<Option<f64>> = records.iter().map(|r| r.total_co2_mt).collect();

    let df = DataFrame::new(vec![
        Series::new(columns::TICKER.into(), tickers).into(),
        Series::new(columns::YEAR.into(), years).into(),
        Series::new(columns::TOTAL_CO2_MT.into(), totals).into(),
    ])?;

    Ok(df)
}

fn parse_year(raw: &str, line: usize) -> Result<i32> {
    let raw = raw.trim();
    if let Ok(year) = raw.parse::<i32>() {
        return Ok(year);
    }
    // Tables re-exported by dataframe tools sometimes write years as floats
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i32),
        _ => Err(DataError::Parse(format!(
            "line {line}: invalid {RAW_YEAR} value `{raw}`"
        ))),
    }
}

fn parse_optional_f64(raw: &str, line: usize) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| {
        DataError::Parse(format!(
            "line {line}: invalid {RAW_TOTAL_EMISSIONS} value `{raw}`"
        ))
    })
}
