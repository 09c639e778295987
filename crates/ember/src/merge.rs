//! Emissions / financials join and intensity derivation.
//!
//! Emissions rows are left-joined onto financial statements on
//! `(Ticker, Year)`, where the financial `Year` is the calendar year of the
//! reporting `Date`. Every emissions row survives the join; a `(Ticker, Year)`
//! with several statements produces one output row per statement.

use ember_data::emissions::columns::{TICKER, TOTAL_CO2_MT, YEAR};
use ember_data::provider::{DATE_COLUMN, TOTAL_REVENUE_COLUMN};
use ember_output::Coverage;
use polars::prelude::*;
use thiserror::Error;
use tracing::debug;

/// Name of the derived intensity column.
pub const CO2_PER_REVENUE: &str = "CO2_per_Revenue";

/// Megatons to tonnes.
pub const INTENSITY_SCALE: f64 = 1_000_000.0;

const ROW_INDEX: &str = "__emissions_row";
const FIN_ROW_INDEX: &str = "__financials_row";

/// Errors that can occur while merging.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A required column is absent.
    #[error("Missing column `{column}` in {frame} data")]
    MissingColumn {
        /// Column that was expected.
        column: &'static str,
        /// Which input lacked it.
        frame: &'static str,
    },

    /// Polars DataFrame error.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

fn require(df: &DataFrame, columns: &[&'static str], frame: &'static str) -> Result<()> {
    for &column in columns {
        if df.column(column).is_err() {
            return Err(MergeError::MissingColumn { column, frame });
        }
    }
    Ok(())
}

/// Join emissions onto financials and derive `CO2_per_Revenue`.
///
/// `CO2_per_Revenue = Total_CO2_Mt * 1e6 / Total Revenue`. Missing revenue
/// gives a null; zero revenue is left unguarded and gives an infinite (or
/// NaN) value.
///
/// # Returns
/// Emissions columns, then financial columns (join keys not repeated), then
/// `CO2_per_Revenue`. Rows follow the emissions order.
pub fn merge_and_derive(emissions: &DataFrame, financials: &DataFrame) -> Result<DataFrame> {
    require(emissions, &[TICKER, YEAR, TOTAL_CO2_MT], "emissions")?;
    require(
        financials,
        &[TICKER, DATE_COLUMN, TOTAL_REVENUE_COLUMN],
        "financials",
    )?;

    let financials = financials
        .clone()
        .lazy()
        .with_column(col(DATE_COLUMN).dt().year().alias(YEAR))
        .with_row_index(FIN_ROW_INDEX, None);

    let merged = emissions
        .clone()
        .lazy()
        .with_column(col(YEAR).cast(DataType::Int32))
        .with_row_index(ROW_INDEX, None)
        .join(
            financials,
            [col(TICKER), col(YEAR)],
            [col(TICKER), col(YEAR)],
            JoinArgs::new(JoinType::Left),
        )
        .sort(
            [ROW_INDEX, FIN_ROW_INDEX],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .with_column(
            (col(TOTAL_CO2_MT) * lit(INTENSITY_SCALE) / col(TOTAL_REVENUE_COLUMN))
                .alias(CO2_PER_REVENUE),
        )
        .collect()?
        .drop(ROW_INDEX)?
        .drop(FIN_ROW_INDEX)?;

    debug!(
        emissions_rows = emissions.height(),
        merged_rows = merged.height(),
        "merged emissions with financials"
    );

    Ok(merged)
}

/// Count unmatched rows and undefined intensities in a merged frame.
pub fn coverage(emissions_rows: usize, merged: &DataFrame) -> Result<Coverage> {
    require(merged, &[DATE_COLUMN, CO2_PER_REVENUE], "merged")?;

    let unmatched_rows = merged.column(DATE_COLUMN)?.null_count();
    let undefined_intensity_rows = merged
        .column(CO2_PER_REVENUE)?
        .f64()?
        .into_iter()
        .filter(|v| !v.is_some_and(f64::is_finite))
        .count();

    Ok(Coverage {
        emissions_rows,
        merged_rows: merged.height(),
        unmatched_rows,
        undefined_intensity_rows,
    })
}
