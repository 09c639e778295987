//! Financial statement provider abstraction.

use crate::error::Result;
use async_trait::async_trait;
use polars::prelude::DataFrame;

/// Column holding the reporting date in every financials frame.
pub const DATE_COLUMN: &str = "Date";

/// Column holding total revenue in every financials frame.
pub const TOTAL_REVENUE_COLUMN: &str = "Total Revenue";

/// A source of per-company financial statement time series.
///
/// Implementations return one row per reporting date, with a `Date` column
/// (polars `Date` dtype) followed by one `Float64` column per line item.
/// The frame must not carry a `Ticker` column; the fetcher adds it.
#[async_trait]
pub trait FinancialsProvider: Send + Sync {
    /// Fetch the full available statement history for `ticker`.
    async fn fetch_financials(&self, ticker: &str) -> Result<DataFrame>;

    /// Short provider name used in log lines.
    fn name(&self) -> &str {
        "financials"
    }
}
