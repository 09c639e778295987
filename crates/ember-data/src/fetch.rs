//! Multi-ticker financial statement fetching.
//!
//! Fetches run as a bounded fan-out. Results are recombined in the order the
//! tickers were supplied, never in completion order, and the first failure
//! aborts the whole fetch. Per-ticker frames may carry different line items;
//! the combined frame holds the union of their columns, null where a ticker
//! did not report an item.

use crate::error::{DataError, Result};
use crate::provider::{DATE_COLUMN, FinancialsProvider};
use futures::stream::{self, StreamExt, TryStreamExt};
use polars::prelude::*;
use tracing::{info, warn};

/// Column holding the ticker symbol.
pub const TICKER_COLUMN: &str = "Ticker";

/// Default number of concurrent provider requests.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Options for [`fetch_all`].
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Maximum number of in-flight provider requests (1 = sequential).
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Fetch financials for every ticker and concatenate them.
///
/// # Returns
/// One frame holding each ticker's rows contiguously, tickers in the order
/// given, with a `Ticker` column last. Columns are the union of every
/// ticker's columns in first-seen order.
pub async fn fetch_all<P>(
    provider: &P,
    tickers: &[String],
    options: FetchOptions,
) -> Result<DataFrame>
where
    P: FinancialsProvider + ?Sized,
{
    fetch_all_with_progress(provider, tickers, options, |_| {}).await
}

/// Like [`fetch_all`], calling `on_fetched` after each ticker completes.
pub async fn fetch_all_with_progress<P, F>(
    provider: &P,
    tickers: &[String],
    options: FetchOptions,
    on_fetched: F,
) -> Result<DataFrame>
where
    P: FinancialsProvider + ?Sized,
    F: Fn(&str),
{
    if tickers.is_empty() {
        return Err(DataError::MissingData {
            symbol: "batch".to_string(),
            reason: "No tickers to fetch".to_string(),
        });
    }

    let concurrency = options.concurrency.max(1);
    info!(
        provider = provider.name(),
        tickers = tickers.len(),
        concurrency,
        "fetching financials"
    );

    let frames: Vec<LazyFrame> = stream::iter(tickers)
        .map(|ticker| async move {
            let df = provider
                .fetch_financials(ticker)
                .await
                .inspect_err(|e| warn!(ticker = %ticker, error = %e, "financials fetch failed"))?;
            let tagged = tag_ticker(df, ticker)?;
            Ok::<_, DataError>((ticker, tagged))
        })
        .buffered(concurrency)
        .map_ok(|(ticker, df)| {
            on_fetched(ticker.as_str());
            df.lazy()
        })
        .try_collect()
        .await?;

    let combined = concat_lf_diagonal(frames, UnionArgs::default())?
        .select([all().exclude([TICKER_COLUMN]), col(TICKER_COLUMN)])
        .collect()?;

    Ok(combined)
}

/// Append a `Ticker` column holding `ticker` on every row.
pub fn tag_ticker(mut df: DataFrame, ticker: &str) -> Result<DataFrame> {
    let ticker_col: Column = Series::new(TICKER_COLUMN.into(), vec![ticker; df.height()]).into();
    df.with_column(ticker_col)?;
    Ok(df)
}

/// Keep rows whose reporting year lies within `[start_year, end_year]`.
pub fn clip_to_years(df: DataFrame, start_year: i32, end_year: i32) -> Result<DataFrame> {
    let year = col(DATE_COLUMN).dt().year();
    let clipped = df
        .lazy()
        .filter(
            year.clone()
                .gt_eq(lit(start_year))
                .and(year.lt_eq(lit(end_year))),
        )
        .collect()?;

    Ok(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    fn statement(dates: &[i32], revenue: &[f64]) -> DataFrame {
        DataFrame::new(vec![
            Series::new(DATE_COLUMN.into(), dates.to_vec())
                .cast(&DataType::Date)
                .unwrap()
                .into(),
            Series::new("Total Revenue".into(), revenue.to_vec()).into(),
        ])
        .unwrap()
    }

    /// Returns canned frames; later tickers answer faster than earlier ones.
    struct CannedProvider {
        frames: HashMap<String, DataFrame>,
        delays: HashMap<String, u64>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FinancialsProvider for CannedProvider {
        async fn fetch_financials(&self, ticker: &str) -> Result<DataFrame> {
            self.calls.lock().unwrap().push(ticker.to_string());
            if let Some(ms) = self.delays.get(ticker) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            self.frames
                .get(ticker)
                .cloned()
                .ok_or_else(|| DataError::MissingData {
                    symbol: ticker.to_string(),
                    reason: "not canned".to_string(),
                })
        }
    }

    fn provider() -> CannedProvider {
        let mut frames = HashMap::new();
        // 18627 = 2020-12-31, 18261 = 2019-12-31
        frames.insert("AAA".to_string(), statement(&[18627, 18261], &[10.0, 9.0]));
        frames.insert("BBB".to_string(), statement(&[18627], &[20.0]));
        frames.insert("CCC".to_string(), statement(&[18261], &[30.0]));

        let mut delays = HashMap::new();
        delays.insert("AAA".to_string(), 60);
        delays.insert("BBB".to_string(), 30);

        CannedProvider {
            frames,
            delays,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn ticker_column(df: &DataFrame) -> Vec<String> {
        df.column(TICKER_COLUMN)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_ticker_order() {
        let provider = provider();
        let df = fetch_all(
            &provider,
            &tickers(&["AAA", "BBB", "CCC"]),
            FetchOptions { concurrency: 3 },
        )
        .await
        .unwrap();

        assert_eq!(df.height(), 4);
        assert_eq!(ticker_column(&df), vec!["AAA", "AAA", "BBB", "CCC"]);
        assert_eq!(
            df.get_column_names().last().unwrap().as_str(),
            TICKER_COLUMN
        );
    }

    #[tokio::test]
    async fn test_fetch_all_sequential() {
        let provider = provider();
        let df = fetch_all(
            &provider,
            &tickers(&["CCC", "AAA"]),
            FetchOptions { concurrency: 1 },
        )
        .await
        .unwrap();

        assert_eq!(ticker_column(&df), vec!["CCC", "AAA", "AAA"]);
        assert_eq!(*provider.calls.lock().unwrap(), vec!["CCC", "AAA"]);
    }

    #[tokio::test]
    async fn test_one_failure_aborts_fetch() {
        let provider = provider();
        let result = fetch_all(
            &provider,
            &tickers(&["AAA", "ZZZ", "CCC"]),
            FetchOptions::default(),
        )
        .await;

        match result {
            Err(DataError::MissingData { symbol, .. }) => assert_eq!(symbol, "ZZZ"),
            other => panic!("expected MissingData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_ticker_list() {
        let provider = provider();
        let result = fetch_all(&provider, &[], FetchOptions::default()).await;
        assert!(matches!(result, Err(DataError::MissingData { .. })));
    }

    #[tokio::test]
    async fn test_progress_callback_runs_per_ticker() {
        let provider = provider();
        let seen = Mutex::new(Vec::new());
        fetch_all_with_progress(
            &provider,
            &tickers(&["AAA", "BBB"]),
            FetchOptions::default(),
            |t| seen.lock().unwrap().push(t.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["AAA", "BBB"]);
    }

    #[tokio::test]
    async fn test_fetch_all_unions_differing_line_items() {
        let mut provider = provider();
        let with_net_income = statement(&[18627], &[10.0])
            .hstack(&[Series::new("Net Income".into(), vec![1.5]).into()])
            .unwrap();
        provider.frames.insert("AAA".to_string(), with_net_income);

        let df = fetch_all(
            &provider,
            &tickers(&["AAA", "BBB"]),
            FetchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
            vec!["Date", "Total Revenue", "Net Income", TICKER_COLUMN]
        );
        let net_income = df.column("Net Income").unwrap().f64().unwrap();
        assert_eq!(net_income.get(0), Some(1.5));
        assert_eq!(net_income.get(1), None);
        assert_eq!(ticker_column(&df), vec!["AAA", "BBB"]);
    }

    #[tokio::test]
    async fn test_fetch_all_new_columns_stay_before_ticker() {
        let mut provider = provider();
        let with_ebitda = statement(&[18627], &[20.0])
            .hstack(&[Series::new("EBITDA".into(), vec![4.0]).into()])
            .unwrap();
        provider.frames.insert("BBB".to_string(), with_ebitda);

        let df = fetch_all(
            &provider,
            &tickers(&["CCC", "BBB"]),
            FetchOptions { concurrency: 1 },
        )
        .await
        .unwrap();

        assert_eq!(
            df.get_column_names().last().unwrap().as_str(),
            TICKER_COLUMN
        );
        assert_eq!(df.column("EBITDA").unwrap().null_count(), 1);
    }

    #[test]
    fn test_clip_to_years() {
        let df = statement(&[18627, 18261, 17896], &[3.0, 2.0, 1.0]);
        let clipped = clip_to_years(df, 2019, 2020).unwrap();
        assert_eq!(clipped.height(), 2);
    }
}
