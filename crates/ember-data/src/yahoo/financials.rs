//! Annual income statement fetching from Yahoo Finance.
//!
//! Uses the fundamentals-timeseries endpoint, which returns each line item
//! as its own series of `(asOfDate, reportedValue)` points. The series are
//! pivoted into one row per reporting date.

use crate::error::{DataError, Result};
use crate::provider::{DATE_COLUMN, FinancialsProvider, TOTAL_REVENUE_COLUMN};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use polars::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Yahoo Finance API base URL
const YAHOO_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Default minimum interval between requests
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(500);

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)";

/// Yahoo keeps no timeseries data older than this, so it bounds every query.
const HISTORY_START: (i32, u32, u32) = (2016, 12, 31);

/// Annual income statement line items: Yahoo series key, output column name.
///
/// Output columns follow this order. `Total Revenue` comes first and is the
/// only item emitted even when the response has no points for it.
pub const LINE_ITEMS: &[(&str, &str)] = &[
    ("TotalRevenue", "Total Revenue"),
    ("OperatingRevenue", "Operating Revenue"),
    ("CostOfRevenue", "Cost Of Revenue"),
    ("GrossProfit", "Gross Profit"),
    ("OperatingExpense", "Operating Expense"),
    (
        "SellingGeneralAndAdministration",
        "Selling General And Administration",
    ),
    ("ResearchAndDevelopment", "Research And Development"),
    ("OperatingIncome", "Operating Income"),
    ("InterestExpense", "Interest Expense"),
    ("PretaxIncome", "Pretax Income"),
    ("TaxProvision", "Tax Provision"),
    ("NetIncome", "Net Income"),
    (
        "NetIncomeCommonStockholders",
        "Net Income Common Stockholders",
    ),
    ("BasicEPS", "Basic EPS"),
    ("DilutedEPS", "Diluted EPS"),
    ("BasicAverageShares", "Basic Average Shares"),
    ("DilutedAverageShares", "Diluted Average Shares"),
    ("TotalExpenses", "Total Expenses"),
    ("EBIT", "EBIT"),
    ("EBITDA", "EBITDA"),
    ("NormalizedEBITDA", "Normalized EBITDA"),
    ("NormalizedIncome", "Normalized Income"),
    ("ReconciledCostOfRevenue", "Reconciled Cost Of Revenue"),
    ("ReconciledDepreciation", "Reconciled Depreciation"),
    ("TotalOperatingIncomeAsReported", "Total Operating Income As Reported"),
    (
        "NetIncomeFromContinuingOperationNetMinorityInterest",
        "Net Income From Continuing Operation Net Minority Interest",
    ),
    ("NetIncomeIncludingNoncontrollingInterests", "Net Income Including Noncontrolling Interests"),
    ("NetIncomeContinuousOperations", "Net Income Continuous Operations"),
    ("MinorityInterests", "Minority Interests"),
    ("OtherIncomeExpense", "Other Income Expense"),
    ("OtherNonOperatingIncomeExpenses", "Other Non Operating Income Expenses"),
    ("SpecialIncomeCharges", "Special Income Charges"),
    ("TotalUnusualItems", "Total Unusual Items"),
    ("TotalUnusualItemsExcludingGoodwill", "Total Unusual Items Excluding Goodwill"),
    ("TaxEffectOfUnusualItems", "Tax Effect Of Unusual Items"),
    ("TaxRateForCalcs", "Tax Rate For Calcs"),
    ("NetNonOperatingInterestIncomeExpense", "Net Non Operating Interest Income Expense"),
    ("InterestIncome", "Interest Income"),
    ("InterestIncomeNonOperating", "Interest Income Non Operating"),
    ("InterestExpenseNonOperating", "Interest Expense Non Operating"),
    ("NetInterestIncome", "Net Interest Income"),
    (
        "DepreciationAndAmortizationInIncomeStatement",
        "Depreciation And Amortization In Income Statement",
    ),
    (
        "DepreciationAmortizationDepletionIncomeStatement",
        "Depreciation Amortization Depletion Income Statement",
    ),
    ("SellingAndMarketingExpense", "Selling And Marketing Expense"),
    ("GeneralAndAdministrativeExpense", "General And Administrative Expense"),
    ("OtherGandA", "Other Gand A"),
    ("ExciseTaxes", "Excise Taxes"),
    ("DilutedNIAvailtoComStockholders", "Diluted NI Availto Com Stockholders"),
];

const ANNUAL_PREFIX: &str = "annual";

/// Keeps consecutive requests at least `min_interval` apart.
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// Yahoo Finance financial statement provider.
pub struct YahooFinancialsProvider {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    base_url: String,
}

impl YahooFinancialsProvider {
    /// Create a provider with the default request interval.
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(DEFAULT_RATE_LIMIT)
    }

    /// Create a provider with a custom minimum interval between requests.
    pub fn with_rate_limit(min_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(DataError::Network)?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(min_interval))),
            base_url: YAHOO_BASE_URL.to_string(),
        })
    }

    /// Point the provider at a different host (e.g. a local mirror).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn timeseries_url(&self, symbol: &str) -> Result<String> {
        let (y, m, d) = HISTORY_START;
        let period1 = NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| DataError::TimeConversion("invalid history start".to_string()))?;
        let period2 = Utc::now().timestamp();

        let types = LINE_ITEMS
            .iter()
            .map(|(key, _)| format!("{ANNUAL_PREFIX}{key}"))
            .collect::<Vec<_>>()
            .join(",");

        Ok(format!(
            "{}/ws/fundamentals-timeseries/v1/finance/timeseries/{symbol}?symbol={symbol}&type={types}&period1={period1}&period2={period2}",
            self.base_url
        ))
    }

    /// Fetch the annual income statement history for a single symbol.
    ///
    /// # Returns
    /// A DataFrame with a `Date` column, `Total Revenue`, then one column per
    /// other [`LINE_ITEMS`] entry the symbol reports, most recent reporting
    /// date first.
    ///
    /// # Errors
    /// Returns [`DataError::MissingData`] when Yahoo has no statement rows
    /// for the symbol.
    pub async fn fetch_statement(&self, symbol: &str) -> Result<DataFrame> {
        if symbol.trim().is_empty() {
            return Err(DataError::InvalidSymbol("Empty symbol".to_string()));
        }

        let url = self.timeseries_url(symbol)?;

        self.rate_limiter.lock().await.wait().await;

        debug!(symbol, "requesting yahoo financials");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(DataError::Network)?;

        if !response.status().is_success() {
            return Err(DataError::YahooApi(format!(
                "Failed to fetch financials for {}: HTTP {}",
                symbol,
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(DataError::Network)?;

        parse_timeseries(symbol, &body)
    }
}

#[async_trait]
impl FinancialsProvider for YahooFinancialsProvider {
    async fn fetch_financials(&self, ticker: &str) -> Result<DataFrame> {
        self.fetch_statement(ticker).await
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

impl std::fmt::Debug for YahooFinancialsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooFinancialsProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Pivot a fundamentals-timeseries response into one row per reporting date.
///
/// Only reported items become columns, so frames for different companies
/// may differ in width. `Total Revenue` is always present, null when the
/// company does not report it.
pub fn parse_timeseries(symbol: &str, body: &Value) -> Result<DataFrame> {
    let timeseries = body
        .get("timeseries")
        .ok_or_else(|| DataError::Parse("response has no `timeseries` field".to_string()))?;

    if let Some(error) = timeseries.get("error").filter(|e| !e.is_null()) {
        return Err(DataError::YahooApi(format!("{symbol}: {error}")));
    }

    let columns_by_key: HashMap<String, &str> = LINE_ITEMS
        .iter()
        .map(|(key, column)| (format!("{ANNUAL_PREFIX}{key}"), *column))
        .collect();

    let mut rows: BTreeMap<NaiveDate, HashMap<&str, f64>> = BTreeMap::new();

    let results = timeseries
        .get("result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for series in results {
        let Some(series_type) = series
            .pointer("/meta/type/0")
            .and_then(Value::as_str)
        else {
            continue;
        };
        let Some(column) = columns_by_key.get(series_type) else {
            continue;
        };
        let Some(points) = series.get(series_type).and_then(Value::as_array) else {
            continue;
        };

        for point in points.iter().filter(|p| !p.is_null()) {
            let as_of = point
                .get("asOfDate")
                .and_then(Value::as_str)
                .ok_or_else(|| DataError::Parse(format!("{symbol}: point without asOfDate")))?;
            let date = NaiveDate::parse_from_str(as_of, "%Y-%m-%d")
                .map_err(|e| DataError::Parse(format!("{symbol}: bad asOfDate `{as_of}`: {e}")))?;

            if let Some(value) = point.pointer("/reportedValue/raw").and_then(Value::as_f64) {
                rows.entry(date).or_default().insert(*column, value);
            } else {
                rows.entry(date).or_default();
            }
        }
    }

    if rows.is_empty() {
        return Err(DataError::MissingData {
            symbol: symbol.to_string(),
            reason: "No financial statements returned from Yahoo Finance".to_string(),
        });
    }

    statement_frame(rows.into_iter().rev())
}

/// Build a statement frame from `(date, line items)` rows, in the given order.
fn statement_frame<'a, I>(rows: I) -> Result<DataFrame>
where
    I: IntoIterator<Item = (NaiveDate, HashMap<&'a str, f64>)>,
{
    let rows: Vec<_> = rows.into_iter().collect();

    let days: Vec<i32> = rows
        .iter()
        .map(|(date, _)| days_since_epoch(*date))
        .collect::<Result<_>>()?;

    let mut columns: Vec<Column> = Vec::with_capacity(LINE_ITEMS.len() + 1);
    columns.push(
        Series::new(DATE_COLUMN.into(), days)
            .cast(&DataType::Date)?
            .into(),
    );
    for (_, column) in LINE_ITEMS {
        let values: Vec<Option<f64>> = rows
            .iter()
            .map(|(_, items)| items.get(column).copied())
            .collect();
        if *column != TOTAL_REVENUE_COLUMN && values.iter().all(Option::is_none) {
            continue;
        }
        columns.push(Series::new((*column).into(), values).into());
    }

    Ok(DataFrame::new(columns)?)
}

fn days_since_epoch(date: NaiveDate) -> Result<i32> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| DataError::TimeConversion("invalid epoch".to_string()))?;
    i32::try_from((date - epoch).num_days())
        .map_err(|e| DataError::TimeConversion(format!("{date}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn point(date: &str, raw: f64) -> Value {
        json!({
            "dataId": 20100,
            "asOfDate": date,
            "periodType": "12M",
            "currencyCode": "USD",
            "reportedValue": { "raw": raw, "fmt": "x" }
        })
    }

    fn response() -> Value {
        json!({
            "timeseries": {
                "result": [
                    {
                        "meta": { "symbol": ["ACM"], "type": ["annualTotalRevenue"] },
                        "timestamp": [1577750400, 1609372800],
                        "annualTotalRevenue": [
                            point("2019-12-31", 900000.0),
                            point("2020-12-31", 1000000.0)
                        ]
                    },
                    {
                        "meta": { "symbol": ["ACM"], "type": ["annualNetIncome"] },
                        "timestamp": [1609372800],
                        "annualNetIncome": [null, point("2020-12-31", 50000.0)]
                    },
                    {
                        "meta": { "symbol": ["ACM"], "type": ["annualSomethingElse"] },
                        "annualSomethingElse": [point("2018-12-31", 1.0)]
                    },
                    {
                        "meta": { "symbol": ["ACM"], "type": ["annualEBITDA"] }
                    }
                ],
                "error": null
            }
        })
    }

    #[test]
    fn test_parse_timeseries_pivots_by_date() {
        let df = parse_timeseries("ACM", &response()).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
            vec!["Date", "Total Revenue", "Net Income"]
        );
        assert_eq!(df.column("Date").unwrap().dtype(), &DataType::Date);

        // Most recent first
        let revenue = df.column("Total Revenue").unwrap().f64().unwrap();
        assert_relative_eq!(revenue.get(0).unwrap(), 1_000_000.0);
        assert_relative_eq!(revenue.get(1).unwrap(), 900_000.0);

        let net_income = df.column("Net Income").unwrap().f64().unwrap();
        assert_relative_eq!(net_income.get(0).unwrap(), 50_000.0);
        assert_eq!(net_income.get(1), None);

        // Declared but empty series are not emitted
        assert!(df.column("EBITDA").is_err());
    }

    #[test]
    fn test_parse_timeseries_keeps_revenue_column_when_unreported() {
        let body = json!({
            "timeseries": {
                "result": [{
                    "meta": { "symbol": ["BNK"], "type": ["annualNetInterestIncome"] },
                    "annualNetInterestIncome": [point("2021-12-31", 7.0)]
                }],
                "error": null
            }
        });

        let df = parse_timeseries("BNK", &body).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("Total Revenue").unwrap().null_count(), 1);
        let interest = df.column("Net Interest Income").unwrap().f64().unwrap();
        assert_relative_eq!(interest.get(0).unwrap(), 7.0);
    }

    #[test]
    fn test_parse_timeseries_empty_is_missing_data() {
        let body = json!({ "timeseries": { "result": [], "error": null } });
        let result = parse_timeseries("NOPE", &body);
        assert!(matches!(result, Err(DataError::MissingData { .. })));
    }

    #[test]
    fn test_parse_timeseries_api_error() {
        let body = json!({
            "timeseries": { "result": null, "error": { "code": "Not Found" } }
        });
        let result = parse_timeseries("NOPE", &body);
        assert!(matches!(result, Err(DataError::YahooApi(_))));
    }

    #[test]
    fn test_parse_timeseries_malformed() {
        let result = parse_timeseries("ACM", &json!({ "chart": {} }));
        assert!(matches!(result, Err(DataError::Parse(_))));
    }

    #[test]
    fn test_timeseries_url_lists_annual_items() {
        let provider = YahooFinancialsProvider::new()
            .unwrap()
            .with_base_url("http://localhost:1");
        let url = provider.timeseries_url("ACM").unwrap();

        assert!(url.starts_with("http://localhost:1/ws/fundamentals-timeseries/"));
        assert!(url.contains("annualTotalRevenue"));
        assert!(url.contains("period1=1483142400"));
    }

    #[tokio::test]
    async fn test_invalid_symbol() {
        let provider = YahooFinancialsProvider::new().unwrap();
        let result = provider.fetch_statement("").await;
        assert!(matches!(result, Err(DataError::InvalidSymbol(_))));
    }
}
