//! Yahoo Finance data providers.

pub mod financials;

pub use financials::{LINE_ITEMS, YahooFinancialsProvider, parse_timeseries};
