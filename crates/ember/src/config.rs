//! Run configuration: the company universe and the reporting period.
//!
//! The configuration file is YAML:
//!
//! ```yaml
//! companies:
//!   - name: Acme
//!     ticker: ACM
//! period:
//!   start: 2019
//!   end: "2021-12-31"
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file does not exist.
    #[error("Configuration file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Configuration content is malformed or has the wrong shape.
    #[error("Malformed configuration in {}: {source}", path.display())]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// IO error while reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A configured company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Display name as it appears in the emissions table.
    pub name: String,
    /// Ticker symbol.
    pub ticker: String,
}

impl Company {
    /// Create a new company.
    pub fn new(name: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ticker: ticker.into(),
        }
    }
}

/// Ordered company name to ticker mapping.
///
/// Ticker uniqueness is assumed, not enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyMapping {
    companies: Vec<Company>,
}

impl CompanyMapping {
    /// Create a mapping from companies, keeping their order.
    pub const fn new(companies: Vec<Company>) -> Self {
        Self { companies }
    }

    /// Get all companies.
    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    /// Get all tickers, in configuration order.
    pub fn tickers(&self) -> Vec<String> {
        self.companies.iter().map(|c| c.ticker.clone()).collect()
    }

    /// Build the company name to ticker lookup used to filter emissions.
    ///
    /// On duplicate names the last entry wins.
    pub fn name_to_ticker(&self) -> HashMap<String, String> {
        self.companies
            .iter()
            .map(|c| (c.name.clone(), c.ticker.clone()))
            .collect()
    }

    /// Number of configured companies.
    pub fn len(&self) -> usize {
        self.companies.len()
    }

    /// Whether no companies are configured.
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

/// One end of the reporting period: a bare year or a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodBound {
    /// A calendar year, e.g. `2019`.
    Year(i32),
    /// A calendar date, e.g. `2019-01-01`.
    Date(NaiveDate),
}

impl PeriodBound {
    /// Calendar year of this bound.
    pub fn year(&self) -> i32 {
        match self {
            Self::Year(year) => *year,
            Self::Date(date) => date.year(),
        }
    }
}

impl fmt::Display for PeriodBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::Date(date) => write!(f, "{date}"),
        }
    }
}

/// Reporting period bounding the requested data window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Start of the period.
    pub start: PeriodBound,
    /// End of the period.
    pub end: PeriodBound,
}

impl Period {
    /// Whether `year` lies within `[start.year(), end.year()]`.
    pub fn contains_year(&self, year: i32) -> bool {
        (self.start.year()..=self.end.year()).contains(&year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// Parsed run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Companies to process.
    pub companies: CompanyMapping,
    /// Reporting period.
    pub period: Period,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// - [`ConfigError::NotFound`] if `path` does not exist
    /// - [`ConfigError::Parse`] if the content is malformed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, path)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Path::new("<inline>"))
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Tickers of all configured companies, in configuration order.
    pub fn tickers(&self) -> Vec<String> {
        self.companies.tickers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAMPLE: &str = "
companies:
  - name: Acme
    ticker: ACM
  - name: Globex Corporation
    ticker: GBX
  - name: Initech
    ticker: INT
period:
  start: 2019
  end: 2021
";

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.companies.len(), 3);
        assert_eq!(config.tickers(), vec!["ACM", "GBX", "INT"]);
        assert_eq!(config.period.start, PeriodBound::Year(2019));
        assert_eq!(config.period.end.year(), 2021);
    }

    #[test]
    fn test_name_to_ticker() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();
        let map = config.companies.name_to_ticker();

        assert_eq!(map.get("Globex Corporation").map(String::as_str), Some("GBX"));
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("Acme").map(String::as_str), Some("ACM"));
        assert!(!map.contains_key("Nobody"));
    }

    #[test]
    fn test_date_bounds() {
        let config = Config::from_yaml_str(
            "companies: []\nperiod:\n  start: 2019-01-01\n  end: \"2021-06-30\"\n",
        )
        .unwrap();

        assert!(config.companies.is_empty());
        assert_eq!(
            config.period.start,
            PeriodBound::Date(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap())
        );
        assert_eq!(config.period.end.year(), 2021);
        assert_eq!(config.period.to_string(), "2019-01-01 → 2021-06-30");
    }

    #[rstest]
    #[case(2018, false)]
    #[case(2019, true)]
    #[case(2021, true)]
    #[case(2022, false)]
    fn test_contains_year(#[case] year: i32, #[case] expected: bool) {
        let period = Period {
            start: PeriodBound::Year(2019),
            end: PeriodBound::Year(2021),
        };
        assert_eq!(period.contains_year(year), expected);
    }

    #[rstest]
    #[case::missing_period("companies:\n  - name: Acme\n    ticker: ACM\n")]
    #[case::missing_companies("period:\n  start: 2019\n  end: 2021\n")]
    #[case::missing_ticker("companies:\n  - name: Acme\nperiod:\n  start: 2019\n  end: 2021\n")]
    #[case::not_yaml("companies: [unterminated\n")]
    fn test_malformed(#[case] contents: &str) {
        let result = Config::from_yaml_str(contents);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_not_found() {
        let result = Config::load("definitely/not/here/config.yaml");
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("ember_config_test.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.tickers(), vec!["ACM", "GBX", "INT"]);

        std::fs::remove_file(path).ok();
    }
}
