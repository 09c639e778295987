#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ember/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod merge;

// Re-export main types from sub-crates
pub use ember_data as data;
pub use ember_output as output;

pub use config::{Company, CompanyMapping, Config, ConfigError, Period, PeriodBound};
pub use merge::{CO2_PER_REVENUE, INTENSITY_SCALE, MergeError, coverage, merge_and_derive};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
