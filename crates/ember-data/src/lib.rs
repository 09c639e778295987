#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ember/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod emissions;
pub mod error;
pub mod fetch;
pub mod provider;
pub mod yahoo;

pub use emissions::{EmissionRecord, emissions_frame, load_emissions};
pub use error::{DataError, Result};
pub use fetch::{FetchOptions, clip_to_years, fetch_all, fetch_all_with_progress};
pub use provider::FinancialsProvider;

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
