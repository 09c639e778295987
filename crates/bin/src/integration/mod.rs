//! Pipeline wiring for the `ember` binary.
//!
//! Stages are composed from the library crates; this module only sequences
//! them and reports progress.

pub(crate) mod data_pipeline;
