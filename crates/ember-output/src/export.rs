//! Artifact export for ember record sets.
//!
//! Record sets are polars DataFrames. CSV is the artifact format; JSON is
//! available for ad-hoc inspection. Missing values are written as empty
//! cells in CSV and `null` in JSON.

use polars::prelude::*;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Polars serialization error.
    #[error("Serialization error: {0}")]
    Polars(#[from] PolarsError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Output was not valid UTF-8.
    #[error("Invalid UTF-8 in exported data: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Comma-separated values format.
    #[default]
    Csv,

    /// JSON array of row objects.
    Json,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// Missing parent directories are created. An existing file is
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError>;
}

impl Exporter for DataFrame {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        let mut buf = Vec::new();
        write_frame(&mut self.clone(), &mut buf, format)?;
        Ok(String::from_utf8(buf)?)
    }

    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        create_parent_dirs(path)?;
        let mut writer = BufWriter::new(File::create(path)?);
        write_frame(&mut self.clone(), &mut writer, format)?;

        debug!(path = %path.display(), rows = self.height(), "wrote artifact");
        Ok(())
    }
}

fn write_frame<W: std::io::Write>(
    df: &mut DataFrame,
    writer: W,
    format: ExportFormat,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Csv => CsvWriter::new(writer).include_header(true).finish(df)?,
        ExportFormat::Json => JsonWriter::new(writer)
            .with_json_format(JsonFormat::Json)
            .finish(df)?,
    }
    Ok(())
}

fn create_parent_dirs(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
