//! Run report for the ember pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Join coverage of a merged record set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// Emissions rows fed into the join.
    pub emissions_rows: usize,
    /// Rows in the merged output.
    pub merged_rows: usize,
    /// Merged rows with no financial match.
    pub unmatched_rows: usize,
    /// Merged rows whose intensity is missing, infinite or NaN.
    pub undefined_intensity_rows: usize,
}

impl Coverage {
    /// Merged rows carrying a finite intensity.
    pub const fn defined_intensity_rows(&self) -> usize {
        self.merged_rows.saturating_sub(self.undefined_intensity_rows)
    }

    /// Share of merged rows carrying a finite intensity (0.0 when empty).
    pub fn intensity_ratio(&self) -> f64 {
        if self.merged_rows == 0 {
            0.0
        } else {
            self.defined_intensity_rows() as f64 / self.merged_rows as f64
        }
    }
}

/// A persisted artifact and its row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Short label, e.g. `financials`.
    pub label: String,
    /// Where it was written.
    pub path: String,
    /// Data rows written.
    pub rows: usize,
}

impl Artifact {
    /// Create a new artifact entry.
    pub fn new(label: impl Into<String>, path: &Path, rows: usize) -> Self {
        Self {
            label: label.into(),
            path: path.display().to_string(),
            rows,
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Report generation timestamp.
    pub timestamp: DateTime<Utc>,

    /// Tickers processed, in configuration order.
    pub tickers: Vec<String>,

    /// Configured period, as displayed.
    pub period: String,

    /// Artifacts written, in write order.
    pub artifacts: Vec<Artifact>,

    /// Join coverage, when the merge ran.
    pub coverage: Option<Coverage>,
}

impl RunReport {
    /// Convert report to JSON string.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Render the report as plain text.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str("\nRun Summary\n");
        output.push_str(&format!("Period: {}\n", self.period));
        output.push_str(&format!("Tickers: {}\n", self.tickers.join(", ")));
        output.push_str(&"=".repeat(64));
        output.push('\n');

        if !self.artifacts.is_empty() {
            output.push_str(&format!("{:<14} {:>8}  {}\n", "Artifact", "Rows", "Path"));
            output.push_str(&"-".repeat(64));
            output.push('\n');
            for artifact in &self.artifacts {
                output.push_str(&format!(
                    "{:<14} {:>8}  {}\n",
                    artifact.label, artifact.rows, artifact.path
                ));
            }
        }

        if let Some(coverage) = &self.coverage {
            output.push_str("\nCoverage:\n");
            output.push_str(&"-".repeat(64));
            output.push('\n');
            output.push_str(&format!(
                "  Emissions rows:           {}\n",
                coverage.emissions_rows
            ));
            output.push_str(&format!(
                "  Merged rows:              {}\n",
                coverage.merged_rows
            ));
            output.push_str(&format!(
                "  Without financials:       {}\n",
                coverage.unmatched_rows
            ));
            output.push_str(&format!(
                "  Undefined intensity:      {}\n",
                coverage.undefined_intensity_rows
            ));
            output.push_str(&format!(
                "  Intensity coverage:       {:.1}%\n",
                coverage.intensity_ratio() * 100.0
            ));
        }

        output
    }
}

/// Builder for creating run reports.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    tickers: Vec<String>,
    period: Option<String>,
    artifacts: Vec<Artifact>,
    coverage: Option<Coverage>,
}

impl ReportBuilder {
    /// Create a new report builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tickers.
    pub fn tickers(mut self, tickers: Vec<String>) -> Self {
        self.tickers = tickers;
        self
    }

    /// Set the displayed period.
    pub fn period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    /// Record a written artifact.
    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Set the join coverage.
    pub const fn coverage(mut self, coverage: Coverage) -> Self {
        self.coverage = Some(coverage);
        self
    }

    /// Build the report.
    pub fn build(self) -> RunReport {
        RunReport {
            timestamp: Utc::now(),
            tickers: self.tickers,
            period: self.period.unwrap_or_default(),
            artifacts: self.artifacts,
            coverage: self.coverage,
        }
    }
}
