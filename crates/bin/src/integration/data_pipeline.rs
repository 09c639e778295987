//! Pipeline stages for the emissions intensity run.
//!
//! Config → financials fetch → raw financials artifact → emissions load →
//! merge & derive → merged artifact. Stages run strictly in order and the
//! first error aborts the run; artifacts written before the failure stay on
//! disk.

use ember::{CompanyMapping, Config, ConfigError, MergeError, Period, coverage, merge_and_derive};
use ember_data::{
    DataError, FetchOptions, FinancialsProvider, clip_to_years, emissions_frame,
    fetch_all_with_progress, load_emissions,
};
use ember_output::{Artifact, ExportError, ExportFormat, Exporter, ReportBuilder, RunReport};
use indicatif::ProgressBar;
use polars::prelude::*;
use std::path::PathBuf;
use tracing::info;

/// Error type for pipeline runs.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PipelineError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Emissions loading or financials fetching failed.
    #[error(transparent)]
    Data(#[from] DataError),
    /// Join or derivation failed.
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// An artifact could not be written.
    #[error("Failed to write artifact: {0}")]
    Export(#[from] ExportError),
}

/// Input and output locations for a run.
#[derive(Debug, Clone)]
pub(crate) struct PipelinePaths {
    /// YAML configuration file.
    pub(crate) config: PathBuf,
    /// Raw emissions table.
    pub(crate) emissions: PathBuf,
    /// Raw financials artifact.
    pub(crate) financials_out: PathBuf,
    /// Merged dataset artifact.
    pub(crate) merged_out: PathBuf,
}

impl PipelinePaths {
    /// Point both artifacts at the file extension of `format`.
    pub(crate) fn with_artifact_format(mut self, format: ExportFormat) -> Self {
        self.financials_out.set_extension(format.extension());
        self.merged_out.set_extension(format.extension());
        self
    }
}

/// Behavior switches for a run.
#[derive(Debug, Clone, Default)]
pub(crate) struct PipelineOptions {
    /// Fetch fan-out settings.
    pub(crate) fetch: FetchOptions,
    /// Keep only financial rows whose year lies in the configured period.
    pub(crate) clip_to_period: bool,
    /// Artifact format.
    pub(crate) format: ExportFormat,
}

/// Load the configuration and print the company list and period.
pub(crate) fn load_config(paths: &PipelinePaths) -> Result<Config, PipelineError> {
    let config = Config::load(&paths.config)?;

    println!("Companies: {}", config.tickers().join(", "));
    println!("Period:    {}", config.period);

    Ok(config)
}

/// Fetch financials for every configured company.
pub(crate) async fn fetch_financials<P>(
    provider: &P,
    companies: &CompanyMapping,
    period: &Period,
    options: &PipelineOptions,
    progress: Option<&ProgressBar>,
) -> Result<DataFrame, PipelineError>
where
    P: FinancialsProvider + ?Sized,
{
    let tickers = companies.tickers();

    if let Some(pb) = progress {
        pb.set_length(tickers.len() as u64);
        pb.set_message(format!(
            "Fetching financials ({} concurrent)...",
            options.fetch.concurrency.max(1)
        ));
    }

    let financials = fetch_all_with_progress(provider, &tickers, options.fetch, |ticker| {
        if let Some(pb) = progress {
            pb.set_message(format!("Fetched {ticker}"));
            pb.inc(1);
        }
    })
    .await?;

    let financials = if options.clip_to_period {
        clip_to_years(financials, period.start.year(), period.end.year())?
    } else {
        financials
    };

    Ok(financials)
}

/// Load the configured companies' emissions as a record set.
pub(crate) fn load_emission_frame(
    paths: &PipelinePaths,
    companies: &CompanyMapping,
) -> Result<DataFrame, PipelineError> {
    let records = load_emissions(&paths.emissions, &companies.name_to_ticker())?;
    Ok(emissions_frame(&records)?)
}

/// Run every stage against `provider`.
pub(crate) async fn run_pipeline<P>(
    provider: &P,
    paths: &PipelinePaths,
    options: &PipelineOptions,
    progress: Option<&ProgressBar>,
) -> Result<RunReport, PipelineError>
where
    P: FinancialsProvider + ?Sized,
{
    let config = load_config(paths)?;
    let mut report = ReportBuilder::new()
        .tickers(config.tickers())
        .period(config.period.to_string());

    let financials =
        fetch_financials(provider, &config.companies, &config.period, options, progress).await;
    if let Some(pb) = progress {
        match &financials {
            Ok(df) => pb.finish_with_message(format!("Fetched {} statement rows", df.height())),
            Err(_) => pb.finish_with_message("Failed!"),
        }
    }
    let financials = financials?;

    financials.export_to_file(&paths.financials_out, options.format)?;
    println!(
        "Financials saved to {} — rows: {}",
        paths.financials_out.display(),
        financials.height()
    );
    report = report.artifact(Artifact::new(
        "financials",
        &paths.financials_out,
        financials.height(),
    ));

    println!("Loading emissions...");
    let emissions = load_emission_frame(paths, &config.companies)?;
    info!(rows = emissions.height(), "emissions loaded");

    println!("Merging emissions with financials...");
    let merged = merge_and_derive(&emissions, &financials)?;

    merged.export_to_file(&paths.merged_out, options.format)?;
    println!(
        "Merged dataset saved to {} — rows: {}",
        paths.merged_out.display(),
        merged.height()
    );

    let coverage = coverage(emissions.height(), &merged)?;
    report = report
        .artifact(Artifact::new("merged", &paths.merged_out, merged.height()))
        .coverage(coverage);

    Ok(report.build())
}
