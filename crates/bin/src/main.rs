//! Ember CLI binary.
//!
//! Joins company emissions with fetched financial statements and derives
//! emissions intensity per unit of revenue.

mod integration;

use clap::{Parser, Subcommand, ValueEnum};
use ember::Config;
use ember::config::DEFAULT_CONFIG_PATH;
use ember_data::emissions::DEFAULT_EMISSIONS_PATH;
use ember_data::fetch::DEFAULT_CONCURRENCY;
use ember_data::yahoo::YahooFinancialsProvider;
use ember_data::FetchOptions;
use ember_output::ExportFormat;
use indicatif::{ProgressBar, ProgressStyle};
use integration::data_pipeline::{PipelineOptions, PipelinePaths, run_pipeline};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Ember: emissions intensity from public financials", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch financials, merge with emissions and write both artifacts
    Run {
        /// YAML configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Raw emissions CSV
        #[arg(long, default_value = DEFAULT_EMISSIONS_PATH)]
        emissions: PathBuf,

        /// Raw financials artifact
        #[arg(long, default_value = "data/raw/financials.csv")]
        financials_out: PathBuf,

        /// Merged dataset artifact
        #[arg(long, default_value = "data/processed/data_merged.csv")]
        merged_out: PathBuf,

        /// Maximum concurrent financials requests (1 = sequential)
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Drop financial statements outside the configured period
        #[arg(long)]
        clip_to_period: bool,

        /// Artifact format; artifact file extensions follow it
        #[arg(long, value_enum, default_value = "csv")]
        format: Format,

        /// Also write a JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the configured companies and period
    Companies {
        /// YAML configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => Self::Csv,
            Format::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            emissions,
            financials_out,
            merged_out,
            concurrency,
            clip_to_period,
            format,
            report,
        } => {
            let paths = PipelinePaths {
                config,
                emissions,
                financials_out,
                merged_out,
            }
            .with_artifact_format(format.into());
            let options = PipelineOptions {
                fetch: FetchOptions { concurrency },
                clip_to_period,
                format: format.into(),
            };
            run_command(&paths, &options, report).await?;
        }
        Commands::Companies { config } => {
            list_companies(&config)?;
        }
    }

    Ok(())
}

async fn run_command(
    paths: &PipelinePaths,
    options: &PipelineOptions,
    report_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = YahooFinancialsProvider::new()?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let report = run_pipeline(&provider, paths, options, Some(&pb)).await?;

    println!("{}", report.to_ascii_table());

    if let Some(path) = report_path {
        report.write_json(&path)?;
        println!("Report saved to {}", path.display());
    }

    Ok(())
}

fn list_companies(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(path)?;

    println!("\nConfigured Companies\n");
    println!("{:<40} Ticker", "Company");
    println!("{}", "-".repeat(50));
    for company in config.companies.companies() {
        println!("{:<40} {}", company.name, company.ticker);
    }
    println!("\nPeriod: {}", config.period);
    println!("Total: {} companies", config.companies.len());

    Ok(())
}
