//! neuroDash command-line tool.
//!
//! Runs the batch analyses without the dashboard: the service analysis of
//! an enriched study export, and the workload reports of a RIS export.

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use neurodash_core::analysis::{restrict_dates, run_service_analysis, write_workload_reports};
use neurodash_core::config::{DataFormat, InferenceOptions, ServiceConfig};
use neurodash_core::enrich::{missing_fields, InferenceEngine};
use neurodash_core::export::RasterChartRenderer;
use neurodash_core::ingest::{
    check_file_encryption, decrypt_files, load_reports, OfficeDecryptor, UploadedFile,
};
use neurodash_core::transform::prepare_workload;
use neurodash_nlp::{KeywordModelLoader, ModelPaths};
use tracing::info;

#[derive(Parser)]
#[command(name = "neurodash")]
#[command(version, about = "Radiology report analyses", long_about = None)]
struct Cli {
    /// Log filter (e.g. info, debug, neurodash_core=trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-variable summaries, charts and PDFs over an enriched CSV export
    ServiceAnalysis {
        /// Enriched study export (CSV)
        input: PathBuf,

        /// Analysis settings (TOML)
        config: PathBuf,

        /// Directory for the PNG and PDF outputs
        #[arg(short, long, default_value = ".")]
        outdir: PathBuf,
    },

    /// Aggregate, per-reporter and contrast-usage PDFs over a RIS export
    Workload {
        /// RIS export (CSV or XLSX)
        input: PathBuf,

        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// First day excluded (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Data format (JSON); the built-in RIS format when absent
        #[arg(short, long)]
        format: Option<PathBuf>,

        /// Password of an encrypted workbook
        #[arg(short, long)]
        password: Option<String>,

        /// Directory for the PDFs
        #[arg(short, long, default_value = ".")]
        outdir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log_level))
        .init();

    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::ServiceAnalysis { input, config, outdir } => {
            let config = ServiceConfig::from_file(&config)
                .with_context(|| format!("reading {}", config.display()))?;
            let written = run_service_analysis(&input, &config, &outdir, &RasterChartRenderer::new(), today)
                .with_context(|| format!("service analysis of {}", input.display()))?;
            for path in written {
                println!("{}", path.display());
            }
        }

        Commands::Workload {
            input,
            start,
            end,
            format,
            password,
            outdir,
        } => {
            let format = match format {
                Some(path) => DataFormat::from_file(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => DataFormat::default_ris(),
            };
            let files = vec![UploadedFile::from_path(&input)
                .with_context(|| format!("reading {}", input.display()))?];
            let encrypted = check_file_encryption(&files)?;
            let files = match password {
                Some(password) => decrypt_files(files, &encrypted, &password, Some(&OfficeDecryptor))?,
                None if encrypted.iter().any(|e| *e) => {
                    anyhow::bail!("{} is encrypted; pass --password", input.display())
                }
                None => files,
            };
            let mut reports = load_reports(&files, &format).context("loading reports")?;
            let missing = missing_fields(&reports);
            if !missing.is_empty() {
                info!(n_reports = reports.len(), ?missing, "enriching reports");
                let engine = InferenceEngine::load(&KeywordModelLoader, &ModelPaths::default())?;
                reports = engine
                    .infer(&reports, &missing, &InferenceOptions::default())
                    .context("enriching reports")?;
            }

            let subset = reports.view();
            let rows = restrict_dates(&prepare_workload(&subset), start, end);
            let written = write_workload_reports(&rows, &outdir, &RasterChartRenderer::new(), today)
                .context("writing workload reports")?;
            for path in written {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
