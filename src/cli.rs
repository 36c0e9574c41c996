//! CLI argument parsing for Faultline

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for the invocation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Full result payload as JSON (default)
    Json,
    /// Attribution rows as CSV
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Commit defect-risk model builder with per-dimension risk attribution", long_about = None)]
pub struct Cli {
    /// Base URL of the ingest service
    #[arg(long = "ingest-url", value_name = "URL")]
    pub ingest_url: Option<String>,

    /// Repository identifier
    #[arg(long = "repo-id", value_name = "ID")]
    pub repo_id: Option<String>,

    /// First job whose commits are predicted
    #[arg(long = "start-job-id", value_name = "JOB")]
    pub start_job_id: Option<String>,

    /// Last job whose commits are included
    #[arg(long = "last-job-id", value_name = "JOB")]
    pub last_job_id: Option<String>,

    /// Authorization header value (e.g., "Bearer <token>")
    #[arg(long = "auth", value_name = "AUTH")]
    pub auth: Option<String>,

    /// Read metric CSV files from a local directory instead of the ingest service
    #[arg(long = "data", value_name = "DIR", conflicts_with = "ingest_url")]
    pub data: Option<PathBuf>,

    /// Pipeline configuration file (TOML)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format (json or csv)
    #[arg(long = "format", value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Enable debug tracing output (to stderr)
    #[arg(long = "debug")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train and export a model, then predict the newest commits
    Build {
        /// Forest hyper-parameters as a JSON object
        #[arg(long = "params", value_name = "JSON")]
        params: Option<String>,

        /// Path the exported model is written to
        #[arg(long = "model", value_name = "PATH")]
        model: PathBuf,
    },

    /// Predict job commits with a previously exported model
    Predict {
        /// Exported model file
        #[arg(long = "model", value_name = "PATH")]
        model: PathBuf,

        /// Baseline medians as a JSON object (feature -> value)
        #[arg(long = "medians", value_name = "JSON")]
        medians: String,

        /// Model probability for the baseline commit
        #[arg(long = "medians-score", value_name = "SCORE", allow_negative_numbers = true)]
        medians_score: f64,
    },
}
