//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

use crate::report::ReportFormat;

/// Tidemetrics - namespace resource usage analyses for Kubernetes clusters
///
/// Query CPU and GPU usage from a PromQL endpoint (or load Grafana CSV
/// snapshots), compute per-namespace hours and job counts, and write
/// tables, SVG plots and a Markdown/JSON report.
///
/// Examples:
///   tidemetrics all --period January24 --outdir out
///   tidemetrics cpuhours,gpuhours --period January24-March24
///   tidemetrics cpuhoursbar --file snapshots/ --outdir out
///   tidemetrics --list-analyses
///   tidemetrics --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Analyses to run (comma-separated), or "all"
    #[arg(value_name = "ANALYSES", value_delimiter = ',')]
    pub analyses: Vec<String>,

    /// Period to query from the PromQL endpoint
    ///
    /// A year (2024), a month (January24), a month range
    /// (January24-March24) or unix seconds (<start>-<end>).
    #[arg(short, long, value_name = "PERIOD", conflicts_with = "file")]
    pub period: Option<String>,

    /// CSV snapshot or directory of snapshots to load instead of querying
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Directory results are written to
    ///
    /// Nothing is saved when neither this nor the config file sets one.
    #[arg(short, long, value_name = "DIR")]
    pub outdir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .tidemetrics.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Report format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ReportFormat>,

    /// PromQL range query endpoint
    #[arg(long, value_name = "URL", env = "TIDEMETRICS_PROMQL_URL")]
    pub promql_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Fail instead of running prerequisites that were not requested
    #[arg(long)]
    pub no_auto_prereqs: bool,

    /// Keep file source periods as found instead of widening them to months
    #[arg(long)]
    pub no_align: bool,

    /// List the available analyses and exit
    #[arg(long)]
    pub list_analyses: bool,

    /// Generate a default .tidemetrics.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for the informational modes
        if self.init_config || self.list_analyses {
            return Ok(());
        }

        if self.analyses.is_empty() {
            return Err("No analyses requested (use \"all\" or --list-analyses)".to_string());
        }
        if self.analyses.iter().any(|name| name.trim().is_empty()) {
            return Err("Analysis names must not be empty".to_string());
        }

        // Data has to come from somewhere
        if self.period.is_none() && self.file.is_none() {
            return Err("Either --period or --file is required".to_string());
        }

        // Validate PromQL URL format
        if let Some(ref url) = self.promql_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("PromQL URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate input path if provided
        if let Some(ref path) = self.file {
            if !path.exists() {
                return Err(format!("Input path does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings. `--quiet` wins
    /// over a config file that asks for verbose output.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
