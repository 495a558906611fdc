//! Tidemetrics - namespace resource usage analyses for Kubernetes clusters
//!
//! A CLI tool that loads CPU/GPU usage series from a PromQL endpoint or
//! from CSV snapshots, runs the requested analyses in prerequisite order
//! and writes tables, plots and a report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (repository misuse, malformed data, saving failed)
//!   2 - Configuration error (arguments, config file, unknown or cyclic analyses)
//!   3 - An analysis found nothing to run on
//!   4 - A verification failed
//!   5 - Loading data failed

mod analysis;
mod cli;
mod config;
mod data;
mod error;
mod ingest;
mod models;
mod pipeline;
mod report;
mod save;
mod summary;
mod util;
mod vis;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use ingest::IngestSource;
use models::ReportMetadata;
use pipeline::RunState;
use report::build_report;
use save::{AnalysisSaver, ReportSaver, Saver, SourceSaver, VisSaver};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use analysis::{resolve, AnalysisRegistry};
use util::time::{parse_time_range, range_printable};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config comes first so it can raise the log level
    let (mut config, config_path) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(2);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("Tidemetrics v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    if args.list_analyses {
        return handle_list_analyses(&config);
    }

    let period = match args.period.as_deref() {
        Some(value) => match parse_time_range(value, Utc::now()) {
            Ok(period) => Some(period),
            Err(e) => {
                eprintln!("\n❌ Error: {}", e);
                std::process::exit(2);
            }
        },
        None => None,
    };

    match run(args, config, period).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

/// Exit code of a failed run.
fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<error::Error>()
        .map(error::Error::exit_code)
        .unwrap_or(1)
}

/// Handle --init-config: generate a default .tidemetrics.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml()?;
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the PromQL endpoint, queries, resources and more.");
    Ok(())
}

/// Handle --list-analyses: print every registered analysis.
fn handle_list_analyses(config: &Config) -> Result<()> {
    let registry = AnalysisRegistry::builtin(config)?;

    println!("📋 Available analyses:\n");
    for analysis in registry.iter() {
        if analysis.prerequisites.is_empty() {
            println!("   {:<18} {}", analysis.name, analysis.kind.label());
        } else {
            println!(
                "   {:<18} {} (requires {})",
                analysis.name,
                analysis.kind.label(),
                analysis.prerequisites.join(", ")
            );
        }
    }
    println!("\n   Use \"all\" to run every analysis.");
    Ok(())
}

/// Initialize logging at `level`.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete workflow: resolve, ingest, analyze, visualize, save.
async fn run(args: Args, config: Config, period: Option<(i64, i64)>) -> Result<()> {
    let start_time = Instant::now();

    // Step 1: Resolve the requested analyses
    let registry = AnalysisRegistry::builtin(&config).map_err(error::Error::from)?;
    let requested = registry.expand_requested(&args.analyses);
    let plan = resolve(&requested, &registry, config.general.auto_prerequisites)
        .map_err(error::Error::from)?;

    println!("📋 Running {} analyses", plan.order.len());
    if !plan.auto_added.is_empty() {
        println!("   Added prerequisites: {}", plan.auto_added.join(", "));
    }

    // Step 2: Load the data
    let (source, period_label) = match (period, &args.file) {
        (Some(period), _) => (
            IngestSource::Promql {
                period,
                kinds: config.resources.keys().cloned().collect(),
            },
            Some(range_printable(period.0, period.1, config.promql.step)),
        ),
        (None, Some(path)) => (IngestSource::Files(path.clone()), None),
        (None, None) => anyhow::bail!("Either --period or --file is required"),
    };

    let input = source.describe(&config);
    println!("\n📥 Loading data from {}", input);
    if let Some(ref label) = period_label {
        println!("   Period: {}", label);
    }

    let state = RunState::new(plan)
        .ingest(&source, &config, !args.quiet)
        .await?;
    println!("   Loaded {} sources", state.sources_loaded);

    // Step 3: Analyses, then visualizations
    println!("\n🔬 Running analyses...");
    let state = state.analyze(&registry, &config)?;

    println!("\n🎨 Rendering visualizations...");
    let state = state.visualize(&registry)?;
    let figures = state.figures_rendered();
    println!("   Rendered {} figures", figures);

    // Step 4: Save
    let state = match config.general.outdir.clone() {
        Some(outdir) => {
            let format = config.general.report_format;
            let metadata = ReportMetadata {
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                analysis_date: Utc::now(),
                input,
                period: period_label,
                sources_loaded: state.sources_loaded,
                figures_rendered: figures,
                duration_seconds: start_time.elapsed().as_secs_f64(),
            };
            let report = build_report(metadata, &state.plan, &state.summaries, &state.repo);
            let savers: Vec<Box<dyn Saver>> = vec![
                Box::new(SourceSaver),
                Box::new(AnalysisSaver),
                Box::new(VisSaver),
                Box::new(ReportSaver { report, format }),
            ];

            println!("\n💾 Saving results to {}", outdir.display());
            state.save(&savers, &outdir)?
        }
        None => {
            warn!("No output directory set (--outdir), results are not saved");
            state
        }
    };
    debug!("Run finished in stage \"{}\"", state.stage().as_str());

    // Print summaries
    for summary in &state.summaries {
        println!("\n📊 {}", summary::render_summary(summary).trim_end());
    }

    println!(
        "\n✅ Done! {} analyses in {:.1}s",
        state.plan.order.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Load configuration from file or use defaults. Runs before logging is
/// set up, so the path it was read from is handed back instead of logged.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, Some(config_path.clone())));
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => Ok((config, Some(PathBuf::from(DEFAULT_CONFIG_FILE)))),
        None => Ok((Config::default(), None)),
    }
}
