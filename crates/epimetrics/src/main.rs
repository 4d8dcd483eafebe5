use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use epimetrics_core::acquisition::{Fetcher, HttpFetcher, OfflineFetcher, SourceId};
use epimetrics_core::{DataStore, PipelineConfig, Snapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Epidemiological time-series preparation pipeline", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Acquire, clean, impute and derive features, then print a run summary
    Run(RunArgs),
    /// Validate a configuration file without running anything
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source identifier (owid, owid_latest)
    #[arg(long)]
    source: Option<String>,

    /// Load this file instead of the cache or the network
    #[arg(long)]
    local_file: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Download even when a cached copy exists
    #[arg(long)]
    force_download: bool,

    /// Keep only these locations
    #[arg(long, num_args = 1..)]
    countries: Vec<String>,

    /// Use the latest-snapshot source
    #[arg(long, conflicts_with = "source")]
    quick: bool,

    /// Print the run report as JSON instead of a table
    #[arg(long)]
    report_json: bool,

    /// Never touch the network
    #[arg(long)]
    offline: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run(args) => run(args),
        Command::CheckConfig { config } => {
            let loaded = PipelineConfig::from_path(&config)
                .with_context(|| format!("invalid configuration in {}", config.display()))?;
            info!(
                path = %config.display(),
                source = %loaded.acquisition.source,
                "configuration is valid"
            );
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(source) = &args.source {
        config.acquisition.source = source.clone();
    }
    if args.quick {
        config.acquisition.source = SourceId::OwidLatest.as_str().to_string();
    }
    if let Some(path) = &args.local_file {
        config.acquisition.local_path = Some(path.clone());
    }
    if let Some(dir) = &args.data_dir {
        config.acquisition.data_dir = dir.clone();
    }
    if args.force_download {
        config.acquisition.force_download = true;
    }
    if !args.countries.is_empty() {
        config.locations = Some(args.countries.clone());
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;

    let fetcher: Box<dyn Fetcher> = if args.offline {
        Box::new(OfflineFetcher)
    } else {
        let timeout = Duration::from_secs(config.acquisition.timeout_secs);
        Box::new(HttpFetcher::new(timeout).context("failed to build HTTP client")?)
    };

    let store = DataStore::new();
    let snapshot = store
        .rebuild(&config, fetcher.as_ref())
        .context("pipeline run failed")?;

    if args.report_json {
        let json = serde_json::to_string_pretty(&snapshot.report)
            .context("failed to serialise run report")?;
        println!("{json}");
    } else {
        print_summary(&snapshot);
    }

    store.clear();
    Ok(())
}

fn print_summary(snapshot: &Snapshot) {
    let report = &snapshot.report;

    let mut summary = Table::new();
    summary.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);

    if let Some(source) = &report.source {
        let origin = source
            .path
            .as_ref()
            .map_or_else(|| "generated".to_string(), |path| path.display().to_string());
        summary.add_row(vec![
            "Source".to_string(),
            format!("{} ({:?})", source.source_id, source.kind),
        ]);
        summary.add_row(vec!["Origin".to_string(), origin]);
        summary.add_row(vec!["Rows loaded".to_string(), source.rows_loaded.to_string()]);
        summary.add_row(vec!["World rows".to_string(), source.world_rows.to_string()]);
    }
    if let Some(cleaning) = &report.cleaning {
        summary.add_row(vec![
            "Duplicates removed".to_string(),
            cleaning.duplicates_removed.to_string(),
        ]);
        summary.add_row(vec![
            "Columns dropped".to_string(),
            cleaning.columns_dropped.len().to_string(),
        ]);
        summary.add_row(vec![
            "Invalid dates removed".to_string(),
            cleaning.invalid_dates_removed.to_string(),
        ]);
        summary.add_row(vec![
            "Negatives clamped".to_string(),
            cleaning.negatives_clamped.to_string(),
        ]);
        summary.add_row(vec!["Outliers capped".to_string(), cleaning.outliers_capped.to_string()]);
    }
    if let Some(imputation) = &report.imputation {
        summary.add_row(vec!["Values imputed".to_string(), imputation.total_filled().to_string()]);
        summary.add_row(vec![
            "Still missing".to_string(),
            imputation.remaining_missing.to_string(),
        ]);
    }
    if let Some(features) = &report.features {
        summary.add_row(vec!["Features created".to_string(), features.created.len().to_string()]);
        summary.add_row(vec!["Features pruned".to_string(), features.pruned.len().to_string()]);
    }
    summary.add_row(vec!["Records".to_string(), report.rows.to_string()]);
    summary.add_row(vec!["Columns".to_string(), report.columns.to_string()]);
    summary.add_row(vec!["Locations".to_string(), report.locations.to_string()]);
    summary.add_row(vec!["Built at".to_string(), snapshot.built_at.to_rfc3339()]);
    println!("{summary}");

    let mut timings = Table::new();
    timings
        .load_preset(UTF8_FULL)
        .set_header(vec!["Stage", "Rows", "Columns", "Elapsed (ms)"]);
    for timing in &report.timings {
        timings.add_row(vec![
            timing.stage.to_string(),
            timing.rows_out.to_string(),
            timing.columns_out.to_string(),
            timing.elapsed_ms.to_string(),
        ]);
    }
    println!("{timings}");
}
