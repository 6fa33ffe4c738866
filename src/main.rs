use std::collections::BTreeSet;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use logsift_logs::{
    BugReport, FilterGroups, FilterMatchEngine, FilterSpec, LogIngestionPipeline, LogRecord,
    LogStore, MatchPassManager, ProgressSink, StreamKind, restrict_to_streams,
};

mod config;
mod output;
mod source;

use config::Config;
use output::Printer;

/// Logsift - Merge Android logs in time order and highlight them with regex filters
#[derive(Parser, Debug)]
#[command(name = "logsift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log files to load (logcat dumps, bug reports)
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Filter files to apply, one group per file
    #[arg(short, long = "filters", value_name = "FILE")]
    filters: Vec<PathBuf>,

    /// Only count and show matches from these streams (main, system, radio, events, kernel, unknown)
    #[arg(short, long = "stream", value_name = "NAME")]
    streams: Vec<String>,

    /// Print every visible record, not only matched ones
    #[arg(short, long)]
    all: bool,

    /// Index of the first visible record
    #[arg(long)]
    first: Option<usize>,

    /// Index of the last visible record
    #[arg(long)]
    last: Option<usize>,

    /// Write the shown records to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Filter worker threads (overrides the config file)
    #[arg(long)]
    threads: Option<usize>,

    /// Config file (default: ~/.config/logsift/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    // Diagnostics go to stderr so stdout stays clean for records
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_level.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args, config).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args, config: Config) -> Result<()> {
    let allowed = parse_streams(&args.streams)?;

    let sources = source::read_sources(&args.files)?;
    let pipeline = LogIngestionPipeline::new(config.ingest_options());
    let log_progress = |percent: u8, message: &str| {
        tracing::info!(percent, "{message}");
    };

    let mut store = LogStore::new();
    store.load(pipeline.parse(&sources, &log_progress));
    report_load(&store);

    store
        .set_first_visible(args.first)
        .context("Invalid --first index")?;
    store
        .set_last_visible(args.last)
        .context("Invalid --last index")?;

    let mut groups = FilterGroups::new();
    groups.open_files(&args.filters)?;
    let filters = groups.applied_filters();
    for filter in &filters {
        if let Some(error) = filter.pattern_error() {
            tracing::warn!(filter = filter.name(), "Filter disabled: {error}");
        }
        if let Some(streams) = &allowed {
            filter.temporary_info().set_allowed_streams(streams.iter().copied());
        }
    }

    let threads = args.threads.unwrap_or(config.worker_threads);
    let engine = FilterMatchEngine::new(threads).context("Failed to start filter workers")?;
    tracing::debug!(threads = engine.threads(), "Filter workers ready");

    let matched = if filters.is_empty() {
        Vec::new()
    } else {
        run_pass(engine, store.visible().to_vec(), filters.clone()).await?
    };

    let shown: Vec<Arc<LogRecord>> = if args.all || filters.is_empty() {
        store.visible().to_vec()
    } else {
        matched
    };
    let shown = match &allowed {
        Some(streams) => restrict_to_streams(&shown, streams),
        None => shown,
    };

    match &args.output {
        Some(path) => {
            fs::write(path, LogStore::export(&shown))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} records to {}", shown.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let color = stdout.is_terminal();
            Printer::new(stdout.lock(), color).print_records(&shown)?;
        }
    }

    if !filters.is_empty() {
        let stderr = io::stderr();
        let color = stderr.is_terminal();
        Printer::new(stderr.lock(), color).print_summary(&filters)?;
    }

    Ok(())
}

/// Run one match pass on the worker pool and wait for its output
async fn run_pass(
    engine: FilterMatchEngine,
    records: Vec<Arc<LogRecord>>,
    filters: Vec<Arc<FilterSpec>>,
) -> Result<Vec<Arc<LogRecord>>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut passes = MatchPassManager::new(Arc::new(engine));
    let progress: Arc<dyn ProgressSink> = Arc::new(|percent: u8, message: &str| {
        tracing::debug!(percent, "{message}");
    });

    let generation = passes.submit(Arc::new(records), filters, progress, tx);
    let output = rx
        .recv()
        .await
        .context("Match pass ended without output")?;
    debug_assert_eq!(output.generation, generation);
    Ok(output.records)
}

fn parse_streams(names: &[String]) -> Result<Option<BTreeSet<StreamKind>>> {
    if names.is_empty() {
        return Ok(None);
    }
    names
        .iter()
        .map(|name| {
            StreamKind::from_word(name).with_context(|| format!("Unknown stream '{name}'"))
        })
        .collect::<Result<BTreeSet<_>>>()
        .map(Some)
}

fn report_load(store: &LogStore) {
    tracing::info!(
        records = store.all_len(),
        sources = store.loaded_sources().len(),
        "Logs loaded"
    );
    for name in store.skipped_sources() {
        tracing::warn!(source = %name, "Skipped source, no usable log lines");
    }
    for (name, text) in store.potential_bug_reports() {
        let report = BugReport::new(text.as_str());
        match report.property("Build fingerprint:") {
            Some(fingerprint) => {
                eprintln!("{name} looks like a bug report (build {fingerprint})")
            }
            None => eprintln!("{name} looks like a bug report"),
        }
    }
    if store.is_empty() {
        eprintln!("No log records found");
    }
}
