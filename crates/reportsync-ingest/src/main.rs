//! reportsync - incremental analytics report sync

use anyhow::{Context, Result};
use clap::Parser;
use reportsync_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use reportsync_ingest::cli::{Cli, Command, OutputArgs};
use reportsync_ingest::config::ConnectorConfig;
use reportsync_ingest::fetcher::{FetchSettings, IncrementalFetcher, PollOutcome};
use reportsync_ingest::schema::SchemaSynthesizer;
use reportsync_ingest::sink::{
    CountingSink, JsonLinesSink, NoResumeState, OffsetFile, RecordSink, ResumeState,
};
use reportsync_ingest::source::{HttpReportSource, ReportSource};
use reportsync_ingest::window::PageCursor;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("reportsync")
        .build()
        .merge_env()
        .context("Invalid logging configuration")?;

    let _guard = init_logging(&log_config)?;

    let config = ConnectorConfig::from_env().context("Failed to load connector configuration")?;
    let source: Arc<dyn ReportSource> =
        Arc::new(HttpReportSource::new(&config).context("Failed to initialize report source")?);

    let result = match cli.command {
        Command::Run { output, dry_run } => run(&config, source, &output, dry_run).await,
        Command::Once { output } => once(&config, source, &output).await,
        Command::Schema => schema(&config, source.as_ref()).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

async fn run(
    config: &ConnectorConfig,
    source: Arc<dyn ReportSource>,
    output: &OutputArgs,
    dry_run: bool,
) -> Result<()> {
    let counter = CountingSink::new();
    let (sink, resume) = if dry_run {
        info!("Dry run, records are counted and discarded");
        let sink: Box<dyn RecordSink> = Box::new(counter.clone());
        let resume: Arc<dyn ResumeState> = Arc::new(NoResumeState);
        (sink, resume)
    } else {
        open_sink(output)?
    };

    let mut fetcher = IncrementalFetcher::new(FetchSettings::from(config), source, sink, resume);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    fetcher.run(shutdown).await?;

    if dry_run {
        info!(records = counter.count(), "Dry run finished");
    }
    Ok(())
}

async fn once(
    config: &ConnectorConfig,
    source: Arc<dyn ReportSource>,
    output: &OutputArgs,
) -> Result<()> {
    let (sink, resume) = open_sink(output)?;
    let mut fetcher = IncrementalFetcher::new(FetchSettings::from(config), source, sink, resume);

    match fetcher.poll().await {
        PollOutcome::Fetched(summary) => {
            eprintln!(
                "Fetched {}: {} pages, {} records, {} empty pages, schema v{}",
                summary.window,
                summary.pages,
                summary.records,
                summary.empty_pages,
                summary.schema_version.unwrap_or_default()
            );
            Ok(())
        },
        PollOutcome::Idle { next_fetch_in } => {
            eprintln!("Nothing to fetch for another {}s", next_fetch_in.as_secs());
            Ok(())
        },
        PollOutcome::Failed(e) => Err(e).context("Poll cycle failed"),
    }
}

async fn schema(config: &ConnectorConfig, source: &dyn ReportSource) -> Result<()> {
    let settings = FetchSettings::from(config);
    let report = source
        .fetch(&settings.backfill_window(), &PageCursor::Start)
        .await
        .context("Failed to fetch first report page")?;

    let mut synthesizer = SchemaSynthesizer::new(settings.topic);
    let schemas = synthesizer.maybe_update_schema(&report);
    println!("{}", serde_json::to_string_pretty(schemas)?);
    Ok(())
}

/// Records go to `--output` or stdout; offsets to `--offset-file` if given
fn open_sink(args: &OutputArgs) -> Result<(Box<dyn RecordSink>, Arc<dyn ResumeState>)> {
    let writer: Box<dyn Write + Send> = match &args.output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open output file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        },
        None => Box::new(std::io::stdout()),
    };

    let sink = JsonLinesSink::new(writer);
    let pair: (Box<dyn RecordSink>, Arc<dyn ResumeState>) = match &args.offset_file {
        Some(path) => {
            let offsets = OffsetFile::new(path);
            (
                Box::new(sink.with_offsets(offsets.clone())),
                Arc::new(offsets),
            )
        },
        None => (Box::new(sink), Arc::new(NoResumeState)),
    };
    Ok(pair)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping after the current cycle"),
        _ = terminate => info!("Received terminate signal, stopping after the current cycle"),
    }

    shutdown.cancel();
}
