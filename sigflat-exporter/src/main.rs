//! Export telemetry batch files through a per-signal exporter.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;
use sigflat_common::{Batch, Signal, SignalRecord};
use tracing::{error, info};

use sigflat_exporter::{
    ExporterFactory, FileSink, MemorySink, ServiceConfig, SignalExporter, Sink, SinkConfig,
    ZenohSink,
};

/// Flatten telemetry batches and export one message per record.
#[derive(Parser, Debug)]
#[command(name = "sigflat-exporter")]
#[command(about = "Flatten telemetry batches and export them per signal")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signal carried by the input batches (logs, metrics, traces).
    #[arg(short, long)]
    signal: Signal,

    /// Batch files (JSON), exported in order.
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Destination for this signal (overrides config).
    #[arg(long)]
    destination: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Override destination from CLI
    if let Some(destination) = args.destination {
        config.exporter = config.exporter.with_destination_for(args.signal, destination);
        config.validate()?;
    }

    sigflat_common::init_tracing(&config.logging)?;

    info!("Starting sigflat exporter");
    info!(
        signal = %args.signal,
        destination = %config.exporter.destination_for(args.signal),
        protocol = %config.exporter.protocol,
        encoding = %config.exporter.encoding,
        sink = ?config.sink,
        "Configuration loaded"
    );

    let factory = ExporterFactory::new(config.exporter);
    match config.sink {
        SinkConfig::File { framing } => {
            dispatch(&factory, args.signal, FileSink::new(framing), &args.input)
        }
        SinkConfig::Zenoh(zenoh) => {
            dispatch(&factory, args.signal, ZenohSink::new(zenoh), &args.input)
        }
        SinkConfig::Memory => dispatch(&factory, args.signal, MemorySink::new(), &args.input),
    }
}

fn dispatch<S: Sink>(
    factory: &ExporterFactory,
    signal: Signal,
    sink: S,
    inputs: &[PathBuf],
) -> anyhow::Result<()> {
    match signal {
        Signal::Logs => run(factory.logs(sink), inputs),
        Signal::Metrics => run(factory.metrics(sink), inputs),
        Signal::Traces => run(factory.traces(sink), inputs),
    }
}

/// Start, export every input, and shut down even when an input fails.
fn run<T, S>(exporter: SignalExporter<T, S>, inputs: &[PathBuf]) -> anyhow::Result<()>
where
    T: SignalRecord + DeserializeOwned,
    S: Sink,
{
    exporter.start()?;

    let result = inputs
        .iter()
        .try_for_each(|path| export_file(&exporter, path));
    if let Err(e) = &result {
        error!("Export failed: {:#}", e);
    }

    let shutdown = exporter.shutdown();

    // Print final stats
    let stats = exporter.stats();
    info!(
        batches_consumed = stats.batches_consumed,
        records_flattened = stats.records_flattened,
        messages_delivered = stats.messages_delivered,
        records_skipped = stats.records_skipped,
        marshal_errors = stats.marshal_errors,
        delivery_errors = stats.delivery_errors,
        "Final statistics"
    );

    result?;
    shutdown?;
    info!("Exporter stopped");
    Ok(())
}

fn export_file<T, S>(exporter: &SignalExporter<T, S>, path: &Path) -> anyhow::Result<()>
where
    T: SignalRecord + DeserializeOwned,
    S: Sink,
{
    let content =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let batch: Batch<T> = serde_json::from_slice(&content)
        .with_context(|| format!("failed to parse {} batch {}", T::SIGNAL, path.display()))?;

    exporter
        .consume(&batch)
        .with_context(|| format!("failed to export {}", path.display()))?;

    info!(path = %path.display(), records = batch.leaf_count(), "Exported batch");
    Ok(())
}
