//! Flattening marshalers and per-signal exporters for telemetry batches.
//!
//! A telemetry batch is a resource → instrumentation scope → record tree.
//! Exporters walk the tree, encode each leaf record (a log line, a span, or
//! one metric data point) as its own payload, and deliver the payloads to a
//! sink under a destination topic or path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ Batch<T> │──>│  Flattener  │──>│  Marshaler  │──>│ Sink (zenoh/file)│
//! │          │   │ (leaf walk) │   │ (registry)  │   │                  │
//! └──────────┘   └─────────────┘   └─────────────┘   └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sigflat_exporter::{ExporterConfig, ExporterFactory, FileSink};
//!
//! let factory = ExporterFactory::new(ExporterConfig::new("out/logs.jsonl", "json", "flat_json"));
//! let logs = factory.logs(FileSink::default());
//! logs.start()?;
//! logs.consume(&batch)?;
//! logs.shutdown()?;
//! ```
//!
//! # Configuration
//!
//! See [`config::ServiceConfig`] for configuration options.

pub mod config;
pub mod error;
pub mod exporter;
pub mod flatten;
pub mod marshal;
pub mod sink;

pub use config::{ErrorPolicy, ExporterConfig, ServiceConfig, SinkConfig};
pub use error::{ExportError, Result};
pub use exporter::{
    ExporterFactory, ExporterState, ExporterStats, LogsExporter, MetricsExporter,
    SharedExporter, SignalExporter, TracesExporter, create_logs_exporter,
    create_metrics_exporter, create_traces_exporter,
};
pub use flatten::{Enrichment, FlattenedRecord, RecordFlattener};
pub use marshal::{LogsMarshaler, MetricsMarshaler, OutputMessage, SignalMarshaler, TracesMarshaler};
pub use sink::{FileSink, Framing, MemorySink, Sink, SinkHandle, ZenohSink};
