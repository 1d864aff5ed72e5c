//! sigflat Common Library
//!
//! This crate provides shared types and utilities for sigflat exporters:
//!
//! - [`telemetry`] - Telemetry data model (`Batch`, `ResourceGroup`, `ScopeGroup`, signal records)
//! - [`serialization`] - Encoding registry with JSON/CBOR encoders
//! - [`config`] - Logging and Zenoh configuration types
//! - [`session`] - Zenoh session management
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod serialization;
pub mod session;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ZenohConfig};
pub use error::{Error, Result};
pub use serialization::{
    CBOR, Encoder, EncodingRegistry, JSON, PROTOBUF, RecordValue, decode, encode_with,
};
pub use session::connect;
pub use telemetry::{
    AttributeValue, Attributes, Batch, InstrumentationScope, LogRecord, Logs, Metric, MetricPoint,
    Metrics, Resource, ResourceGroup, ScopeGroup, Severity, Signal, SignalRecord, Span, Traces,
    current_timestamp_nanos,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// # Example
///
/// ```ignore
/// use sigflat_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
