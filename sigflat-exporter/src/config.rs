//! Configuration for the signal exporters.

use serde::{Deserialize, Serialize};
use sigflat_common::{LoggingConfig, Signal, ZenohConfig};
use std::path::Path;
use thiserror::Error;

use crate::flatten::Enrichment;
use crate::sink::Framing;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete service configuration, as loaded by the binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Settings shared by the logs, metrics and traces exporters.
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Where output messages are delivered.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.exporter.validate()
    }
}

/// What to do when a single record cannot be encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Fail the whole batch on the first encoding error.
    #[default]
    FailFast,
    /// Skip the record, log it, and keep going.
    SkipRecord,
}

/// Per-signal destination overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDestinations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traces: Option<String>,
}

impl SignalDestinations {
    /// Override for a signal, if any.
    pub fn get(&self, signal: Signal) -> Option<&str> {
        match signal {
            Signal::Logs => self.logs.as_deref(),
            Signal::Metrics => self.metrics.as_deref(),
            Signal::Traces => self.traces.as_deref(),
        }
    }

    fn set(&mut self, signal: Signal, destination: String) {
        let slot = match signal {
            Signal::Logs => &mut self.logs,
            Signal::Metrics => &mut self.metrics,
            Signal::Traces => &mut self.traces,
        };
        *slot = Some(destination);
    }
}

/// Settings shared by the three signal exporters.
///
/// Immutable once an exporter has been built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Topic or file path messages are addressed to.
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Per-signal overrides of `destination`.
    #[serde(default)]
    pub destinations: SignalDestinations,

    /// Wire protocol: selects the encoder ("json", "cbor", "protobuf", ...).
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Free-form encoding label reported for routing and metrics.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Context attached to each flattened record.
    #[serde(default)]
    pub enrichment: Enrichment,

    /// Behavior on per-record encoding failures.
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

fn default_destination() -> String {
    "sigflat".to_string()
}

fn default_protocol() -> String {
    sigflat_common::JSON.to_string()
}

fn default_encoding() -> String {
    "flat_json".to_string()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            destinations: SignalDestinations::default(),
            protocol: default_protocol(),
            encoding: default_encoding(),
            enrichment: Enrichment::default(),
            on_error: ErrorPolicy::default(),
        }
    }
}

impl ExporterConfig {
    pub fn new(
        destination: impl Into<String>,
        protocol: impl Into<String>,
        encoding: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            protocol: protocol.into(),
            encoding: encoding.into(),
            ..Default::default()
        }
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_error_policy(mut self, on_error: ErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// Route one signal to its own destination.
    pub fn with_destination_for(mut self, signal: Signal, destination: impl Into<String>) -> Self {
        self.destinations.set(signal, destination.into());
        self
    }

    /// Destination used by the exporter of `signal`.
    pub fn destination_for(&self, signal: Signal) -> &str {
        self.destinations
            .get(signal)
            .unwrap_or(self.destination.as_str())
    }

    /// Validate the configuration.
    ///
    /// Protocols are not checked against a registry here: the registry can be
    /// extended after the configuration is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination.trim().is_empty() {
            return Err(ConfigError::Validation(
                "destination cannot be empty".to_string(),
            ));
        }

        for signal in Signal::ALL {
            if let Some(destination) = self.destinations.get(signal)
                && destination.trim().is_empty()
            {
                return Err(ConfigError::Validation(format!(
                    "destination override for {} cannot be empty",
                    signal
                )));
            }
        }

        if self.protocol.trim().is_empty() {
            return Err(ConfigError::Validation(
                "protocol cannot be empty".to_string(),
            ));
        }

        if self.encoding.trim().is_empty() {
            return Err(ConfigError::Validation(
                "encoding cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Sink selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Append payloads to the destination file.
    File {
        #[serde(default)]
        framing: Framing,
    },
    /// Publish payloads to the destination key expression over Zenoh.
    Zenoh(ZenohConfig),
    /// Keep payloads in memory (dry runs).
    Memory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::File {
            framing: Framing::default(),
        }
    }
}
