//! Error types for marshaling and exporter lifecycle.

use sigflat_common::Signal;
use thiserror::Error;

/// Result type alias using [`ExportError`].
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors surfaced by marshalers and exporters.
#[derive(Error, Debug)]
pub enum ExportError {
    /// No encoder is registered for the configured protocol.
    #[error("Unsupported format: '{0}'")]
    UnsupportedFormat(String),

    /// The protocol is declared but its encoder has not been built.
    #[error("Format '{0}' is not implemented")]
    NotImplemented(String),

    /// Serializing a specific record failed.
    #[error("Failed to encode {signal} record as {format}: {message}")]
    Encoding {
        signal: Signal,
        format: String,
        message: String,
    },

    /// Acquiring or releasing the sink handle failed, or the exporter is not started.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// The message broker rejected a payload.
    #[error("Failed to publish to {destination}: {message}")]
    Publish {
        destination: String,
        message: String,
    },

    /// The file sink failed to append a batch.
    #[error("Failed to append to {path}: {message}")]
    Append { path: String, message: String },
}

impl ExportError {
    /// Create a lifecycle error.
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    /// Convert a registry/encoder error raised while encoding a record.
    pub(crate) fn from_encoding(err: sigflat_common::Error, signal: Signal, format: &str) -> Self {
        match err {
            sigflat_common::Error::UnsupportedFormat(f) => Self::UnsupportedFormat(f),
            sigflat_common::Error::NotImplemented(f) => Self::NotImplemented(f),
            other => Self::Encoding {
                signal,
                format: format.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Whether this error is tied to one record rather than to the whole call.
    pub fn is_record_error(&self) -> bool {
        matches!(self, Self::Encoding { .. })
    }
}
