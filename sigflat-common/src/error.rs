use thiserror::Error;

/// Common error type for sigflat components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR serialization error: {0}")]
    Cbor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No encoder is registered under this identifier.
    #[error("Unsupported format: '{0}'")]
    UnsupportedFormat(String),

    /// The format is declared in the registry but has no encoder yet.
    #[error("Format '{0}' is declared but not implemented")]
    NotImplemented(String),

    /// The record could not be lowered to a value tree.
    #[error("Failed to serialize record: {0}")]
    Serialize(String),

    /// The record holds a value the format cannot express.
    #[error("Value cannot be represented as {format}: {reason}")]
    Unrepresentable { format: String, reason: String },

    #[error("Encoder for {0} produced an empty payload")]
    EmptyPayload(String),
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using sigflat's Error.
pub type Result<T> = std::result::Result<T, Error>;
