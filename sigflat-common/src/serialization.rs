use std::collections::HashMap;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// JSON format identifier.
pub const JSON: &str = "json";
/// CBOR format identifier.
pub const CBOR: &str = "cbor";
/// Protobuf format identifier (declared, no encoder yet).
pub const PROTOBUF: &str = "protobuf";

/// Self-describing value tree an encoder receives.
///
/// Integers, floats (including NaN and infinities), text and maps are kept
/// exactly as the record serialized them.
pub type RecordValue = ciborium::Value;

/// Serializes one record into bytes.
///
/// Records reach the encoder as a [`RecordValue`] tree, which keeps the trait
/// object safe and lets formats be registered at runtime.
pub trait Encoder: Send + Sync {
    /// MIME type of the produced payloads.
    fn mime_type(&self) -> &'static str;

    /// Encode one record.
    fn encode(&self, record: &RecordValue) -> Result<Vec<u8>>;
}

/// JSON format (human-readable, good for debugging).
///
/// JSON has no representation for NaN or infinities, so records holding one
/// are rejected rather than written with `null` in their place.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn mime_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, record: &RecordValue) -> Result<Vec<u8>> {
        ensure_finite(record)?;
        serde_json::to_vec(record).map_err(Error::from)
    }
}

fn ensure_finite(value: &RecordValue) -> Result<()> {
    match value {
        RecordValue::Float(f) if !f.is_finite() => Err(Error::Unrepresentable {
            format: JSON.to_string(),
            reason: format!("non-finite number {}", f),
        }),
        RecordValue::Array(items) => items.iter().try_for_each(ensure_finite),
        RecordValue::Map(entries) => entries.iter().try_for_each(|(key, value)| {
            ensure_finite(key)?;
            ensure_finite(value)
        }),
        RecordValue::Tag(_, inner) => ensure_finite(inner),
        _ => Ok(()),
    }
}

/// CBOR format (compact binary, better for high-volume telemetry).
#[derive(Debug, Clone, Copy, Default)]
pub struct CborEncoder;

impl Encoder for CborEncoder {
    fn mime_type(&self) -> &'static str {
        "application/cbor"
    }

    fn encode(&self, record: &RecordValue) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(record, &mut buf)?;
        Ok(buf)
    }
}

#[derive(Clone)]
enum Entry {
    Ready(Arc<dyn Encoder>),
    Declared,
}

/// Registry mapping format identifiers to encoders.
///
/// A format can be registered with an encoder, or only declared; resolving a
/// declared format fails with [`Error::NotImplemented`] and resolving an
/// unknown one fails with [`Error::UnsupportedFormat`]. Identifiers are
/// case-insensitive.
#[derive(Clone)]
pub struct EncodingRegistry {
    entries: HashMap<String, Entry>,
}

impl EncodingRegistry {
    /// Registry with no formats at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with `json` and `cbor` encoders and `protobuf` declared.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register(JSON, JsonEncoder)
            .register(CBOR, CborEncoder)
            .declare(PROTOBUF);
        registry
    }

    /// Register an encoder, replacing any previous entry with that name.
    pub fn register(&mut self, name: impl AsRef<str>, encoder: impl Encoder + 'static) -> &mut Self {
        self.entries
            .insert(normalize(name.as_ref()), Entry::Ready(Arc::new(encoder)));
        self
    }

    /// Declare a format without an encoder.
    pub fn declare(&mut self, name: impl AsRef<str>) -> &mut Self {
        self.entries.insert(normalize(name.as_ref()), Entry::Declared);
        self
    }

    /// Whether the format is registered or declared.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize(name))
    }

    /// Whether the format has a usable encoder.
    pub fn is_implemented(&self, name: &str) -> bool {
        matches!(self.entries.get(&normalize(name)), Some(Entry::Ready(_)))
    }

    /// Known format identifiers, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up the encoder for a format.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Encoder>> {
        match self.entries.get(&normalize(name)) {
            Some(Entry::Ready(encoder)) => Ok(Arc::clone(encoder)),
            Some(Entry::Declared) => Err(Error::NotImplemented(name.to_string())),
            None => Err(Error::UnsupportedFormat(name.to_string())),
        }
    }

    /// Encode a value using the named format.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T, format: &str) -> Result<Vec<u8>> {
        let encoder = self.resolve(format)?;
        encode_with(encoder.as_ref(), value)
    }
}

impl Default for EncodingRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for EncodingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodingRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Encode a value with a specific encoder.
///
/// An encoder that produces no bytes is reported as an error rather than an
/// empty payload.
pub fn encode_with<T: Serialize + ?Sized>(encoder: &dyn Encoder, value: &T) -> Result<Vec<u8>> {
    let tree = RecordValue::serialized(value).map_err(|e| Error::Serialize(e.to_string()))?;
    let bytes = encoder.encode(&tree)?;
    if bytes.is_empty() {
        return Err(Error::EmptyPayload(encoder.mime_type().to_string()));
    }
    Ok(bytes)
}

/// Decode bytes produced by one of the built-in encoders.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: &str) -> Result<T> {
    match normalize(format).as_str() {
        JSON => serde_json::from_slice(data).map_err(Error::from),
        CBOR => ciborium::from_reader(data).map_err(Error::from),
        PROTOBUF => Err(Error::NotImplemented(format.to_string())),
        _ => Err(Error::UnsupportedFormat(format.to_string())),
    }
}
