//! Turning telemetry batches into addressed wire messages.

use std::marker::PhantomData;
use std::sync::Arc;

use sigflat_common::{Batch, EncodingRegistry, LogRecord, Metric, Signal, SignalRecord, Span};
use tracing::warn;

use crate::config::{ErrorPolicy, ExporterConfig};
use crate::error::{ExportError, Result};
use crate::flatten::RecordFlattener;

/// One encoded record, addressed to a topic or file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub destination: String,
    pub payload: Vec<u8>,
}

/// Flattens batches of one signal and encodes each leaf record.
///
/// The marshaler holds no per-call state and can be shared between threads.
pub struct SignalMarshaler<T> {
    protocol: String,
    encoding: String,
    flattener: RecordFlattener,
    on_error: ErrorPolicy,
    registry: Arc<EncodingRegistry>,
    _record: PhantomData<fn() -> T>,
}

/// Marshaler for log records.
pub type LogsMarshaler = SignalMarshaler<LogRecord>;
/// Marshaler for metrics; each data point becomes one message.
pub type MetricsMarshaler = SignalMarshaler<Metric>;
/// Marshaler for spans.
pub type TracesMarshaler = SignalMarshaler<Span>;

impl<T: SignalRecord> SignalMarshaler<T> {
    pub fn new(config: &ExporterConfig, registry: Arc<EncodingRegistry>) -> Self {
        Self {
            protocol: config.protocol.clone(),
            encoding: config.encoding.clone(),
            flattener: RecordFlattener::new(config.enrichment),
            on_error: config.on_error,
            registry,
            _record: PhantomData,
        }
    }

    /// Marshaler backed by the built-in encoders.
    pub fn with_default_registry(config: &ExporterConfig) -> Self {
        Self::new(config, Arc::new(EncodingRegistry::with_defaults()))
    }

    /// Encoding label reported for routing and metrics.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Wire protocol used to encode records.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn signal(&self) -> Signal {
        T::SIGNAL
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.on_error
    }

    pub fn flattener(&self) -> RecordFlattener {
        self.flattener
    }

    /// Encode every leaf of `batch` as one message addressed to `destination`.
    ///
    /// Messages follow flattening order. The protocol is only resolved once a
    /// leaf is found, so an empty batch never fails. Under
    /// [`ErrorPolicy::FailFast`] the first encoding failure aborts the call and
    /// nothing is returned; under [`ErrorPolicy::SkipRecord`] the failing
    /// record is logged and left out. Format resolution errors always abort.
    pub fn marshal(&self, batch: &Batch<T>, destination: &str) -> Result<Vec<OutputMessage>> {
        let mut leaves = self.flattener.flatten(batch).peekable();
        if leaves.peek().is_none() {
            return Ok(Vec::new());
        }

        let encoder = self
            .registry
            .resolve(&self.protocol)
            .map_err(|e| ExportError::from_encoding(e, T::SIGNAL, &self.protocol))?;

        let mut messages = Vec::new();
        for (index, leaf) in leaves.enumerate() {
            match sigflat_common::encode_with(encoder.as_ref(), &leaf) {
                Ok(payload) => messages.push(OutputMessage {
                    destination: destination.to_string(),
                    payload,
                }),
                Err(e) => {
                    let err = ExportError::from_encoding(e, T::SIGNAL, &self.protocol);
                    if self.on_error == ErrorPolicy::SkipRecord && err.is_record_error() {
                        warn!(
                            signal = %T::SIGNAL,
                            protocol = %self.protocol,
                            index,
                            error = %err,
                            "Skipping record"
                        );
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Ok(messages)
    }
}

impl<T> Clone for SignalMarshaler<T> {
    fn clone(&self) -> Self {
        Self {
            protocol: self.protocol.clone(),
            encoding: self.encoding.clone(),
            flattener: self.flattener,
            on_error: self.on_error,
            registry: Arc::clone(&self.registry),
            _record: PhantomData,
        }
    }
}

impl<T: SignalRecord> std::fmt::Debug for SignalMarshaler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalMarshaler")
            .field("signal", &T::SIGNAL)
            .field("protocol", &self.protocol)
            .field("encoding", &self.encoding)
            .field("flattener", &self.flattener)
            .field("on_error", &self.on_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::Enrichment;
    use sigflat_common::telemetry::NumberDataPoint;
    use sigflat_common::{
        CBOR, Encoder, InstrumentationScope, JSON, Logs, Metrics, PROTOBUF, RecordValue,
        Resource, ResourceGroup, ScopeGroup, Severity, Traces, decode,
    };

    fn logs(bodies: &[&str]) -> Logs {
        Logs::new().with_resource(
            ResourceGroup::new(Resource::new().with_attribute("service.name", "checkout"))
                .with_scope(ScopeGroup::new(
                    InstrumentationScope::new("app"),
                    bodies.iter().map(|b| LogRecord::new(*b)).collect(),
                )),
        )
    }

    fn marshaler(protocol: &str) -> LogsMarshaler {
        LogsMarshaler::with_default_registry(&ExporterConfig::new("topic", protocol, "label"))
    }

    /// Emits nothing for records whose body is "poison".
    struct PickyEncoder;

    impl Encoder for PickyEncoder {
        fn mime_type(&self) -> &'static str {
            "application/x-picky"
        }

        fn encode(&self, record: &RecordValue) -> sigflat_common::Result<Vec<u8>> {
            let json = serde_json::to_value(record)?;
            if json["body"] == "poison" {
                return Ok(Vec::new());
            }
            Ok(serde_json::to_vec(&json)?)
        }
    }

    fn picky(policy: ErrorPolicy) -> LogsMarshaler {
        let mut registry = EncodingRegistry::with_defaults();
        registry.register("picky", PickyEncoder);
        let config = ExporterConfig::new("topic", "picky", "label").with_error_policy(policy);
        LogsMarshaler::new(&config, Arc::new(registry))
    }

    #[test]
    fn test_one_message_per_leaf() {
        let batch = logs(&["a", "b", "c", "d", "e"]);
        let messages = marshaler(JSON).marshal(&batch, "topic-A").unwrap();

        assert_eq!(messages.len(), 5);
        assert!(messages.iter().all(|m| m.destination == "topic-A"));
        assert!(messages.iter().all(|m| !m.payload.is_empty()));
    }

    #[test]
    fn test_empty_batch_never_resolves_protocol() {
        for protocol in [JSON, PROTOBUF, "thrift"] {
            let messages = marshaler(protocol).marshal(&Logs::new(), "t").unwrap();
            assert!(messages.is_empty(), "protocol {}", protocol);
        }
    }

    #[test]
    fn test_json_payload_decodes_to_record() {
        let record = LogRecord::new("disk full")
            .with_severity(Severity::Error)
            .with_attribute("mount", "/var");
        let batch = Logs::new().with_resource(
            ResourceGroup::new(Resource::new())
                .with_scope(ScopeGroup::new(InstrumentationScope::new("app"), vec![record.clone()])),
        );

        let messages = marshaler(JSON).marshal(&batch, "t").unwrap();
        let decoded: LogRecord = decode(&messages[0].payload, JSON).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_cbor_protocol() {
        let messages = marshaler(CBOR).marshal(&logs(&["x"]), "t").unwrap();
        let decoded: LogRecord = decode(&messages[0].payload, CBOR).unwrap();
        assert_eq!(decoded.body, "x");
    }

    #[test]
    fn test_format_errors_produce_no_output() {
        let batch = logs(&["a"]);

        assert!(matches!(
            marshaler("thrift").marshal(&batch, "t"),
            Err(ExportError::UnsupportedFormat(ref f)) if f == "thrift"
        ));
        assert!(matches!(
            marshaler(PROTOBUF).marshal(&batch, "t"),
            Err(ExportError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_format_errors_ignore_skip_policy() {
        let config = ExporterConfig::new("t", PROTOBUF, "label")
            .with_error_policy(ErrorPolicy::SkipRecord);
        let marshaler = LogsMarshaler::with_default_registry(&config);

        assert!(matches!(
            marshaler.marshal(&logs(&["a"]), "t"),
            Err(ExportError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_fail_fast_on_record_error() {
        let err = picky(ErrorPolicy::FailFast)
            .marshal(&logs(&["ok", "poison", "ok"]), "t")
            .unwrap_err();

        assert!(err.is_record_error());
        assert!(matches!(err, ExportError::Encoding { signal: Signal::Logs, .. }));
    }

    #[test]
    fn test_skip_record_policy() {
        let messages = picky(ErrorPolicy::SkipRecord)
            .marshal(&logs(&["first", "poison", "last"]), "t")
            .unwrap();

        let bodies: Vec<LogRecord> = messages
            .iter()
            .map(|m| decode(&m.payload, JSON).unwrap())
            .collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].body, "first");
        assert_eq!(bodies[1].body, "last");
    }

    #[test]
    fn test_encoding_label_is_decoupled_from_protocol() {
        let marshaler = MetricsMarshaler::with_default_registry(&ExporterConfig::new(
            "t",
            CBOR,
            "otlp_proto",
        ));

        assert_eq!(marshaler.encoding(), "otlp_proto");
        assert_eq!(marshaler.protocol(), CBOR);
        assert_eq!(marshaler.signal(), Signal::Metrics);
    }

    #[test]
    fn test_metric_points_flattened() {
        let batch = Metrics::new().with_resource(ResourceGroup::new(Resource::new()).with_scope(
            ScopeGroup::new(
                InstrumentationScope::new("meter"),
                vec![
                    Metric::gauge("cpu", vec![NumberDataPoint::new(1, 0.5)]).with_unit("1"),
                    Metric::gauge(
                        "mem",
                        vec![NumberDataPoint::new(1, 10i64), NumberDataPoint::new(2, 12i64)],
                    ),
                ],
            ),
        ));
        let messages = MetricsMarshaler::with_default_registry(&ExporterConfig::default())
            .marshal(&batch, "m")
            .unwrap();

        assert_eq!(messages.len(), 3);
        let first: serde_json::Value = decode(&messages[0].payload, JSON).unwrap();
        assert_eq!(first["name"], "cpu");
        assert_eq!(first["unit"], "1");
        let last: serde_json::Value = decode(&messages[2].payload, JSON).unwrap();
        assert_eq!(last["name"], "mem");
        assert_eq!(last["value"], 12);
    }

    #[test]
    fn test_enrichment_adds_resource() {
        let config = ExporterConfig::default().with_enrichment(Enrichment::ResourceAttributes);
        let messages = LogsMarshaler::with_default_registry(&config)
            .marshal(&logs(&["a"]), "t")
            .unwrap();

        let value: serde_json::Value = decode(&messages[0].payload, JSON).unwrap();
        assert_eq!(value["body"], "a");
        assert_eq!(value["resource"]["service.name"], "checkout");
    }

    #[test]
    fn test_traces_marshaler_empty_scope() {
        let batch = Traces::new().with_resource(
            ResourceGroup::new(Resource::new())
                .with_scope(ScopeGroup::new(InstrumentationScope::new("tracer"), Vec::new())),
        );
        let marshaler = TracesMarshaler::with_default_registry(&ExporterConfig::default());
        assert!(marshaler.marshal(&batch, "t").unwrap().is_empty());
    }
}
