//! Integration tests for sigflat-common library.

use sigflat_common::telemetry::{NumberDataPoint, SpanKind, StatusCode, Temporality};
use sigflat_common::{
    CBOR, EncodingRegistry, Error, InstrumentationScope, JSON, LogRecord, Logs, Metric, Metrics,
    PROTOBUF, Resource, ResourceGroup, ScopeGroup, Severity, Signal, SignalRecord, Span, Traces,
    decode,
};

#[test]
fn test_full_record_workflow() {
    let registry = EncodingRegistry::with_defaults();

    let record = LogRecord::new("user login")
        .with_severity(Severity::Info)
        .with_attribute("user.id", 42i64)
        .with_attribute("mfa", true);

    // Encode as JSON
    let json_bytes = registry.encode(&record, JSON).expect("JSON encode failed");
    assert!(!json_bytes.is_empty());

    let decoded: LogRecord = decode(&json_bytes, JSON).expect("JSON decode failed");
    assert_eq!(decoded, record);

    // Encode as CBOR
    let cbor_bytes = registry.encode(&record, CBOR).expect("CBOR encode failed");
    assert!(
        cbor_bytes.len() < json_bytes.len(),
        "CBOR should be smaller than JSON"
    );

    let decoded: LogRecord = decode(&cbor_bytes, CBOR).expect("CBOR decode failed");
    assert_eq!(decoded.body, "user login");
    assert_eq!(decoded.severity(), Some(Severity::Info));
}

#[test]
fn test_span_json_roundtrip() {
    let registry = EncodingRegistry::with_defaults();
    let span = Span::new("4bf92f3577b34da6a3ce929d0e0e4736", "00f067aa0ba902b7", "SELECT users")
        .with_parent("53995c3f42cd8ad8")
        .with_kind(SpanKind::Client)
        .with_times(1_000, 4_500)
        .with_attribute("db.system", "postgresql")
        .with_status(StatusCode::Error, "timeout");

    let bytes = registry.encode(&span, JSON).unwrap();
    let decoded: Span = decode(&bytes, JSON).unwrap();

    assert_eq!(decoded, span);
    assert_eq!(decoded.duration_nanos(), 3_500);
}

#[test]
fn test_signal_records_declare_their_signal() {
    assert_eq!(<LogRecord as SignalRecord>::SIGNAL, Signal::Logs);
    assert_eq!(<Metric as SignalRecord>::SIGNAL, Signal::Metrics);
    assert_eq!(<Span as SignalRecord>::SIGNAL, Signal::Traces);
}

#[test]
fn test_leaf_counts_per_signal() {
    let logs = Logs::new().with_resource(ResourceGroup::new(Resource::new()).with_scope(
        ScopeGroup::new(
            InstrumentationScope::new("app"),
            vec![LogRecord::new("a"), LogRecord::new("b")],
        ),
    ));
    assert_eq!(logs.leaf_count(), 2);

    let metrics = Metrics::new().with_resource(ResourceGroup::new(Resource::new()).with_scope(
        ScopeGroup::new(
            InstrumentationScope::new("meter"),
            vec![Metric::sum(
                "requests",
                vec![
                    NumberDataPoint::new(1, 1i64),
                    NumberDataPoint::new(2, 2i64),
                    NumberDataPoint::new(3, 3i64),
                ],
                Temporality::Delta,
                true,
            )],
        ),
    ));
    assert_eq!(metrics.records().count(), 1);
    assert_eq!(metrics.leaf_count(), 3);

    let traces: Traces = Traces::new();
    assert_eq!(traces.leaf_count(), 0);
}

#[test]
fn test_protobuf_is_declared_only() {
    let registry = EncodingRegistry::default();

    assert!(registry.contains(PROTOBUF));
    assert!(matches!(
        registry.resolve(PROTOBUF),
        Err(Error::NotImplemented(_))
    ));
    assert!(matches!(
        registry.resolve("thrift"),
        Err(Error::UnsupportedFormat(_))
    ));
}
