use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Key/value attributes attached to resources, scopes and records.
///
/// Ordered so that encoded payloads are byte-for-byte reproducible.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<AttributeValue>),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Double(v)
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// Telemetry signal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Logs,
    Metrics,
    Traces,
}

impl Signal {
    /// All signal types, in a stable order.
    pub const ALL: [Signal; 3] = [Signal::Logs, Signal::Metrics, Signal::Traces];

    /// Get the string representation used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Logs => "logs",
            Signal::Metrics => "metrics",
            Signal::Traces => "traces",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "logs" | "log" => Ok(Signal::Logs),
            "metrics" | "metric" => Ok(Signal::Metrics),
            "traces" | "trace" | "spans" => Ok(Signal::Traces),
            other => Err(format!(
                "unknown signal '{}': expected logs, metrics or traces",
                other
            )),
        }
    }
}

/// A record type carried at the bottom of a telemetry tree.
///
/// Each signal decides what its leaf records are: a log record and a span are
/// their own single leaf, while a metric yields one leaf per data point.
pub trait SignalRecord: Send + Sync {
    /// Signal this record type belongs to.
    const SIGNAL: Signal;

    /// Borrowed view of one leaf record.
    type Leaf<'a>: Serialize
    where
        Self: 'a;

    /// Leaf records contained in this record, in container order.
    fn leaves(&self) -> impl Iterator<Item = Self::Leaf<'_>>;

    /// Number of leaf records contained in this record.
    fn leaf_count(&self) -> usize {
        self.leaves().count()
    }
}

/// Resource-level context shared by everything beneath it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this resource.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Instrumentation scope (library) that produced a group of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentationScope {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl InstrumentationScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Records emitted by one instrumentation scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ScopeGroup<T> {
    #[serde(default)]
    pub scope: InstrumentationScope,

    #[serde(default)]
    pub records: Vec<T>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_url: String,
}

impl<T> ScopeGroup<T> {
    pub fn new(scope: InstrumentationScope, records: Vec<T>) -> Self {
        Self {
            scope,
            records,
            schema_url: String::new(),
        }
    }
}

/// Scope groups sharing one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ResourceGroup<T> {
    #[serde(default)]
    pub resource: Resource,

    #[serde(default)]
    pub scopes: Vec<ScopeGroup<T>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_url: String,
}

impl<T> ResourceGroup<T> {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            scopes: Vec::new(),
            schema_url: String::new(),
        }
    }

    /// Append a scope group.
    pub fn with_scope(mut self, scope: ScopeGroup<T>) -> Self {
        self.scopes.push(scope);
        self
    }
}

/// One delivery unit: a resource → scope → record tree for a single signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Batch<T> {
    #[serde(default)]
    pub resources: Vec<ResourceGroup<T>>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
        }
    }
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource group.
    pub fn with_resource(mut self, resource: ResourceGroup<T>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Iterate over every record in the batch, in tree order.
    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.resources
            .iter()
            .flat_map(|r| r.scopes.iter())
            .flat_map(|s| s.records.iter())
    }
}

impl<T: SignalRecord> Batch<T> {
    /// Total number of leaf records in the batch.
    pub fn leaf_count(&self) -> usize {
        self.records().map(SignalRecord::leaf_count).sum()
    }
}

/// Log batch.
pub type Logs = Batch<LogRecord>;
/// Metric batch.
pub type Metrics = Batch<Metric>;
/// Trace batch.
pub type Traces = Batch<Span>;

// =============================================================================
// Logs
// =============================================================================

/// Coarse log severity, covering ranges of the OTLP severity number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// Map an OTLP severity number (1..=24) to its range.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1..=4 => Some(Self::Trace),
            5..=8 => Some(Self::Debug),
            9..=12 => Some(Self::Info),
            13..=16 => Some(Self::Warn),
            17..=20 => Some(Self::Error),
            21..=24 => Some(Self::Fatal),
            _ => None,
        }
    }

    /// First severity number of this range.
    pub fn number(self) -> u8 {
        match self {
            Self::Trace => 1,
            Self::Debug => 5,
            Self::Info => 9,
            Self::Warn => 13,
            Self::Error => 17,
            Self::Fatal => 21,
        }
    }

    /// Parse from a string (number or name).
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_number(n);
        }

        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" | "informational" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "fatal" | "critical" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Canonical severity text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

/// A single log line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Nanoseconds since Unix epoch when the event occurred.
    #[serde(default)]
    pub time_unix_nano: u64,

    /// Nanoseconds since Unix epoch when the event was observed by the pipeline.
    #[serde(default)]
    pub observed_time_unix_nano: u64,

    /// OTLP severity number (0 = unspecified).
    #[serde(default)]
    pub severity_number: u8,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity_text: String,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,

    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub flags: u32,
}

impl LogRecord {
    /// Create a new log record observed now.
    pub fn new(body: impl Into<String>) -> Self {
        let now = current_timestamp_nanos();
        Self {
            time_unix_nano: now,
            observed_time_unix_nano: now,
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity_number = severity.number();
        self.severity_text = severity.as_str().to_string();
        self
    }

    pub fn with_timestamp(mut self, time_unix_nano: u64) -> Self {
        self.time_unix_nano = time_unix_nano;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Correlate this record with a span.
    pub fn with_trace_context(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    /// Severity range of this record.
    ///
    /// The severity number wins; records that only carry a severity text
    /// (as many log shippers emit) are resolved from the text.
    pub fn severity(&self) -> Option<Severity> {
        Severity::from_number(self.severity_number).or_else(|| Severity::parse(&self.severity_text))
    }
}

impl SignalRecord for LogRecord {
    const SIGNAL: Signal = Signal::Logs;

    type Leaf<'a> = &'a LogRecord;

    fn leaves(&self) -> impl Iterator<Item = Self::Leaf<'_>> {
        std::iter::once(self)
    }
}

// =============================================================================
// Traces
// =============================================================================

/// Span kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

/// Span status code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanStatus {
    #[serde(default)]
    pub code: StatusCode,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Timestamped annotation on a span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    #[serde(default)]
    pub time_unix_nano: u64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// A single span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Hex-encoded 16-byte trace id.
    pub trace_id: String,

    /// Hex-encoded 8-byte span id.
    pub span_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub kind: SpanKind,

    #[serde(default)]
    pub start_time_unix_nano: u64,

    #[serde(default)]
    pub end_time_unix_nano: u64,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SpanEvent>,

    #[serde(default)]
    pub status: SpanStatus,
}

impl Span {
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_times(mut self, start_unix_nano: u64, end_unix_nano: u64) -> Self {
        self.start_time_unix_nano = start_unix_nano;
        self.end_time_unix_nano = end_unix_nano;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_event(mut self, event: SpanEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_status(mut self, code: StatusCode, message: impl Into<String>) -> Self {
        self.status = SpanStatus {
            code,
            message: message.into(),
        };
        self
    }

    /// Span duration in nanoseconds (0 if the end precedes the start).
    pub fn duration_nanos(&self) -> u64 {
        self.end_time_unix_nano
            .saturating_sub(self.start_time_unix_nano)
    }
}

impl SignalRecord for Span {
    const SIGNAL: Signal = Signal::Traces;

    type Leaf<'a> = &'a Span;

    fn leaves(&self) -> impl Iterator<Item = Self::Leaf<'_>> {
        std::iter::once(self)
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Aggregation temporality of a sum or histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporality {
    #[default]
    Unspecified,
    Delta,
    Cumulative,
}

/// Metric data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Sum,
    Histogram,
}

/// Numeric value of a gauge or sum data point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberValue {
    Int(i64),
    Double(f64),
}

impl From<i64> for NumberValue {
    fn from(v: i64) -> Self {
        NumberValue::Int(v)
    }
}

impl From<f64> for NumberValue {
    fn from(v: f64) -> Self {
        NumberValue::Double(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberDataPoint {
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub start_time_unix_nano: u64,

    #[serde(default)]
    pub time_unix_nano: u64,

    pub value: NumberValue,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl NumberDataPoint {
    pub fn new(time_unix_nano: u64, value: impl Into<NumberValue>) -> Self {
        Self {
            start_time_unix_nano: 0,
            time_unix_nano,
            value: value.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramDataPoint {
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub start_time_unix_nano: u64,

    #[serde(default)]
    pub time_unix_nano: u64,

    #[serde(default)]
    pub count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,

    #[serde(default)]
    pub bucket_counts: Vec<u64>,

    #[serde(default)]
    pub explicit_bounds: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Data points of a metric, by metric type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricData {
    Gauge {
        #[serde(default)]
        data_points: Vec<NumberDataPoint>,
    },
    Sum {
        #[serde(default)]
        data_points: Vec<NumberDataPoint>,
        #[serde(default)]
        temporality: Temporality,
        #[serde(default)]
        is_monotonic: bool,
    },
    Histogram {
        #[serde(default)]
        data_points: Vec<HistogramDataPoint>,
        #[serde(default)]
        temporality: Temporality,
    },
}

impl MetricData {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricData::Gauge { .. } => MetricKind::Gauge,
            MetricData::Sum { .. } => MetricKind::Sum,
            MetricData::Histogram { .. } => MetricKind::Histogram,
        }
    }

    fn temporality(&self) -> Option<Temporality> {
        match self {
            MetricData::Gauge { .. } => None,
            MetricData::Sum { temporality, .. } | MetricData::Histogram { temporality, .. } => {
                Some(*temporality)
            }
        }
    }

    fn is_monotonic(&self) -> Option<bool> {
        match self {
            MetricData::Sum { is_monotonic, .. } => Some(*is_monotonic),
            _ => None,
        }
    }
}

/// A named metric and its data points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,

    pub data: MetricData,
}

impl Metric {
    /// Create a gauge metric.
    pub fn gauge(name: impl Into<String>, data_points: Vec<NumberDataPoint>) -> Self {
        Self::with_data(name, MetricData::Gauge { data_points })
    }

    /// Create a sum metric.
    pub fn sum(
        name: impl Into<String>,
        data_points: Vec<NumberDataPoint>,
        temporality: Temporality,
        is_monotonic: bool,
    ) -> Self {
        Self::with_data(
            name,
            MetricData::Sum {
                data_points,
                temporality,
                is_monotonic,
            },
        )
    }

    /// Create a histogram metric.
    pub fn histogram(
        name: impl Into<String>,
        data_points: Vec<HistogramDataPoint>,
        temporality: Temporality,
    ) -> Self {
        Self::with_data(
            name,
            MetricData::Histogram {
                data_points,
                temporality,
            },
        )
    }

    fn with_data(name: impl Into<String>, data: MetricData) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            data,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Borrowed reference to one data point of either shape.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum DataPointRef<'a> {
    Number(&'a NumberDataPoint),
    Histogram(&'a HistogramDataPoint),
}

/// One metric data point together with its metric's identity.
///
/// This is the leaf record of the metrics signal.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricPoint<'a> {
    pub name: &'a str,

    #[serde(skip_serializing_if = "is_empty_str")]
    pub description: &'a str,

    #[serde(skip_serializing_if = "is_empty_str")]
    pub unit: &'a str,

    #[serde(rename = "type")]
    pub kind: MetricKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporality: Option<Temporality>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_monotonic: Option<bool>,

    #[serde(flatten)]
    pub point: DataPointRef<'a>,
}

impl SignalRecord for Metric {
    const SIGNAL: Signal = Signal::Metrics;

    type Leaf<'a> = MetricPoint<'a>;

    fn leaves(&self) -> impl Iterator<Item = Self::Leaf<'_>> {
        let (numbers, histograms): (&[NumberDataPoint], &[HistogramDataPoint]) = match &self.data
        {
            MetricData::Gauge { data_points } | MetricData::Sum { data_points, .. } => {
                (data_points.as_slice(), &[])
            }
            MetricData::Histogram { data_points, .. } => (&[], data_points.as_slice()),
        };
        let kind = self.data.kind();
        let temporality = self.data.temporality();
        let is_monotonic = self.data.is_monotonic();

        numbers
            .iter()
            .map(DataPointRef::Number)
            .chain(histograms.iter().map(DataPointRef::Histogram))
            .map(move |point| MetricPoint {
                name: &self.name,
                description: &self.description,
                unit: &self.unit,
                kind,
                temporality,
                is_monotonic,
                point,
            })
    }
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_empty_str(s: &&str) -> bool {
    s.is_empty()
}

/// Get the current timestamp in nanoseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch.
pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
