//! Per-signal exporters and their lifecycle.

use std::sync::Arc;

use parking_lot::RwLock;
use sigflat_common::{Batch, EncodingRegistry, LogRecord, Metric, Signal, SignalRecord, Span};
use tracing::{debug, error, info, trace};

use crate::config::ExporterConfig;
use crate::error::{ExportError, Result};
use crate::marshal::SignalMarshaler;
use crate::sink::{Sink, SinkHandle};

/// Lifecycle state of an exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterState {
    /// Configured, nothing acquired.
    Created,
    /// Holding a sink handle and accepting batches.
    Started,
    /// Handle released. Terminal.
    Shutdown,
}

impl std::fmt::Display for ExporterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExporterState::Created => "created",
            ExporterState::Started => "started",
            ExporterState::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

enum State<H> {
    Created,
    Started(H),
    Shutdown,
}

impl<H> State<H> {
    fn public(&self) -> ExporterState {
        match self {
            State::Created => ExporterState::Created,
            State::Started(_) => ExporterState::Started,
            State::Shutdown => ExporterState::Shutdown,
        }
    }
}

/// Statistics for one exporter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExporterStats {
    pub batches_consumed: u64,
    pub records_flattened: u64,
    pub messages_delivered: u64,
    pub records_skipped: u64,
    pub marshal_errors: u64,
    pub delivery_errors: u64,
}

/// Exporter for one signal, delivering through a sink.
///
/// `consume` may be called from several threads at once. `start` and
/// `shutdown` serialize with it through the state lock.
pub struct SignalExporter<T, S>
where
    T: SignalRecord,
    S: Sink,
{
    config: Arc<ExporterConfig>,
    destination: String,
    marshaler: SignalMarshaler<T>,
    sink: S,
    state: RwLock<State<S::Handle>>,
    stats: RwLock<ExporterStats>,
}

/// Exporter for log records.
pub type LogsExporter<S> = SignalExporter<LogRecord, S>;
/// Exporter for metrics.
pub type MetricsExporter<S> = SignalExporter<Metric, S>;
/// Exporter for spans.
pub type TracesExporter<S> = SignalExporter<Span, S>;

impl<T, S> SignalExporter<T, S>
where
    T: SignalRecord,
    S: Sink,
{
    pub fn new(config: Arc<ExporterConfig>, registry: Arc<EncodingRegistry>, sink: S) -> Self {
        let destination = config.destination_for(T::SIGNAL).to_string();
        let marshaler = SignalMarshaler::new(&config, registry);

        Self {
            config,
            destination,
            marshaler,
            sink,
            state: RwLock::new(State::Created),
            stats: RwLock::new(ExporterStats::default()),
        }
    }

    pub fn signal(&self) -> Signal {
        T::SIGNAL
    }

    /// Topic or path every message of this exporter is addressed to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn config(&self) -> &Arc<ExporterConfig> {
        &self.config
    }

    pub fn marshaler(&self) -> &SignalMarshaler<T> {
        &self.marshaler
    }

    pub fn state(&self) -> ExporterState {
        self.state.read().public()
    }

    /// Get current statistics.
    pub fn stats(&self) -> ExporterStats {
        self.stats.read().clone()
    }

    /// Acquire the sink handle.
    ///
    /// A second call while started does nothing. On failure the exporter
    /// stays in `Created` and can be started again.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            State::Started(_) => {
                debug!(signal = %T::SIGNAL, "Exporter already started");
                return Ok(());
            }
            State::Shutdown => {
                return Err(ExportError::lifecycle(format!(
                    "{} exporter cannot be restarted after shutdown",
                    T::SIGNAL
                )));
            }
            State::Created => {}
        }

        let handle = self.sink.open(&self.destination).map_err(|e| match e {
            ExportError::Lifecycle(_) => e,
            other => ExportError::lifecycle(format!(
                "failed to open {} sink for {}: {}",
                self.sink.kind(),
                self.destination,
                other
            )),
        })?;
        *state = State::Started(handle);

        info!(
            signal = %T::SIGNAL,
            sink = self.sink.kind(),
            destination = %self.destination,
            protocol = %self.marshaler.protocol(),
            encoding = %self.marshaler.encoding(),
            "Exporter started"
        );
        Ok(())
    }

    /// Marshal a batch and deliver every message.
    ///
    /// Fails without touching the sink unless the exporter is started.
    /// Marshal and delivery errors are returned as they are; nothing is retried.
    pub fn consume(&self, batch: &Batch<T>) -> Result<()> {
        let state = self.state.read();
        let State::Started(handle) = &*state else {
            return Err(ExportError::lifecycle(format!(
                "{} exporter is not started (state: {})",
                T::SIGNAL,
                state.public()
            )));
        };

        let messages = match self.marshaler.marshal(batch, &self.destination) {
            Ok(messages) => messages,
            Err(e) => {
                self.stats.write().marshal_errors += 1;
                return Err(e);
            }
        };

        if let Err(e) = handle.deliver_all(&messages) {
            self.stats.write().delivery_errors += 1;
            return Err(e);
        }
        for message in &messages {
            trace!(destination = %message.destination, bytes = message.payload.len(), "Delivered message");
        }

        let leaves = batch.leaf_count();
        let skipped = leaves.saturating_sub(messages.len());
        {
            let mut stats = self.stats.write();
            stats.batches_consumed += 1;
            stats.records_flattened += leaves as u64;
            stats.messages_delivered += messages.len() as u64;
            stats.records_skipped += skipped as u64;
        }

        debug!(
            signal = %T::SIGNAL,
            destination = %self.destination,
            records = leaves,
            messages = messages.len(),
            skipped,
            "Consumed batch"
        );
        Ok(())
    }

    /// Release the sink handle.
    ///
    /// Safe to call in any state and more than once. The exporter ends up in
    /// `Shutdown` even when closing the handle fails.
    pub fn shutdown(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.write(), State::Shutdown);

        match previous {
            State::Started(handle) => {
                handle.close().map_err(|e| {
                    ExportError::lifecycle(format!(
                        "failed to release {} sink for {}: {}",
                        self.sink.kind(),
                        self.destination,
                        e
                    ))
                })?;
                let stats = self.stats();
                info!(
                    signal = %T::SIGNAL,
                    batches = stats.batches_consumed,
                    messages = stats.messages_delivered,
                    "Exporter shut down"
                );
            }
            State::Created => debug!(signal = %T::SIGNAL, "Exporter shut down before start"),
            State::Shutdown => {}
        }

        Ok(())
    }
}

impl<T, S> Drop for SignalExporter<T, S>
where
    T: SignalRecord,
    S: Sink,
{
    fn drop(&mut self) {
        let previous = std::mem::replace(self.state.get_mut(), State::Shutdown);
        if let State::Started(handle) = previous
            && let Err(e) = handle.close()
        {
            error!(signal = %T::SIGNAL, error = %e, "Failed to release sink on drop");
        }
    }
}

impl<T, S> std::fmt::Debug for SignalExporter<T, S>
where
    T: SignalRecord,
    S: Sink + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalExporter")
            .field("signal", &T::SIGNAL)
            .field("destination", &self.destination)
            .field("state", &self.state())
            .field("sink", &self.sink)
            .finish()
    }
}

/// Builds the three signal exporters from one shared configuration.
///
/// Exporters built by the same factory share only the configuration and the
/// encoding registry, both immutable.
#[derive(Debug, Clone)]
pub struct ExporterFactory {
    config: Arc<ExporterConfig>,
    registry: Arc<EncodingRegistry>,
}

impl ExporterFactory {
    /// Factory using the built-in encoders.
    pub fn new(config: ExporterConfig) -> Self {
        Self::with_registry(
            Arc::new(config),
            Arc::new(EncodingRegistry::with_defaults()),
        )
    }

    pub fn with_registry(config: Arc<ExporterConfig>, registry: Arc<EncodingRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Arc<ExporterConfig> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EncodingRegistry> {
        &self.registry
    }

    /// Exporter for any signal record type.
    pub fn exporter<T: SignalRecord, S: Sink>(&self, sink: S) -> SignalExporter<T, S> {
        SignalExporter::new(Arc::clone(&self.config), Arc::clone(&self.registry), sink)
    }

    pub fn logs<S: Sink>(&self, sink: S) -> LogsExporter<S> {
        self.exporter(sink)
    }

    pub fn metrics<S: Sink>(&self, sink: S) -> MetricsExporter<S> {
        self.exporter(sink)
    }

    pub fn traces<S: Sink>(&self, sink: S) -> TracesExporter<S> {
        self.exporter(sink)
    }
}

/// Create a logs exporter with the built-in encoders.
pub fn create_logs_exporter<S: Sink>(config: Arc<ExporterConfig>, sink: S) -> LogsExporter<S> {
    SignalExporter::new(config, Arc::new(EncodingRegistry::with_defaults()), sink)
}

/// Create a metrics exporter with the built-in encoders.
pub fn create_metrics_exporter<S: Sink>(
    config: Arc<ExporterConfig>,
    sink: S,
) -> MetricsExporter<S> {
    SignalExporter::new(config, Arc::new(EncodingRegistry::with_defaults()), sink)
}

/// Create a traces exporter with the built-in encoders.
pub fn create_traces_exporter<S: Sink>(config: Arc<ExporterConfig>, sink: S) -> TracesExporter<S> {
    SignalExporter::new(config, Arc::new(EncodingRegistry::with_defaults()), sink)
}

/// Shareable exporter handle.
pub type SharedExporter<T, S> = Arc<SignalExporter<T, S>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorPolicy;
    use crate::sink::MemorySink;
    use sigflat_common::{InstrumentationScope, JSON, Logs, PROTOBUF, Resource, ResourceGroup, ScopeGroup};

    fn logs(count: usize) -> Logs {
        Logs::new().with_resource(ResourceGroup::new(Resource::new()).with_scope(
            ScopeGroup::new(
                InstrumentationScope::new("app"),
                (0..count).map(|i| LogRecord::new(format!("line {}", i))).collect(),
            ),
        ))
    }

    fn exporter(sink: MemorySink) -> LogsExporter<MemorySink> {
        create_logs_exporter(Arc::new(ExporterConfig::new("topic-A", JSON, "flat_json")), sink)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let sink = MemorySink::new();
        let exporter = exporter(sink.clone());
        assert_eq!(exporter.state(), ExporterState::Created);

        exporter.start().unwrap();
        assert_eq!(exporter.state(), ExporterState::Started);

        exporter.consume(&logs(3)).unwrap();
        exporter.shutdown().unwrap();
        assert_eq!(exporter.state(), ExporterState::Shutdown);

        assert_eq!(sink.messages().len(), 3);
        assert_eq!(sink.opened(), 1);
        assert_eq!(sink.closed(), 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let sink = MemorySink::new();
        let exporter = exporter(sink.clone());

        exporter.start().unwrap();
        exporter.start().unwrap();
        assert_eq!(sink.opened(), 1);
    }

    #[test]
    fn test_consume_before_start() {
        let sink = MemorySink::new();
        let exporter = exporter(sink.clone());

        let err = exporter.consume(&logs(1)).unwrap_err();
        assert!(matches!(err, ExportError::Lifecycle(_)));
        assert_eq!(sink.opened(), 0);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_failed_start_stays_created() {
        let sink = MemorySink::new().with_open_failure("unreachable");
        let exporter = exporter(sink.clone());

        assert!(matches!(exporter.start(), Err(ExportError::Lifecycle(_))));
        assert_eq!(exporter.state(), ExporterState::Created);
        assert!(matches!(exporter.consume(&logs(2)), Err(ExportError::Lifecycle(_))));

        // Can retry once the sink recovers.
        sink.set_open_failure(None);
        exporter.start().unwrap();
        exporter.consume(&logs(2)).unwrap();
        assert_eq!(sink.messages().len(), 2);
    }

    #[test]
    fn test_shutdown_idempotent_and_terminal() {
        let exporter = exporter(MemorySink::new());

        exporter.shutdown().unwrap();
        exporter.shutdown().unwrap();
        assert_eq!(exporter.state(), ExporterState::Shutdown);
        assert!(matches!(exporter.start(), Err(ExportError::Lifecycle(_))));
        assert!(matches!(exporter.consume(&logs(1)), Err(ExportError::Lifecycle(_))));
    }

    #[test]
    fn test_close_failure_still_shuts_down() {
        let sink = MemorySink::new().with_close_failure("flush failed");
        let exporter = exporter(sink.clone());
        exporter.start().unwrap();

        assert!(matches!(exporter.shutdown(), Err(ExportError::Lifecycle(_))));
        assert_eq!(exporter.state(), ExporterState::Shutdown);
        assert!(exporter.shutdown().is_ok());
        assert_eq!(sink.closed(), 1);
    }

    #[test]
    fn test_drop_releases_handle() {
        let sink = MemorySink::new();
        {
            let exporter = exporter(sink.clone());
            exporter.start().unwrap();
        }
        assert_eq!(sink.closed(), 1);

        {
            let exporter = exporter(sink.clone());
            exporter.start().unwrap();
            exporter.shutdown().unwrap();
        }
        assert_eq!(sink.closed(), 2);
    }

    #[test]
    fn test_delivery_failure_surfaces_unchanged() {
        let sink = MemorySink::new();
        let exporter = exporter(sink.clone());
        exporter.start().unwrap();

        sink.set_deliver_failure(Some("broker gone".to_string()));
        let err = exporter.consume(&logs(1)).unwrap_err();
        assert!(matches!(err, ExportError::Publish { ref destination, .. } if destination == "topic-A"));
        assert_eq!(exporter.stats().delivery_errors, 1);
        assert_eq!(exporter.state(), ExporterState::Started);
    }

    #[test]
    fn test_stats() {
        let sink = MemorySink::new();
        let exporter = exporter(sink);
        exporter.start().unwrap();

        exporter.consume(&logs(2)).unwrap();
        exporter.consume(&logs(0)).unwrap();
        exporter.consume(&logs(3)).unwrap();

        let stats = exporter.stats();
        assert_eq!(stats.batches_consumed, 3);
        assert_eq!(stats.records_flattened, 5);
        assert_eq!(stats.messages_delivered, 5);
        assert_eq!(stats.records_skipped, 0);
        assert_eq!(stats.marshal_errors, 0);
    }

    #[test]
    fn test_marshal_error_counted_and_nothing_delivered() {
        let sink = MemorySink::new();
        let config = ExporterConfig::new("t", PROTOBUF, "otlp")
            .with_error_policy(ErrorPolicy::SkipRecord);
        let exporter = create_logs_exporter(Arc::new(config), sink.clone());
        exporter.start().unwrap();

        assert!(matches!(exporter.consume(&logs(4)), Err(ExportError::NotImplemented(_))));
        assert!(sink.messages().is_empty());
        assert_eq!(exporter.stats().marshal_errors, 1);
    }

    #[test]
    fn test_factory_destinations() {
        let config = ExporterConfig::new("shared", JSON, "flat_json")
            .with_destination_for(Signal::Traces, "spans");
        let factory = ExporterFactory::new(config);

        let logs = factory.logs(MemorySink::new());
        let metrics = factory.metrics(MemorySink::new());
        let traces = factory.traces(MemorySink::new());

        assert_eq!(logs.signal(), Signal::Logs);
        assert_eq!(metrics.signal(), Signal::Metrics);
        assert_eq!(traces.signal(), Signal::Traces);
        assert_eq!(logs.destination(), "shared");
        assert_eq!(metrics.destination(), "shared");
        assert_eq!(traces.destination(), "spans");
        assert!(Arc::ptr_eq(logs.config(), traces.config()));
    }
}
