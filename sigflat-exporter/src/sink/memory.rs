//! In-memory sink for tests and dry runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{Sink, SinkHandle};
use crate::error::{ExportError, Result};
use crate::marshal::OutputMessage;

#[derive(Debug, Default)]
struct MemoryState {
    messages: Mutex<Vec<OutputMessage>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_failure: Mutex<Option<String>>,
    deliver_failure: Mutex<Option<String>>,
    close_failure: Mutex<Option<String>>,
}

/// Collects delivered messages in memory.
///
/// Clones share the same store, so a test can keep one clone and hand
/// another to an exporter. Failures can be injected for each operation.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail with `reason`.
    pub fn with_open_failure(self, reason: impl Into<String>) -> Self {
        self.set_open_failure(Some(reason.into()));
        self
    }

    /// Make `deliver` fail with `reason`.
    pub fn with_deliver_failure(self, reason: impl Into<String>) -> Self {
        self.set_deliver_failure(Some(reason.into()));
        self
    }

    /// Make `close` fail with `reason`.
    pub fn with_close_failure(self, reason: impl Into<String>) -> Self {
        self.set_close_failure(Some(reason.into()));
        self
    }

    pub fn set_open_failure(&self, reason: Option<String>) {
        *self.state.open_failure.lock() = reason;
    }

    pub fn set_deliver_failure(&self, reason: Option<String>) {
        *self.state.deliver_failure.lock() = reason;
    }

    pub fn set_close_failure(&self, reason: Option<String>) {
        *self.state.close_failure.lock() = reason;
    }

    /// Messages delivered so far, in delivery order.
    pub fn messages(&self) -> Vec<OutputMessage> {
        self.state.messages.lock().clone()
    }

    /// Number of handles opened.
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Number of handles closed.
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl Sink for MemorySink {
    type Handle = MemoryHandle;

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn open(&self, destination: &str) -> Result<MemoryHandle> {
        if let Some(reason) = self.state.open_failure.lock().clone() {
            return Err(ExportError::lifecycle(format!(
                "failed to open memory sink for {}: {}",
                destination, reason
            )));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryHandle {
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle onto a [`MemorySink`] store.
#[derive(Debug)]
pub struct MemoryHandle {
    state: Arc<MemoryState>,
}

impl SinkHandle for MemoryHandle {
    fn deliver(&self, message: &OutputMessage) -> Result<()> {
        if let Some(reason) = self.state.deliver_failure.lock().clone() {
            return Err(ExportError::Publish {
                destination: message.destination.clone(),
                message: reason,
            });
        }

        self.state.messages.lock().push(message.clone());
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        match self.state.close_failure.lock().clone() {
            Some(reason) => Err(ExportError::lifecycle(reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &str) -> OutputMessage {
        OutputMessage {
            destination: "topic".to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_clones_share_store() {
        let sink = MemorySink::new();
        let handle = sink.clone().open("topic").unwrap();

        handle.deliver_all(&[message("a"), message("b")]).unwrap();
        handle.close().unwrap();

        assert_eq!(sink.messages().len(), 2);
        assert_eq!(sink.messages()[1].payload, b"b");
        assert_eq!(sink.opened(), 1);
        assert_eq!(sink.closed(), 1);
    }

    #[test]
    fn test_injected_failures() {
        let sink = MemorySink::new().with_open_failure("broker down");
        assert!(matches!(sink.open("t"), Err(ExportError::Lifecycle(_))));

        sink.set_open_failure(None);
        sink.set_deliver_failure(Some("queue full".to_string()));
        let handle = sink.open("t").unwrap();
        let err = handle.deliver(&message("x")).unwrap_err();
        assert!(matches!(err, ExportError::Publish { ref message, .. } if message == "queue full"));
        assert!(sink.messages().is_empty());
    }
}
