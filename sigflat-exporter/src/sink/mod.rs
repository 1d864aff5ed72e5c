//! Delivery capabilities that exporters hand output messages to.
//!
//! A [`Sink`] is configuration for a transport or storage backend. Starting
//! an exporter opens a [`SinkHandle`] on the exporter's destination; the
//! handle is shared by concurrent `consume` calls and released on shutdown.

mod file;
mod memory;
mod zenoh;

pub use self::file::{FileHandle, FileSink, Framing};
pub use self::memory::{MemoryHandle, MemorySink};
pub use self::zenoh::{ZenohHandle, ZenohSink};

use crate::error::Result;
use crate::marshal::OutputMessage;

/// Factory for sink handles.
pub trait Sink: Send + Sync {
    /// Open handle type.
    type Handle: SinkHandle;

    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Acquire a handle for `destination` (a topic or a file path).
    fn open(&self, destination: &str) -> Result<Self::Handle>;
}

/// An acquired transport or storage handle.
///
/// Handles must tolerate concurrent use; any serialization happens inside.
pub trait SinkHandle: Send + Sync {
    /// Deliver one message.
    fn deliver(&self, message: &OutputMessage) -> Result<()>;

    /// Deliver a batch of messages in order, stopping at the first failure.
    fn deliver_all(&self, messages: &[OutputMessage]) -> Result<()> {
        for message in messages {
            self.deliver(message)?;
        }
        Ok(())
    }

    /// Release the handle.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
