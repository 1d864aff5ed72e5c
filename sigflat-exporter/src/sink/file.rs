//! Append-only file sink.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Sink, SinkHandle};
use crate::error::{ExportError, Result};
use crate::marshal::OutputMessage;

/// How payloads are laid out in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One payload per line (JSON lines).
    #[default]
    Lines,
    /// Payloads back to back, for self-delimiting encodings such as CBOR.
    Concatenated,
}

/// Appends payloads to the file named by the destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink {
    framing: Framing,
}

impl FileSink {
    pub fn new(framing: Framing) -> Self {
        Self { framing }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }
}

impl Sink for FileSink {
    type Handle = FileHandle;

    fn kind(&self) -> &'static str {
        "file"
    }

    fn open(&self, destination: &str) -> Result<FileHandle> {
        let path = PathBuf::from(destination);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ExportError::lifecycle(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ExportError::lifecycle(format!("failed to open {}: {}", path.display(), e))
            })?;

        info!(path = %path.display(), framing = ?self.framing, "Opened file sink");

        Ok(FileHandle {
            destination: destination.to_string(),
            path,
            framing: self.framing,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

/// An open file, shared by concurrent appends.
#[derive(Debug)]
pub struct FileHandle {
    destination: String,
    path: PathBuf,
    framing: Framing,
    writer: Mutex<BufWriter<File>>,
}

impl FileHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_error(&self, message: impl Into<String>) -> ExportError {
        ExportError::Append {
            path: self.path.display().to_string(),
            message: message.into(),
        }
    }

    /// Append one already-framed block and flush it.
    fn append(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer
            .write_all(bytes)
            .map_err(|e| self.append_error(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| self.append_error(e.to_string()))
    }
}

impl SinkHandle for FileHandle {
    fn deliver(&self, message: &OutputMessage) -> Result<()> {
        self.deliver_all(std::slice::from_ref(message))
    }

    fn deliver_all(&self, messages: &[OutputMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut block = Vec::with_capacity(messages.iter().map(|m| m.payload.len() + 1).sum());
        for message in messages {
            if message.destination != self.destination {
                return Err(self.append_error(format!(
                    "message addressed to '{}' but the sink is open on '{}'",
                    message.destination, self.destination
                )));
            }
            block.extend_from_slice(&message.payload);
            if self.framing == Framing::Lines {
                block.push(b'\n');
            }
        }

        self.append(&block)?;
        debug!(path = %self.path.display(), messages = messages.len(), bytes = block.len(), "Appended batch");
        Ok(())
    }

    fn close(self) -> Result<()> {
        let path = self.path.display().to_string();
        let file = self
            .writer
            .into_inner()
            .into_inner()
            .map_err(|e| ExportError::Append {
                path: path.clone(),
                message: e.error().to_string(),
            })?;
        file.sync_all().map_err(|e| ExportError::Append {
            path: path.clone(),
            message: e.to_string(),
        })?;

        info!(path = %path, "Closed file sink");
        Ok(())
    }
}
