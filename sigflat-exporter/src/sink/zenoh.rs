//! Zenoh publishing sink.

use std::sync::Arc;

use sigflat_common::ZenohConfig;
use tracing::{info, trace};
use zenoh::key_expr::KeyExpr;
use zenoh::{Session, Wait};

use super::{Sink, SinkHandle};
use crate::error::{ExportError, Result};
use crate::marshal::OutputMessage;

/// Publishes each payload to the destination key expression.
#[derive(Clone)]
pub struct ZenohSink {
    source: SessionSource,
}

#[derive(Clone)]
enum SessionSource {
    /// Open a dedicated session on start and close it on shutdown.
    Connect(ZenohConfig),
    /// Publish on a session owned by the caller.
    Shared(Arc<Session>),
}

impl ZenohSink {
    /// Sink that opens its own session from `config`.
    pub fn new(config: ZenohConfig) -> Self {
        Self {
            source: SessionSource::Connect(config),
        }
    }

    /// Sink that publishes on an existing session. The session is left open
    /// when the handle is closed.
    pub fn with_session(session: Arc<Session>) -> Self {
        Self {
            source: SessionSource::Shared(session),
        }
    }
}

impl std::fmt::Debug for ZenohSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            SessionSource::Connect(config) => f
                .debug_struct("ZenohSink")
                .field("config", config)
                .finish(),
            SessionSource::Shared(session) => f
                .debug_struct("ZenohSink")
                .field("shared_zid", &session.zid().to_string())
                .finish(),
        }
    }
}

impl Sink for ZenohSink {
    type Handle = ZenohHandle;

    fn kind(&self) -> &'static str {
        "zenoh"
    }

    fn open(&self, destination: &str) -> Result<ZenohHandle> {
        KeyExpr::try_from(destination).map_err(|e| {
            ExportError::lifecycle(format!("invalid key expression '{}': {}", destination, e))
        })?;

        let (session, owned) = match &self.source {
            SessionSource::Connect(config) => {
                let session = sigflat_common::connect(config).map_err(|e| {
                    ExportError::lifecycle(format!("failed to open Zenoh session: {}", e))
                })?;
                (Arc::new(session), true)
            }
            SessionSource::Shared(session) => (Arc::clone(session), false),
        };

        info!(key_expr = %destination, owned, "Opened Zenoh sink");
        Ok(ZenohHandle { session, owned })
    }
}

/// Publisher side of a [`ZenohSink`].
pub struct ZenohHandle {
    session: Arc<Session>,
    owned: bool,
}

impl std::fmt::Debug for ZenohHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenohHandle")
            .field("zid", &self.session.zid().to_string())
            .field("owned", &self.owned)
            .finish()
    }
}

impl SinkHandle for ZenohHandle {
    fn deliver(&self, message: &OutputMessage) -> Result<()> {
        self.session
            .put(message.destination.as_str(), message.payload.clone())
            .wait()
            .map_err(|e| ExportError::Publish {
                destination: message.destination.clone(),
                message: e.to_string(),
            })?;

        trace!(key_expr = %message.destination, bytes = message.payload.len(), "Published");
        Ok(())
    }

    fn close(self) -> Result<()> {
        if !self.owned {
            return Ok(());
        }

        self.session
            .close()
            .wait()
            .map_err(|e| ExportError::lifecycle(format!("failed to close Zenoh session: {}", e)))?;

        info!("Closed Zenoh session");
        Ok(())
    }
}
