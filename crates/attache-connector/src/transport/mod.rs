//! Transport seam between the connector core and the client process.
//!
//! A [`Transport`] moves raw text lines to and from the separately running
//! client. The core places no requirements on the mechanism — the shipping
//! [`socket::TcpLineTransport`] bridges over TCP, and the scripted transport
//! in `test_support` loops lines back in-process — only on the contract:
//! outgoing lines go through [`Transport::send_line`], and every complete
//! inbound line is handed to the [`NotificationSink`] the connector binds at
//! construction time.
//!
//! Transports are chosen once, by the host application, and injected into
//! [`crate::Connector::new`]; there is no platform discovery.

use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;

use crate::status::Status;

pub mod socket;

/// Failures raised by a transport implementation.
///
/// I/O sources are wrapped in `Arc` so the error stays cloneable and small.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Establishing the connection to the client failed outright.
    #[error("failed to connect to the client at {endpoint}: {source}")]
    Connect {
        /// Endpoint the transport tried to reach.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// An I/O failure occurred on an established link.
    #[error("I/O failure on the client link: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A send was attempted while the transport has no live connection.
    #[error("the transport is not connected")]
    NotConnected,
}

impl TransportError {
    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }
}

/// Platform- or medium-specific line mover consumed by the connector core.
///
/// Implementations are driven from multiple threads but always through the
/// connector's transport lock, so methods take `&mut self` and need no
/// internal synchronisation for the outgoing path. The inbound path is the
/// implementation's own (typically a dedicated reader thread) and must hand
/// every complete line to the bound [`NotificationSink`].
pub trait Transport: Send {
    /// Binds the sink inbound lines and status changes are delivered to.
    ///
    /// Called exactly once, by [`crate::Connector::new`], before any other
    /// method.
    fn bind(&mut self, sink: NotificationSink);

    /// Attempts to establish the connection to the client.
    ///
    /// Returns the resulting [`Status`] when the attempt itself could be
    /// carried out (including attempts that end in [`Status::NotRunning`] or
    /// [`Status::Refused`]).
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] only when the attempt could not be made
    /// at all.
    fn connect(&mut self, timeout: Duration) -> Result<Status, TransportError>;

    /// Sends one line of text to the client.
    ///
    /// The line must not contain a newline; framing is the transport's
    /// responsibility.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the line could not be written.
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Registers the application name with the client, where the medium has
    /// such a notion. The default does nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when registration fails.
    fn register_application_name(&mut self, name: &str) -> Result<(), TransportError> {
        let _ = name;
        Ok(())
    }

    /// Tears down the connection and releases transport resources.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when teardown fails; the connector
    /// treats the transport as gone either way.
    fn dispose(&mut self) -> Result<(), TransportError>;
}

/// Receiver half of the transport contract.
///
/// Everything the connector core consumes from a transport arrives through
/// this handle: complete inbound lines and transport-observed status
/// changes (for example the client process going away). The sink holds a
/// weak reference, so a transport outliving its connector delivers into the
/// void rather than keeping the core alive.
#[derive(Clone)]
pub struct NotificationSink {
    handler: Weak<dyn InboundHandler>,
}

impl NotificationSink {
    pub(crate) fn new(handler: Weak<dyn InboundHandler>) -> Self {
        Self { handler }
    }

    /// Delivers one complete inbound line (without its terminator).
    pub fn notify_received(&self, line: &str) {
        if let Some(handler) = self.handler.upgrade() {
            handler.handle_line(line);
        }
    }

    /// Reports a status change observed by the transport.
    pub fn notify_status(&self, status: Status) {
        if let Some(handler) = self.handler.upgrade() {
            handler.handle_status(status);
        }
    }
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink").finish_non_exhaustive()
    }
}

/// Connector-side consumer of inbound transport traffic.
pub(crate) trait InboundHandler: Send + Sync {
    /// Handles one complete inbound line.
    fn handle_line(&self, line: &str);
    /// Handles a transport-observed status change.
    fn handle_status(&self, status: Status);
}
