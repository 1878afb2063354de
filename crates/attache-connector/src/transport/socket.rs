//! Line-oriented TCP transport.
//!
//! Bridges the connector to a client listening on a TCP endpoint. A
//! dedicated reader thread splits the inbound byte stream into lines and
//! hands each one to the bound [`NotificationSink`]; the connector observes
//! end-of-stream as a transition to [`Status::NotRunning`].

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use super::{NotificationSink, Transport, TransportError};
use crate::status::Status;

/// Tracing target for socket traffic and lifecycle.
const SOCKET_TARGET: &str = "attache_connector::transport::socket";

/// [`Transport`] over a TCP connection to a `host:port` endpoint.
///
/// Connection attempts distinguish an absent client (refused or timed out,
/// reported as [`Status::NotRunning`]) from an unusable endpoint (failed
/// resolution, reported as [`Status::NotAvailable`]). Neither is a transport
/// error; both are answers.
pub struct TcpLineTransport {
    endpoint: String,
    sink: Option<NotificationSink>,
    stream: Option<TcpStream>,
    reader: Option<JoinHandle<()>>,
}

impl TcpLineTransport {
    /// Creates a transport that will connect to `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            sink: None,
            stream: None,
            reader: None,
        }
    }

    fn resolve(&self) -> Option<SocketAddr> {
        match self.endpoint.to_socket_addrs() {
            Ok(mut addresses) => {
                let address = addresses.next();
                if address.is_none() {
                    tracing::debug!(
                        target: SOCKET_TARGET,
                        "{} resolved to no addresses",
                        self.endpoint
                    );
                }
                address
            }
            Err(error) => {
                tracing::debug!(
                    target: SOCKET_TARGET,
                    "failed to resolve {}: {error}",
                    self.endpoint
                );
                None
            }
        }
    }
}

impl Transport for TcpLineTransport {
    fn bind(&mut self, sink: NotificationSink) {
        self.sink = Some(sink);
    }

    fn connect(&mut self, timeout: Duration) -> Result<Status, TransportError> {
        let Some(sink) = self.sink.clone() else {
            return Err(TransportError::NotConnected);
        };
        let Some(address) = self.resolve() else {
            return Ok(Status::NotAvailable);
        };
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(TransportError::io)?;
                let inbound = stream.try_clone().map_err(TransportError::io)?;
                let handle = Builder::new()
                    .name(String::from("attache-reader"))
                    .spawn(move || read_loop(inbound, &sink))
                    .map_err(TransportError::io)?;
                self.stream = Some(stream);
                self.reader = Some(handle);
                tracing::debug!(target: SOCKET_TARGET, "connected to {address}");
                Ok(Status::Attached)
            }
            Err(error) => {
                tracing::debug!(
                    target: SOCKET_TARGET,
                    "connection to {address} failed: {error}"
                );
                Ok(Status::NotRunning)
            }
        }
    }

    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(line.as_bytes()).map_err(TransportError::io)?;
        stream.write_all(b"\n").map_err(TransportError::io)?;
        stream.flush().map_err(TransportError::io)
    }

    fn dispose(&mut self) -> Result<(), TransportError> {
        let shutdown = match self.stream.take() {
            Some(stream) => match stream.shutdown(Shutdown::Both) {
                Err(error) if error.kind() != io::ErrorKind::NotConnected => {
                    Err(TransportError::io(error))
                }
                _ => Ok(()),
            },
            None => Ok(()),
        };
        if shutdown.is_ok() {
            if let Some(handle) = self.reader.take()
                && handle.join().is_err()
            {
                tracing::debug!(target: SOCKET_TARGET, "reader thread panicked during teardown");
            }
        } else {
            // The reader may still be blocked on the socket; detach rather
            // than risk joining a thread that will never exit.
            self.reader = None;
        }
        shutdown
    }
}

fn read_loop(stream: TcpStream, sink: &NotificationSink) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(text) => {
                let trimmed = text.trim_end_matches('\r');
                tracing::trace!(target: SOCKET_TARGET, "received: {trimmed}");
                sink.notify_received(trimmed);
            }
            Err(error) => {
                tracing::debug!(target: SOCKET_TARGET, "read failed: {error}");
                break;
            }
        }
    }
    tracing::debug!(target: SOCKET_TARGET, "client stream ended");
    sink.notify_status(Status::NotRunning);
}
