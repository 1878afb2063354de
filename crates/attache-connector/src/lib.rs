//! Blocking command/notification bridge to a separately running chat
//! client that speaks a line-oriented text protocol.
//!
//! The [`Connector`] sends command lines and blocks the calling thread
//! until the client's matching response line arrives, correlating
//! overlapping commands with a numeric wire tag. Unsolicited notification
//! lines fan out to registered [`ConnectorListener`]s, either inline on
//! the transport's reader thread or on a dedicated delivery thread.
//!
//! The wire medium is pluggable through the [`Transport`] trait; the crate
//! ships a TCP implementation and, behind the `test-support` feature, a
//! fully scripted in-process one.

pub mod config;
pub mod connector;
mod dispatch;
pub mod error;
pub mod listener;
pub mod pending;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transport;

pub use config::ConnectorConfig;
pub use connector::Connector;
pub use error::ConnectorError;
pub use listener::{ConnectorListener, ListenerPanicHook, MessageEvent, StatusEvent};
pub use pending::ResponseFuture;
pub use status::Status;
pub use transport::{NotificationSink, Transport, TransportError, socket::TcpLineTransport};
