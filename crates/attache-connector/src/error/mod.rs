//! Domain errors raised by connector operations.
//!
//! All errors use `thiserror`-derived enums with structured context so
//! callers can inspect the failure programmatically. A response line that
//! begins with the protocol's `ERROR ` marker is *not* an error at this
//! layer — it is returned as ordinary response text, and translating it
//! into a typed failure is the facade's concern.

use std::time::Duration;

use thiserror::Error;

use crate::status::Status;
use crate::transport::TransportError;

/// Errors arising from connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The connector could not reach (or stay in) the attached state.
    ///
    /// Raised when a connect attempt does not land on
    /// [`Status::Attached`], and when a correlated command's single retry
    /// also goes unanswered (the client is presumed dead or hung).
    #[error("not attached to the client (status: {status})")]
    NotAttached {
        /// The terminal status observed.
        status: Status,
    },

    /// The wait for a response was cancelled before a matching line arrived.
    #[error("the '{command}' command was cancelled while awaiting its response")]
    Cancelled {
        /// The command whose response was being awaited.
        command: String,
    },

    /// A caller-supplied deadline on a response future elapsed.
    ///
    /// Distinct from the correlator's internal command timeout, which is
    /// never surfaced directly: internally the first silent timeout triggers
    /// one retry, and a second silence escalates to [`Self::NotAttached`].
    #[error("no matching response to '{command}' within {waited:?}")]
    Timeout {
        /// The command whose response was being awaited.
        command: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The transport failed while sending a command.
    ///
    /// Send failures are propagated without retry; the built-in retry
    /// applies only to silence after a successful send.
    #[error("transport failure while sending '{command}': {source}")]
    Transport {
        /// The command that could not be sent.
        command: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The transport failed while establishing the connection.
    #[error("transport failure while connecting: {source}")]
    ConnectFailed {
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The connector's delivery thread could not be started.
    #[error("failed to start the delivery thread: {source}")]
    Startup {
        /// Underlying I/O error.
        #[source]
        source: std::sync::Arc<std::io::Error>,
    },

    /// A required textual argument was empty.
    #[error("{what} must not be empty")]
    EmptyArgument {
        /// Name of the offending argument.
        what: &'static str,
    },

    /// A timeout setting was zero.
    #[error("{what} must be greater than zero")]
    InvalidTimeout {
        /// Name of the offending setting.
        what: &'static str,
    },

    /// The connector has been disposed and accepts no further calls.
    #[error("the connector has been disposed")]
    Disposed,
}

#[cfg(test)]
mod tests;
