//! Connector configuration.
//!
//! All knobs live in one serde-deserialisable struct with sensible
//! defaults, validated when a [`crate::Connector`] is constructed. The two
//! timeouts may also be adjusted later through the connector's setters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// Default for both the connect and the command timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

/// Protocol version requested from the client during the attach handshake.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 9999;

/// Tunables of a [`crate::Connector`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Upper bound on one connect attempt, in milliseconds. Must be
    /// positive.
    pub connect_timeout_ms: u64,
    /// Upper bound on one wait for a command response, in milliseconds.
    /// Must be positive. A silent timeout triggers exactly one resend
    /// before the call fails, so a caller can observe up to twice this.
    pub command_timeout_ms: u64,
    /// Name under which this application identifies itself to the client
    /// (shown in the client's access-grant dialog, where the medium has
    /// one). Must not be empty.
    pub application_name: String,
    /// Wire protocol version negotiated after attaching.
    pub protocol_version: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_TIMEOUT_MS,
            application_name: String::from("attache"),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
        }
    }
}

impl ConnectorConfig {
    /// Checks the configuration for values the connector rejects.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidTimeout`] for a zero timeout and
    /// [`ConnectorError::EmptyArgument`] for an empty application name.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConnectorError::InvalidTimeout {
                what: "connect timeout",
            });
        }
        if self.command_timeout_ms == 0 {
            return Err(ConnectorError::InvalidTimeout {
                what: "command timeout",
            });
        }
        if self.application_name.trim().is_empty() {
            return Err(ConnectorError::EmptyArgument {
                what: "application name",
            });
        }
        Ok(())
    }

    /// The connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The command timeout as a [`Duration`].
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[cfg(test)]
mod tests;
