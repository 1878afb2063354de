//! Connection status reported by a [`crate::Connector`].
//!
//! The status is a single process-wide value owned by the connector. It is
//! only mutated by the connector itself (connect attempts, liveness
//! failures, disposal) or by the transport through its notification sink;
//! every mutation is broadcast to all registered listeners.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle states of the link between this process and the client.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Status {
    /// No connection to the client is established.
    #[default]
    NotRunning,
    /// Waiting for the user to authorise this application inside the client.
    PendingAuthorization,
    /// Attached to the client; commands may be issued.
    Attached,
    /// The user denied this application access to the client.
    Refused,
    /// No client is available to connect to.
    NotAvailable,
}

impl Status {
    /// Returns `true` when commands may be issued over the link.
    #[must_use]
    pub const fn is_attached(self) -> bool {
        matches!(self, Self::Attached)
    }
}

#[cfg(test)]
mod tests;
