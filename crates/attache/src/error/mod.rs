//! API-level failures and the interpretation of `ERROR` response lines.

use attache_connector::ConnectorError;
use thiserror::Error;

/// Failures surfaced by the high-level client API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The client answered a command with an `ERROR <code> <message>` line.
    #[error("command failed with error {code}: {message}")]
    Command {
        /// Numeric error code reported by the client.
        code: u32,
        /// Human-readable message reported by the client.
        message: String,
    },

    /// The underlying connector failed before a response arrived.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// The response arrived but did not have the shape the command implies.
    #[error("unexpected response: {response}")]
    UnexpectedResponse {
        /// The full response line.
        response: String,
    },
}

/// Splits error responses from payload responses.
///
/// An `ERROR <code> <message>` line becomes [`ApiError::Command`]; anything
/// else passes through for the caller to parse. A malformed error code is
/// reported as code `0` rather than hiding the message.
pub(crate) fn check_error(response: String) -> Result<String, ApiError> {
    match response.strip_prefix("ERROR ") {
        Some(rest) => {
            let (code, message) = rest.split_once(' ').unwrap_or((rest, ""));
            Err(ApiError::Command {
                code: code.parse().unwrap_or(0),
                message: message.trim().to_owned(),
            })
        }
        None => Ok(response),
    }
}
