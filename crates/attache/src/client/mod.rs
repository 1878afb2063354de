//! High-level, typed commands over a [`Connector`].
//!
//! Every method here is a thin translation layer: build the command line,
//! run it tagged through the connector, interpret `ERROR` responses, and
//! strip the response down to the value the caller asked for.

use attache_connector::Connector;

use crate::error::{ApiError, check_error};

/// Tracing target for the high-level API.
const CLIENT_TARGET: &str = "attache::client";

/// Typed command surface over one attached client.
#[derive(Debug, Clone)]
pub struct Client {
    connector: Connector,
}

impl Client {
    /// Wraps a connector. The connector attaches lazily on first use.
    #[must_use]
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    /// The underlying connector, for raw commands and listeners.
    #[must_use]
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// The client application's version string.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Command`] for an `ERROR` response,
    /// [`ApiError::UnexpectedResponse`] for a malformed one, and any
    /// connector failure.
    pub fn client_version(&self) -> Result<String, ApiError> {
        let response = check_error(
            self.connector
                .execute_with_id("GET SKYPEVERSION", "SKYPEVERSION ")?,
        )?;
        strip_header(response, "SKYPEVERSION ")
    }

    /// The logged-in profile's mood text.
    ///
    /// # Errors
    ///
    /// See [`Client::client_version`].
    pub fn mood_text(&self) -> Result<String, ApiError> {
        self.read_property("PROFILE", "MOOD_TEXT")
    }

    /// Replaces the logged-in profile's mood text.
    ///
    /// # Errors
    ///
    /// See [`Client::client_version`].
    pub fn set_mood_text(&self, text: &str) -> Result<(), ApiError> {
        self.write_property("PROFILE", "MOOD_TEXT", text)
    }

    /// The mood text of another user, by their id.
    ///
    /// # Errors
    ///
    /// See [`Client::client_version`].
    pub fn user_mood_text(&self, user_id: &str) -> Result<String, ApiError> {
        self.read_property(&format!("USER {user_id}"), "MOOD_TEXT")
    }

    /// Runs `GET <subject> <property>` and returns the value after the
    /// echoed `<subject> <property> ` header.
    fn read_property(&self, subject: &str, property: &str) -> Result<String, ApiError> {
        let header = format!("{subject} {property} ");
        let response = check_error(
            self.connector
                .execute_with_id(&format!("GET {subject} {property}"), &header)?,
        )?;
        strip_header(response, &header)
    }

    /// Runs `SET <subject> <property> <value>` and checks the echo.
    fn write_property(&self, subject: &str, property: &str, value: &str) -> Result<(), ApiError> {
        let header = format!("{subject} {property}");
        let response = check_error(
            self.connector
                .execute_with_id(&format!("SET {subject} {property} {value}"), &header)?,
        )?;
        if response.starts_with(&header) {
            tracing::debug!(target: CLIENT_TARGET, "set {subject} {property}");
            Ok(())
        } else {
            Err(ApiError::UnexpectedResponse { response })
        }
    }
}

fn strip_header(response: String, header: &str) -> Result<String, ApiError> {
    match response.strip_prefix(header) {
        Some(value) => Ok(value.to_owned()),
        None => Err(ApiError::UnexpectedResponse { response }),
    }
}

#[cfg(test)]
mod tests;
