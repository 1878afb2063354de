//! Unit tests for connector error types.

use std::time::Duration;

use rstest::rstest;

use super::*;

#[test]
fn not_attached_message_includes_status() {
    let error = ConnectorError::NotAttached {
        status: Status::Refused,
    };
    let message = error.to_string();
    assert!(
        message.contains("refused"),
        "expected status in message: {message}"
    );
}

#[test]
fn cancelled_message_includes_command() {
    let error = ConnectorError::Cancelled {
        command: "GET SKYPEVERSION".into(),
    };
    assert!(error.to_string().contains("GET SKYPEVERSION"));
}

#[test]
fn transport_error_keeps_source() {
    let error = ConnectorError::Transport {
        command: "PING".into(),
        source: TransportError::NotConnected,
    };
    let source = std::error::Error::source(&error).expect("source present");
    assert!(source.to_string().contains("not connected"));
}

#[rstest]
#[case::empty(ConnectorError::EmptyArgument { what: "command" }, "command")]
#[case::timeout_setting(ConnectorError::InvalidTimeout { what: "command timeout" }, "greater than zero")]
#[case::disposed(ConnectorError::Disposed, "disposed")]
fn message_names_the_problem(#[case] error: ConnectorError, #[case] needle: &str) {
    let message = error.to_string();
    assert!(message.contains(needle), "missing '{needle}' in: {message}");
}

#[test]
fn future_timeout_reports_wait() {
    let error = ConnectorError::Timeout {
        command: "SEARCH FRIENDS".into(),
        waited: Duration::from_millis(250),
    };
    let message = error.to_string();
    assert!(message.contains("SEARCH FRIENDS"), "got: {message}");
}
