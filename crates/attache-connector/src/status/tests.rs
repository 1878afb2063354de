//! Unit tests for the connection status enum.

use std::str::FromStr;

use rstest::rstest;

use super::*;

#[test]
fn default_is_not_running() {
    assert_eq!(Status::default(), Status::NotRunning);
}

#[test]
fn only_attached_reports_attached() {
    assert!(Status::Attached.is_attached());
    assert!(!Status::PendingAuthorization.is_attached());
    assert!(!Status::Refused.is_attached());
    assert!(!Status::NotAvailable.is_attached());
    assert!(!Status::NotRunning.is_attached());
}

#[rstest]
#[case::not_running(Status::NotRunning, "not_running")]
#[case::pending(Status::PendingAuthorization, "pending_authorization")]
#[case::attached(Status::Attached, "attached")]
#[case::refused(Status::Refused, "refused")]
#[case::not_available(Status::NotAvailable, "not_available")]
fn display_and_parse_round_trip(#[case] status: Status, #[case] text: &str) {
    assert_eq!(status.to_string(), text);
    assert_eq!(Status::from_str(text).expect("parse back"), status);
}

#[test]
fn parse_is_case_insensitive() {
    assert_eq!(
        Status::from_str("ATTACHED").expect("parse upper case"),
        Status::Attached
    );
}

#[test]
fn serde_uses_snake_case() {
    let json = serde_json::to_string(&Status::PendingAuthorization).expect("serialise");
    assert_eq!(json, "\"pending_authorization\"");
    let back: Status = serde_json::from_str(&json).expect("deserialise");
    assert_eq!(back, Status::PendingAuthorization);
}
