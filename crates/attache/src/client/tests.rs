//! Tests for the typed command surface, scripted end to end.

use attache_connector::test_support::{ScriptedHandle, ScriptedTransport};
use attache_connector::{Connector, ConnectorConfig};
use rstest::rstest;

use super::Client;
use crate::error::ApiError;

/// Scripts a client whose transport answers `command` with `reply`, both
/// without the wire tag the connector adds and expects back.
fn scripted_client(command: &'static str, reply: &'static str) -> (Client, ScriptedHandle) {
    let (transport, handle) = ScriptedTransport::attached();
    handle.set_responder(move |line| {
        let (tag, sent) = line.split_once(' ').expect("tagged command");
        assert_eq!(sent, command);
        vec![format!("{tag} {reply}")]
    });
    let connector = Connector::new(transport, ConnectorConfig::default()).expect("connector");
    (Client::new(connector), handle)
}

#[rstest]
fn client_version_strips_the_response_header() {
    let (client, _handle) = scripted_client("GET SKYPEVERSION", "SKYPEVERSION 8.1");
    assert_eq!(client.client_version().expect("version"), "8.1");
}

#[rstest]
fn mood_text_reads_the_profile_property() {
    let (client, _handle) =
        scripted_client("GET PROFILE MOOD_TEXT", "PROFILE MOOD_TEXT out to lunch");
    assert_eq!(client.mood_text().expect("mood text"), "out to lunch");
}

#[rstest]
fn set_mood_text_accepts_the_echoed_value() {
    let (client, handle) = scripted_client("SET PROFILE MOOD_TEXT busy", "PROFILE MOOD_TEXT busy");
    client.set_mood_text("busy").expect("set mood text");
    assert_eq!(handle.sent_count(), 2);
}

#[rstest]
fn user_mood_text_addresses_the_user_object() {
    let (client, _handle) = scripted_client(
        "GET USER echo123 MOOD_TEXT",
        "USER echo123 MOOD_TEXT echo echo",
    );
    assert_eq!(
        client.user_mood_text("echo123").expect("mood text"),
        "echo echo"
    );
}

#[rstest]
fn error_responses_become_command_failures() {
    let (client, _handle) = scripted_client("GET PROFILE MOOD_TEXT", "ERROR 68 Access denied");
    let outcome = client.mood_text();
    match outcome {
        Err(ApiError::Command { code, message }) => {
            assert_eq!(code, 68);
            assert_eq!(message, "Access denied");
        }
        other => panic!("expected a command failure, got {other:?}"),
    }
}

#[rstest]
fn an_empty_value_is_returned_as_is() {
    let (client, _handle) = scripted_client("GET SKYPEVERSION", "SKYPEVERSION ");
    assert_eq!(client.client_version().expect("version"), "");
}
