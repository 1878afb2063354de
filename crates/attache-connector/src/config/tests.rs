//! Unit tests for connector configuration.

use rstest::rstest;

use super::*;

#[test]
fn defaults_are_twenty_seconds() {
    let config = ConnectorConfig::default();
    assert_eq!(config.connect_timeout(), Duration::from_secs(20));
    assert_eq!(config.command_timeout(), Duration::from_secs(20));
    assert_eq!(config.protocol_version, DEFAULT_PROTOCOL_VERSION);
    config.validate().expect("defaults validate");
}

#[rstest]
#[case::zero_connect(ConnectorConfig { connect_timeout_ms: 0, ..ConnectorConfig::default() })]
#[case::zero_command(ConnectorConfig { command_timeout_ms: 0, ..ConnectorConfig::default() })]
fn zero_timeouts_are_rejected(#[case] config: ConnectorConfig) {
    let error = config.validate().expect_err("zero timeout must fail");
    assert!(matches!(error, ConnectorError::InvalidTimeout { .. }));
}

#[test]
fn blank_application_name_is_rejected() {
    let config = ConnectorConfig {
        application_name: "   ".into(),
        ..ConnectorConfig::default()
    };
    let error = config.validate().expect_err("blank name must fail");
    assert!(matches!(
        error,
        ConnectorError::EmptyArgument {
            what: "application name"
        }
    ));
}

#[test]
fn deserialises_with_partial_fields() {
    let config: ConnectorConfig =
        serde_json::from_str(r#"{"command_timeout_ms": 5000}"#).expect("deserialise");
    assert_eq!(config.command_timeout(), Duration::from_secs(5));
    assert_eq!(config.connect_timeout(), Duration::from_secs(20));
    assert_eq!(config.application_name, "attache");
}
