// crates/mailgate-config/tests/server_validation.rs
// ============================================================================
// Module: Server Validation Tests
// Description: Validation tests for server and session configuration fields.
// Purpose: Ensure invalid deployments are rejected before serving traffic.
// Dependencies: mailgate-config
// ============================================================================

//! ## Overview
//! Validates field-level rejection for the server bind address, body limits,
//! session windows, and OAuth client settings.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use mailgate_config::ConfigError;
use mailgate_config::MailgateConfig;
use mailgate_config::OauthConfig;

#[test]
fn default_config_is_valid() {
    let config = MailgateConfig::default();
    config.validate().expect("defaults validate");
    assert_eq!(config.bind_addr().expect("bind parses").port(), 8417);
}

#[test]
fn invalid_bind_is_rejected() {
    let mut config = MailgateConfig::default();
    config.server.bind = "not-an-address".to_string();
    let err = config.validate().expect_err("invalid bind");
    assert!(matches!(err, ConfigError::Invalid { field: "server.bind", .. }));
}

#[test]
fn zero_body_limit_is_rejected() {
    let mut config = MailgateConfig::default();
    config.server.max_body_bytes = 0;
    let err = config.validate().expect_err("zero limit");
    assert!(matches!(err, ConfigError::Invalid { field: "server.max_body_bytes", .. }));
}

#[test]
fn non_positive_windows_are_rejected() {
    let mut config = MailgateConfig::default();
    config.session.idle_threshold_secs = 0;
    assert!(config.validate().is_err());

    let mut config = MailgateConfig::default();
    config.session.sweep_interval_secs = -5;
    assert!(config.validate().is_err());

    let mut config = MailgateConfig::default();
    config.session.token_ttl_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn sweep_interval_must_not_exceed_idle_threshold() {
    let mut config = MailgateConfig::default();
    config.session.idle_threshold_secs = 60;
    config.session.sweep_interval_secs = 120;
    let err = config.validate().expect_err("interval too long");
    assert!(matches!(err, ConfigError::Invalid { field: "session.sweep_interval_secs", .. }));
}

#[test]
fn oauth_fields_are_validated() {
    let mut config = MailgateConfig::default();
    config.oauth = Some(OauthConfig {
        client_id: " ".to_string(),
        client_secret: "secret".to_string(),
        callback_url: "http://127.0.0.1:8418/callback".to_string(),
    });
    let err = config.validate().expect_err("blank client id");
    assert!(matches!(err, ConfigError::Invalid { field: "oauth.client_id", .. }));

    let mut config = MailgateConfig::default();
    config.oauth = Some(OauthConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        callback_url: "ftp://example.com/callback".to_string(),
    });
    let err = config.validate().expect_err("bad scheme");
    assert!(matches!(err, ConfigError::Invalid { field: "oauth.callback_url", .. }));
}
