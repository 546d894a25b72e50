//! Unit tests for error display formats and conversions.

use courier_gateway::session::Phase;
use courier_gateway::AppError;

#[test]
fn display_formats_name_the_domain() {
    assert_eq!(
        AppError::Config("bad port".into()).to_string(),
        "config: bad port"
    );
    assert_eq!(
        AppError::Transport("pipe broke".into()).to_string(),
        "transport: pipe broke"
    );
    assert_eq!(
        AppError::Send("rejected".into()).to_string(),
        "send: rejected"
    );
    assert_eq!(
        AppError::Render("no image".into()).to_string(),
        "pairing render: no image"
    );
    assert_eq!(
        AppError::AuthFailed("bad credentials".into()).to_string(),
        "authentication failed: bad credentials"
    );
    assert_eq!(AppError::Io("disk gone".into()).to_string(), "io: disk gone");
}

#[test]
fn not_ready_carries_the_observed_phase() {
    let err = AppError::NotReady {
        phase: Phase::Disconnected,
    };
    assert_eq!(err.to_string(), "not ready: session is disconnected");
}

#[test]
fn timeout_carries_the_observed_phase() {
    let err = AppError::Timeout {
        phase: Phase::Initializing,
    };
    assert_eq!(
        err.to_string(),
        "timed out waiting for readiness: session is initializing"
    );
}

#[test]
fn toml_errors_convert_to_config() {
    let parse_error = toml::from_str::<toml::Value>("not = = toml").unwrap_err();
    let err: AppError = parse_error.into();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("invalid config"));
}

#[test]
fn io_errors_convert_to_io() {
    let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io_error.into();
    assert!(matches!(err, AppError::Io(_)));
}
