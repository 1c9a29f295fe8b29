//! Tests for error types

use resnap::{CallError, Error};

#[test]
fn test_configuration_type_error() {
    let error = Error::ConfigurationType("broken failed exists on out".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Backend override rejected"));
    assert!(error_str.contains("must answer exists/list"));
}

#[test]
fn test_unsupported_format_error() {
    let error = Error::UnsupportedFormat("pickle is not supported".to_string());
    assert_eq!(format!("{error}"), "Unsupported format: pickle is not supported");
}

#[test]
fn test_unsupported_backend_error() {
    let error = Error::UnsupportedBackend("ftp".to_string());
    assert!(format!("{error}").contains("Unsupported backend: ftp"));
}

#[test]
fn test_not_found_is_tagged() {
    assert!(Error::NotFound("out/f".to_string()).is_not_found());
    assert!(!Error::Backend("out/f: timeout".to_string()).is_not_found());
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: Error = io_error.into();
    assert!(format!("{error}").contains("IO error"));
    assert!(!error.is_not_found());
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_call_error_keeps_sides_apart() {
    let computation: CallError<std::num::ParseIntError> =
        CallError::Computation("x".parse::<i32>().unwrap_err());
    assert!(!computation.is_checkpoint());
    assert!(format!("{computation}").starts_with("computation failed"));
    assert!(computation.into_computation().is_some());

    let checkpoint: CallError<std::num::ParseIntError> =
        Error::Backend("bucket unreachable".to_string()).into();
    assert!(checkpoint.is_checkpoint());
    assert_eq!(format!("{checkpoint}"), "Backend error: bucket unreachable");
    assert!(checkpoint.into_computation().is_none());
}

#[test]
fn test_error_debug() {
    let error = Error::Binding("missing required argument 'a'".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Binding"));
}
