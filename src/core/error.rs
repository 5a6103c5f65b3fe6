//! Error types for tracking, position sources, alert sinks and persistence.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures of the tracking commands.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackingError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("a tracking session is already active")]
    SessionAlreadyActive,
}

/// A position source could not produce a fix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("no fix received within {0:?}")]
    Timeout(Duration),

    #[error("position source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed fix {line:?}: {reason}")]
    Malformed { line: String, reason: String },
}

/// An alert channel rejected a request. Never fatal to a session.
#[derive(Debug, Error)]
pub enum AlertSinkError {
    #[error("audio playback failed: {0}")]
    Audio(String),

    #[error("{0} is not supported on this device")]
    Unsupported(&'static str),
}

/// Destination store persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
