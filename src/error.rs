//! Error types for proctor-core

use thiserror::Error;

/// Errors that can occur while running a monitored session
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid candidate name: {0:?}")]
    InvalidCandidateName(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse transcript: {0}")]
    ParseError(String),

    #[error("Invalid transcript record: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session {session_id} is {status}, cannot {action}")]
    InvalidTransition {
        session_id: String,
        status: String,
        action: String,
    },

    #[error("Persistence error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration problems caught when a config is loaded
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a positive, finite number of seconds (got {value})")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("{field} must be at most {max} (got {value})")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Object label in {category} vocabulary is empty")]
    EmptyLabel { category: String },

    #[error("Object label {label:?} is mapped to both {first} and {second}")]
    DuplicateLabel {
        label: String,
        first: String,
        second: String,
    },
}

/// Failures reported by a detection or audio source.
///
/// These never escape the tick loop: the tick is dropped and the loop continues.
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("Detector failed: {0}")]
    Failed(String),

    #[error("Input device unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a persistence sink
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Persistence backend rejected request: {0}")]
    Rejected(String),

    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),
}

/// Validation errors for transcript records
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("focus_score must be within 0..=100, got {0}")]
    FocusScoreOutOfRange(f64),

    #[error("confidence must be within 0..=1, got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("face_detected is {face_detected} but face_count is {face_count}")]
    InconsistentFaceCount { face_detected: bool, face_count: u32 },

    #[error("volume must be a finite, non-negative number, got {0}")]
    InvalidVolume(f64),

    #[error("Record timestamp {current} is earlier than previous record {previous}")]
    NonMonotonicTimestamp { previous: String, current: String },
}
