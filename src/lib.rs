//! Proctor Core - signal-to-event engine for monitored interview sessions
//!
//! Proctor turns per-tick observations of a candidate into a debounced,
//! severity-weighted event log through a deterministic pipeline:
//! detection snapshot → signal trackers → classifier/cooldown → event log →
//! integrity score → report.
//!
//! ## Modules
//!
//! - **Processor**: synchronous per-session pipeline ([`MonitorProcessor`]) and
//!   transcript replay ([`replay_to_report`])
//! - **Monitor**: tokio runtime driving video and audio loops against a
//!   persistence sink ([`Monitor`])

pub mod alerts;
pub mod classifier;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod scoring;
pub mod session;
pub mod sink;
pub mod tracker;
pub mod transcript;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use alerts::{AlertCue, AlertManager, BellCue, SilentCue};
pub use config::MonitorConfig;
pub use error::{ConfigError, DetectionError, MonitorError, SinkError, ValidationError};
pub use monitor::{AudioSource, DetectionSource, Monitor, MonitorBuilder};
pub use pipeline::{replay_to_report, MonitorProcessor, TickOutcome};
pub use scoring::integrity_score;
pub use session::Session;
pub use sink::{MemorySink, PersistenceSink};
pub use transcript::{TranscriptAdapter, TranscriptRecord};
pub use types::{
    Alert, AudioSnapshot, DetectionSnapshot, Event, EventOrder, EventType, Report,
    SessionStatus, Severity,
};

/// Proctor version, reported by the CLI and the C ABI
pub const PROCTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name stamped on CLI output
pub const PRODUCER_NAME: &str = "proctor-core";
