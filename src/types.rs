//! Core data types
//!
//! This module defines the snapshots that flow into the evaluation pipeline and
//! the events, alerts and reports that come out of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity attached to events and alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Integrity points deducted for one event of this severity
    pub fn penalty(self) -> u32 {
        match self {
            Severity::High => 10,
            Severity::Medium => 5,
            Severity::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of violation recorded in the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FocusLost,
    NoFace,
    MultipleFaces,
    PhoneDetected,
    NotesDetected,
    DeviceDetected,
}

impl EventType {
    /// Every event type, in report order
    pub const ALL: [EventType; 6] = [
        EventType::FocusLost,
        EventType::NoFace,
        EventType::MultipleFaces,
        EventType::PhoneDetected,
        EventType::NotesDetected,
        EventType::DeviceDetected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::FocusLost => "focus_lost",
            EventType::NoFace => "no_face",
            EventType::MultipleFaces => "multiple_faces",
            EventType::PhoneDetected => "phone_detected",
            EventType::NotesDetected => "notes_detected",
            EventType::DeviceDetected => "device_detected",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category an object label resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCategory {
    Phone,
    Notes,
    Device,
}

impl ObjectCategory {
    pub fn event_type(self) -> EventType {
        match self {
            ObjectCategory::Phone => EventType::PhoneDetected,
            ObjectCategory::Notes => EventType::NotesDetected,
            ObjectCategory::Device => EventType::DeviceDetected,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ObjectCategory::Phone => Severity::High,
            ObjectCategory::Notes | ObjectCategory::Device => Severity::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectCategory::Phone => "phone",
            ObjectCategory::Notes => "notes",
            ObjectCategory::Device => "device",
        }
    }
}

/// Per-tick output of the face/object classifier.
///
/// Produced by an external detector; the pipeline only reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSnapshot {
    /// Whether at least one face is visible
    pub face_detected: bool,
    /// Number of faces in frame
    pub face_count: u32,
    /// Attention score (0 - 100)
    pub focus_score: f64,
    /// Raw object labels recognized in this frame
    pub objects_detected: Vec<String>,
    /// Detector confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Looking-away flag derived by the detector from its rolling focus average
    pub is_looking_away: bool,
    /// Seconds the detector believes the candidate has been looking away.
    /// Informational only, the focus tracker keeps its own clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_loss_duration: Option<f64>,
}

impl DetectionSnapshot {
    /// A single face, attentive, nothing else in frame
    pub fn attentive() -> Self {
        Self {
            face_detected: true,
            face_count: 1,
            focus_score: 100.0,
            confidence: 1.0,
            ..Self::default()
        }
    }

    /// Whether the frame shows nobody
    pub fn face_absent(&self) -> bool {
        !self.face_detected || self.face_count == 0
    }
}

/// Per-window output of the audio analyser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSnapshot {
    pub is_speaking: bool,
    /// Normalized input level
    pub volume: f64,
    pub background_noise: bool,
    pub multiple_voices: bool,
}

/// A persisted, timestamped violation record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub severity: Severity,
    /// Seconds the underlying condition had lasted when the event fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Event {
    pub fn new(
        event_type: EventType,
        severity: Severity,
        description: impl Into<String>,
        duration: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp,
            description: description.into(),
            severity,
            duration,
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        })
    }
}

/// An ephemeral, acknowledgeable user-facing notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// Signal key; broader than [`EventType`] (includes audio-only signals)
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Presentation order for the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Event counts per type. Every type is always present, zero included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsByType {
    pub focus_lost: u32,
    pub no_face: u32,
    pub multiple_faces: u32,
    pub phone_detected: u32,
    pub notes_detected: u32,
    pub device_detected: u32,
}

impl EventsByType {
    pub fn from_events(events: &[Event]) -> Self {
        let mut counts = Self::default();
        for event in events {
            counts.record(event.event_type);
        }
        counts
    }

    pub fn record(&mut self, event_type: EventType) {
        *self.slot_mut(event_type) += 1;
    }

    pub fn get(&self, event_type: EventType) -> u32 {
        match event_type {
            EventType::FocusLost => self.focus_lost,
            EventType::NoFace => self.no_face,
            EventType::MultipleFaces => self.multiple_faces,
            EventType::PhoneDetected => self.phone_detected,
            EventType::NotesDetected => self.notes_detected,
            EventType::DeviceDetected => self.device_detected,
        }
    }

    pub fn total(&self) -> u32 {
        EventType::ALL.iter().map(|t| self.get(*t)).sum()
    }

    fn slot_mut(&mut self, event_type: EventType) -> &mut u32 {
        match event_type {
            EventType::FocusLost => &mut self.focus_lost,
            EventType::NoFace => &mut self.no_face,
            EventType::MultipleFaces => &mut self.multiple_faces,
            EventType::PhoneDetected => &mut self.phone_detected,
            EventType::NotesDetected => &mut self.notes_detected,
            EventType::DeviceDetected => &mut self.device_detected,
        }
    }
}

/// Summary report for a session, callable mid-session or after completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: String,
    pub candidate_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Whole minutes between start and end (or now, for a live session)
    pub duration: i64,
    pub integrity_score: u32,
    pub total_events: usize,
    pub events_by_type: EventsByType,
    pub events: Vec<Event>,
}
