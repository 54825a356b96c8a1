//! Session transcripts
//!
//! A transcript is a recorded sequence of ticks and lifecycle actions, one tagged
//! JSON record per line (NDJSON) or a JSON array. Replaying a transcript through
//! the processor reproduces the event log and report of the live session.

use crate::error::{MonitorError, ValidationError};
use crate::types::{AudioSnapshot, DetectionSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transcript record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptRecord {
    Start {
        timestamp: DateTime<Utc>,
        candidate_name: String,
    },
    Detection {
        timestamp: DateTime<Utc>,
        snapshot: DetectionSnapshot,
    },
    Audio {
        timestamp: DateTime<Utc>,
        audio: AudioSnapshot,
    },
    Pause {
        timestamp: DateTime<Utc>,
    },
    Resume {
        timestamp: DateTime<Utc>,
    },
    ClearLog {
        timestamp: DateTime<Utc>,
    },
    End {
        timestamp: DateTime<Utc>,
    },
}

impl TranscriptRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TranscriptRecord::Start { timestamp, .. }
            | TranscriptRecord::Detection { timestamp, .. }
            | TranscriptRecord::Audio { timestamp, .. }
            | TranscriptRecord::Pause { timestamp }
            | TranscriptRecord::Resume { timestamp }
            | TranscriptRecord::ClearLog { timestamp }
            | TranscriptRecord::End { timestamp } => *timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TranscriptRecord::Start { .. } => "start",
            TranscriptRecord::Detection { .. } => "detection",
            TranscriptRecord::Audio { .. } => "audio",
            TranscriptRecord::Pause { .. } => "pause",
            TranscriptRecord::Resume { .. } => "resume",
            TranscriptRecord::ClearLog { .. } => "clear_log",
            TranscriptRecord::End { .. } => "end",
        }
    }

    /// Check value ranges of the snapshot carried by this record
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TranscriptRecord::Detection { snapshot, .. } => {
                if !(0.0..=100.0).contains(&snapshot.focus_score) {
                    return Err(ValidationError::FocusScoreOutOfRange(snapshot.focus_score));
                }
                if !(0.0..=1.0).contains(&snapshot.confidence) {
                    return Err(ValidationError::ConfidenceOutOfRange(snapshot.confidence));
                }
                let count_says_present = snapshot.face_count > 0;
                if snapshot.face_detected != count_says_present {
                    return Err(ValidationError::InconsistentFaceCount {
                        face_detected: snapshot.face_detected,
                        face_count: snapshot.face_count,
                    });
                }
                Ok(())
            }
            TranscriptRecord::Audio { audio, .. } => {
                if !audio.volume.is_finite() || audio.volume < 0.0 {
                    return Err(ValidationError::InvalidVolume(audio.volume));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Result of record validation
#[derive(Debug)]
pub struct RecordValidation {
    pub index: usize,
    pub kind: &'static str,
    pub error: ValidationError,
}

/// Parsing and validation helpers for transcripts
pub struct TranscriptAdapter;

impl TranscriptAdapter {
    /// Parse a JSON array of records
    pub fn parse_array(json: &str) -> Result<Vec<TranscriptRecord>, MonitorError> {
        let records: Vec<TranscriptRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON, skipping blank lines
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<TranscriptRecord>, MonitorError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(MonitorError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Validate every record and the ordering between them
    pub fn validate_records(records: &[TranscriptRecord]) -> Vec<RecordValidation> {
        let mut failures = Vec::new();
        let mut previous: Option<DateTime<Utc>> = None;

        for (index, record) in records.iter().enumerate() {
            let timestamp = record.timestamp();
            let ordering = match previous {
                Some(prev) if timestamp < prev => Err(ValidationError::NonMonotonicTimestamp {
                    previous: prev.to_rfc3339(),
                    current: timestamp.to_rfc3339(),
                }),
                _ => Ok(()),
            };
            previous = Some(timestamp);

            if let Err(error) = record.validate().and(ordering) {
                failures.push(RecordValidation {
                    index,
                    kind: record.kind(),
                    error,
                });
            }
        }

        failures
    }
}
