//! Evaluation pipeline orchestration
//!
//! [`MonitorProcessor`] wires the stages together for one session:
//! detection snapshot → signal trackers → classifier/cooldown → event log →
//! integrity score, with alerts raised alongside on their own cooldown clock.
//! It is synchronous; the async [`crate::monitor::Monitor`] drives it on a timer.

use crate::alerts::{AlertCue, AlertManager, AudioSignal};
use crate::classifier::EventClassifier;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, ValidationError};
use crate::session::Session;
use crate::transcript::{TranscriptAdapter, TranscriptRecord};
use crate::types::{
    Alert, AudioSnapshot, DetectionSnapshot, Event, EventOrder, Report, Severity, SessionStatus,
};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use std::sync::Arc;

/// What one tick produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickOutcome {
    pub events: Vec<Event>,
    pub alerts: Vec<Alert>,
}

impl TickOutcome {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.alerts.is_empty()
    }
}

/// Replay a transcript (NDJSON) and return the final report (stateless, one-shot).
///
/// The first record must be `start`. The timestamp of the last record stands in
/// for "now" if the transcript never ends the session.
pub fn replay_to_report(
    transcript: &str,
    config: &MonitorConfig,
) -> Result<Report, MonitorError> {
    let records = TranscriptAdapter::parse_ndjson(transcript)?;
    replay_records(&records, config)
}

/// Replay already-parsed records
pub fn replay_records(
    records: &[TranscriptRecord],
    config: &MonitorConfig,
) -> Result<Report, MonitorError> {
    let (first, rest) = records
        .split_first()
        .ok_or_else(|| MonitorError::ParseError("Transcript is empty".to_string()))?;

    let mut processor = match first {
        TranscriptRecord::Start {
            timestamp,
            candidate_name,
        } => MonitorProcessor::start(candidate_name, config, *timestamp)?,
        other => {
            return Err(MonitorError::ParseError(format!(
                "Transcript must begin with a start record, found {}",
                other.kind()
            )))
        }
    };

    let mut now = first.timestamp();
    for record in rest {
        record.validate()?;
        let timestamp = record.timestamp();
        if timestamp < now {
            return Err(ValidationError::NonMonotonicTimestamp {
                previous: now.to_rfc3339(),
                current: timestamp.to_rfc3339(),
            }
            .into());
        }
        processor.apply_record(record)?;
        now = timestamp;
    }

    Ok(processor.report(now))
}

/// Stateful processor for one monitored session
pub struct MonitorProcessor {
    session: Session,
    classifier: EventClassifier,
    alerts: AlertManager,
}

impl MonitorProcessor {
    /// Validate the candidate and config, then start a fresh session
    pub fn start(
        candidate_name: &str,
        config: &MonitorConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, MonitorError> {
        let session = Session::start(candidate_name, now)?;
        Self::for_session(session, config)
    }

    /// Wrap a session created elsewhere (e.g. returned by a persistence sink)
    pub fn for_session(session: Session, config: &MonitorConfig) -> Result<Self, MonitorError> {
        let classifier = EventClassifier::new(config)?;
        info!(
            "session {} started for {}",
            session.id(),
            session.candidate_name()
        );
        Ok(Self {
            session,
            classifier,
            alerts: AlertManager::new(config),
        })
    }

    pub fn with_cue(mut self, cue: Arc<dyn AlertCue>) -> Self {
        self.alerts = self.alerts.with_cue(cue);
        self
    }

    /// Process one video tick. A no-op unless the session is active.
    pub fn process_detection(
        &mut self,
        snapshot: &DetectionSnapshot,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        if !self.session.is_active() {
            debug!(
                "ignoring detection tick for {} session {}",
                self.session.status(),
                self.session.id()
            );
            return TickOutcome::default();
        }

        let mut outcome = TickOutcome::default();
        for event in self.classifier.classify(snapshot, now) {
            if let Err(e) = self.session.append_event(event.clone()) {
                error!("failed to append {}: {e}", event.event_type);
                continue;
            }
            if let Some(alert) = self.alerts.raise(
                event.event_type.as_str(),
                event.description.clone(),
                event.severity,
                now,
            ) {
                outcome.alerts.push(alert);
            }
            outcome.events.push(event);
        }
        outcome
    }

    /// Process one audio window. Audio raises alerts only, never events.
    pub fn process_audio(&mut self, audio: &AudioSnapshot, now: DateTime<Utc>) -> Vec<Alert> {
        if !self.session.is_active() {
            return Vec::new();
        }
        AudioSignal::from_snapshot(audio)
            .into_iter()
            .filter_map(|signal| {
                self.alerts
                    .raise(signal.key(), signal.message(audio.volume), signal.severity(), now)
            })
            .collect()
    }

    /// Apply a transcript record (anything but `start`)
    pub fn apply_record(&mut self, record: &TranscriptRecord) -> Result<TickOutcome, MonitorError> {
        let now = record.timestamp();
        match record {
            TranscriptRecord::Start { .. } => Err(MonitorError::InvalidTransition {
                session_id: self.session.id().to_string(),
                status: self.session.status().to_string(),
                action: "start again".to_string(),
            }),
            TranscriptRecord::Detection { snapshot, .. } => {
                Ok(self.process_detection(snapshot, now))
            }
            TranscriptRecord::Audio { audio, .. } => Ok(TickOutcome {
                events: Vec::new(),
                alerts: self.process_audio(audio, now),
            }),
            TranscriptRecord::Pause { .. } => {
                self.pause()?;
                Ok(TickOutcome::default())
            }
            TranscriptRecord::Resume { .. } => {
                self.resume()?;
                Ok(TickOutcome::default())
            }
            TranscriptRecord::ClearLog { .. } => {
                self.clear_log();
                Ok(TickOutcome::default())
            }
            TranscriptRecord::End { .. } => {
                self.end(now)?;
                Ok(TickOutcome::default())
            }
        }
    }

    /// Raise an alert outside the detection/audio paths
    pub fn raise_alert(
        &mut self,
        alert_type: &str,
        message: impl Into<String>,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        self.alerts.raise(alert_type, message, severity, now)
    }

    pub fn acknowledge_alert(&mut self, alert_id: &str) -> bool {
        self.alerts.acknowledge(alert_id)
    }

    pub fn acknowledge_all_alerts(&mut self) -> usize {
        self.alerts.acknowledge_all()
    }

    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.alerts()
    }

    /// Empty the event log; the score returns to 100 and status is unchanged
    pub fn clear_log(&mut self) {
        info!(
            "clearing {} events from session {}",
            self.session.events().len(),
            self.session.id()
        );
        self.session.clear_events();
    }

    pub fn pause(&mut self) -> Result<(), MonitorError> {
        self.session.pause()?;
        self.classifier.reset_trackers();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), MonitorError> {
        self.session.resume()?;
        self.classifier.reset_trackers();
        Ok(())
    }

    pub fn end(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        self.session.end(now)?;
        info!(
            "session {} completed with integrity score {}",
            self.session.id(),
            self.session.integrity_score()
        );
        Ok(())
    }

    pub fn report(&self, now: DateTime<Utc>) -> Report {
        self.session.report(now)
    }

    pub fn report_with_order(&self, now: DateTime<Utc>, order: EventOrder) -> Report {
        self.session.report_with_order(now, order)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn integrity_score(&self) -> u32 {
        self.session.integrity_score()
    }
}
