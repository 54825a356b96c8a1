//! Session aggregate
//!
//! A [`Session`] owns the append-only event log and keeps the integrity score in
//! step with it. Lifecycle is `active <-> paused -> completed`; completed is
//! terminal, and the only mutation allowed afterwards is an explicit log clear.

use crate::error::MonitorError;
use crate::scoring::{integrity_score, MAX_INTEGRITY_SCORE};
use crate::types::{Event, EventOrder, EventsByType, Report, SessionStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One monitored interview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    id: String,
    candidate_name: String,
    start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
    status: SessionStatus,
    integrity_score: u32,
    events: Vec<Event>,
}

impl Session {
    /// Start a session with a generated id
    pub fn start(candidate_name: &str, now: DateTime<Utc>) -> Result<Self, MonitorError> {
        Self::with_id(Uuid::new_v4().to_string(), candidate_name, now)
    }

    /// Start a session under an id assigned elsewhere (e.g. by a persistence backend)
    pub fn with_id(
        id: impl Into<String>,
        candidate_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, MonitorError> {
        let candidate_name = candidate_name.trim();
        if candidate_name.is_empty() {
            return Err(MonitorError::InvalidCandidateName(candidate_name.to_string()));
        }

        Ok(Self {
            id: id.into(),
            candidate_name: candidate_name.to_string(),
            start_time: now,
            end_time: None,
            status: SessionStatus::Active,
            integrity_score: MAX_INTEGRITY_SCORE,
            events: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn candidate_name(&self) -> &str {
        &self.candidate_name
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn integrity_score(&self) -> u32 {
        self.integrity_score
    }

    /// Events in insertion (chronological) order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_in_order(&self, order: EventOrder) -> Vec<Event> {
        match order {
            EventOrder::OldestFirst => self.events.clone(),
            EventOrder::NewestFirst => self.events.iter().rev().cloned().collect(),
        }
    }

    /// Append an event and recompute the score
    pub fn append_event(&mut self, event: Event) -> Result<(), MonitorError> {
        if self.status == SessionStatus::Completed {
            return Err(self.transition_error("append events"));
        }
        self.events.push(event);
        self.integrity_score = integrity_score(&self.events);
        Ok(())
    }

    /// Empty the log. Allowed in every status; the score returns to 100.
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.integrity_score = integrity_score(&self.events);
    }

    pub fn pause(&mut self) -> Result<(), MonitorError> {
        match self.status {
            SessionStatus::Active => {
                self.status = SessionStatus::Paused;
                Ok(())
            }
            _ => Err(self.transition_error("pause")),
        }
    }

    pub fn resume(&mut self) -> Result<(), MonitorError> {
        match self.status {
            SessionStatus::Paused => {
                self.status = SessionStatus::Active;
                Ok(())
            }
            _ => Err(self.transition_error("resume")),
        }
    }

    /// Complete the session. There is no way back to active.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        if self.status == SessionStatus::Completed {
            return Err(self.transition_error("end"));
        }
        self.status = SessionStatus::Completed;
        self.end_time = Some(now);
        Ok(())
    }

    /// Build the summary report. Read-only; a live session uses `now` as its end.
    pub fn report(&self, now: DateTime<Utc>) -> Report {
        self.report_with_order(now, EventOrder::OldestFirst)
    }

    pub fn report_with_order(&self, now: DateTime<Utc>, order: EventOrder) -> Report {
        let end = self.end_time.unwrap_or(now);
        let minutes = (end - self.start_time).num_milliseconds() as f64 / 60_000.0;

        Report {
            session_id: self.id.clone(),
            candidate_name: self.candidate_name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
            duration: minutes.round().max(0.0) as i64,
            integrity_score: self.integrity_score,
            total_events: self.events.len(),
            events_by_type: EventsByType::from_events(&self.events),
            events: self.events_in_order(order),
        }
    }

    fn transition_error(&self, action: &str) -> MonitorError {
        MonitorError::InvalidTransition {
            session_id: self.id.clone(),
            status: self.status.to_string(),
            action: action.to_string(),
        }
    }
}
