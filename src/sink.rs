//! Persistence sink
//!
//! The sink is where sessions and events are stored outside the process. The
//! local event log stays authoritative: sink failures are reported, never rolled
//! back into local state.

use crate::error::SinkError;
use crate::session::Session;
use crate::types::{Event, Report};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Storage backend for sessions, events and reports.
///
/// Sessions are addressed by their application-level id.
pub trait PersistenceSink: Send + Sync {
    /// Create an active session with a score of 100 and no events
    fn create_session(&self, candidate_name: &str) -> Result<Session, SinkError>;

    /// Store an event under a session
    fn add_event(&self, session_id: &str, event: &Event) -> Result<Event, SinkError>;

    /// Mark a session completed
    fn end_session(&self, session_id: &str) -> Result<Session, SinkError>;

    fn get_report(&self, session_id: &str) -> Result<Report, SinkError>;

    fn get_session(&self, session_id: &str) -> Result<Session, SinkError>;

    /// All sessions, most recently started first
    fn list_sessions(&self) -> Result<Vec<Session>, SinkError>;
}

/// Thread-safe in-memory sink
#[derive(Debug, Default)]
pub struct MemorySink {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Session>>, SinkError> {
        self.sessions
            .lock()
            .map_err(|_| SinkError::Unavailable("session store lock poisoned".to_string()))
    }
}

impl PersistenceSink for MemorySink {
    fn create_session(&self, candidate_name: &str) -> Result<Session, SinkError> {
        let session = Session::start(candidate_name, Utc::now())
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        self.lock()?
            .insert(session.id().to_string(), session.clone());
        Ok(session)
    }

    fn add_event(&self, session_id: &str, event: &Event) -> Result<Event, SinkError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SinkError::SessionNotFound(session_id.to_string()))?;
        session
            .append_event(event.clone())
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        Ok(event.clone())
    }

    fn end_session(&self, session_id: &str) -> Result<Session, SinkError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SinkError::SessionNotFound(session_id.to_string()))?;
        session
            .end(Utc::now())
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        Ok(session.clone())
    }

    fn get_report(&self, session_id: &str) -> Result<Report, SinkError> {
        Ok(self.get_session(session_id)?.report(Utc::now()))
    }

    fn get_session(&self, session_id: &str) -> Result<Session, SinkError> {
        self.lock()?
            .get(session_id)
            .cloned()
            .ok_or_else(|| SinkError::SessionNotFound(session_id.to_string()))
    }

    fn list_sessions(&self) -> Result<Vec<Session>, SinkError> {
        let mut sessions: Vec<Session> = self.lock()?.values().cloned().collect();
        sessions.sort_by(|a, b| b.start_time().cmp(&a.start_time()));
        Ok(sessions)
    }
}
