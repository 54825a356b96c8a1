//! Integrity scoring
//!
//! The score is derived from the event log alone and recomputed in full on every
//! change: `max(0, 100 - sum(penalty(severity)))`.

use crate::types::Event;

/// Score of a session with no events
pub const MAX_INTEGRITY_SCORE: u32 = 100;

/// Compute the integrity score for an event log
pub fn integrity_score(events: &[Event]) -> u32 {
    let penalty: u32 = events.iter().map(|e| e.severity.penalty()).sum();
    MAX_INTEGRITY_SCORE.saturating_sub(penalty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, Severity};
    use chrono::Utc;

    fn events(severities: &[Severity]) -> Vec<Event> {
        severities
            .iter()
            .map(|s| Event::new(EventType::FocusLost, *s, "test", None, Utc::now()))
            .collect()
    }

    #[test]
    fn test_empty_log_scores_full() {
        assert_eq!(integrity_score(&[]), 100);
    }

    #[test]
    fn test_penalties_per_severity() {
        assert_eq!(integrity_score(&events(&[Severity::High])), 90);
        assert_eq!(integrity_score(&events(&[Severity::Medium])), 95);
        assert_eq!(integrity_score(&events(&[Severity::Low])), 98);
        assert_eq!(
            integrity_score(&events(&[Severity::High, Severity::Medium, Severity::Low])),
            83
        );
    }

    #[test]
    fn test_floors_at_zero() {
        assert_eq!(integrity_score(&events(&[Severity::High; 11])), 0);
        assert_eq!(integrity_score(&events(&[Severity::High; 10])), 0);
    }

    #[test]
    fn test_order_independent() {
        let mut log = events(&[Severity::Low, Severity::High, Severity::Medium, Severity::Low]);
        let forward = integrity_score(&log);
        log.reverse();
        assert_eq!(integrity_score(&log), forward);
        assert_eq!(forward, 100 - 10 - 5 - 2 - 2);
    }
}
