//! Event classification and debouncing
//!
//! Maps one detection snapshot to zero or more events. Sustained conditions come
//! from the signal trackers, one-shot conditions (extra faces, objects) straight
//! from the snapshot. Every candidate passes through a per-type cooldown table
//! before it is logged.

use crate::config::{normalize_label, MonitorConfig, ObjectVocabulary};
use crate::cooldown::CooldownTable;
use crate::error::ConfigError;
use crate::tracker::{SignalState, SignalTracker};
use crate::types::{DetectionSnapshot, Event, EventType, Severity};
use chrono::{DateTime, Utc};
use log::{debug, info};

/// Stateful per-session classifier
#[derive(Debug, Clone)]
pub struct EventClassifier {
    focus: SignalTracker,
    face_absence: SignalTracker,
    cooldowns: CooldownTable<EventType>,
    vocabulary: ObjectVocabulary,
}

impl EventClassifier {
    pub fn new(config: &MonitorConfig) -> Result<Self, ConfigError> {
        let vocabulary = config.validate()?;
        Ok(Self {
            focus: SignalTracker::new("focus", config.focus_loss_threshold_secs)
                .with_rearm(config.repeat_sustained_events),
            face_absence: SignalTracker::new("face_absence", config.no_face_threshold_secs)
                .with_rearm(config.repeat_sustained_events),
            cooldowns: CooldownTable::new(config.event_cooldown()),
            vocabulary,
        })
    }

    /// Evaluate one tick. All rules run; several events may come out of one tick.
    pub fn classify(&mut self, snapshot: &DetectionSnapshot, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();

        if let Some(sustained) = self.focus.update(snapshot.is_looking_away, now) {
            let seconds = sustained.elapsed_secs;
            let logged = self.emit(
                EventType::FocusLost,
                Severity::Medium,
                format!(
                    "Candidate looked away from the screen for {} seconds",
                    seconds.round()
                ),
                Some(seconds),
                now,
                &mut events,
            );
            if logged {
                self.focus.acknowledge(now);
            }
        }

        if let Some(sustained) = self.face_absence.update(snapshot.face_absent(), now) {
            let seconds = sustained.elapsed_secs;
            let logged = self.emit(
                EventType::NoFace,
                Severity::High,
                format!("No face detected for {} seconds", seconds.round()),
                Some(seconds),
                now,
                &mut events,
            );
            if logged {
                self.face_absence.acknowledge(now);
            }
        }

        if snapshot.face_count > 1 {
            self.emit(
                EventType::MultipleFaces,
                Severity::High,
                format!("Multiple faces detected ({} in frame)", snapshot.face_count),
                None,
                now,
                &mut events,
            );
        }

        let mut seen: Vec<String> = Vec::new();
        for raw_label in &snapshot.objects_detected {
            let normalized = normalize_label(raw_label);
            if normalized.is_empty() || seen.contains(&normalized) {
                continue;
            }
            seen.push(normalized);

            let Some(category) = self.vocabulary.classify(raw_label) else {
                continue;
            };
            let label = raw_label.trim();
            let event_type = category.event_type();
            let description = match event_type {
                EventType::PhoneDetected => format!("Phone detected in frame ({label})"),
                EventType::NotesDetected => {
                    format!("Notes or reading material detected ({label})")
                }
                _ => format!("Unauthorized device detected: {label}"),
            };
            self.emit(
                event_type,
                category.severity(),
                description,
                None,
                now,
                &mut events,
            );
        }

        events
    }

    pub fn focus_state(&self) -> SignalState {
        self.focus.state()
    }

    pub fn face_absence_state(&self) -> SignalState {
        self.face_absence.state()
    }

    /// Forget any condition in progress. Called on pause and resume: time not
    /// observed never counts toward a sustained condition.
    pub fn reset_trackers(&mut self) {
        self.focus.reset();
        self.face_absence.reset();
    }

    fn emit(
        &mut self,
        event_type: EventType,
        severity: Severity,
        description: String,
        duration: Option<f64>,
        now: DateTime<Utc>,
        out: &mut Vec<Event>,
    ) -> bool {
        if !self.cooldowns.try_fire(event_type, now) {
            debug!("{event_type} suppressed by cooldown");
            return false;
        }
        info!("{event_type} ({severity}): {description}");
        out.push(Event::new(event_type, severity, description, duration, now));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn classifier() -> EventClassifier {
        EventClassifier::new(&MonitorConfig::default()).unwrap()
    }

    fn looking_away() -> DetectionSnapshot {
        DetectionSnapshot {
            is_looking_away: true,
            focus_score: 20.0,
            ..DetectionSnapshot::attentive()
        }
    }

    fn no_face() -> DetectionSnapshot {
        DetectionSnapshot::default()
    }

    fn with_objects(labels: &[&str]) -> DetectionSnapshot {
        DetectionSnapshot {
            objects_detected: labels.iter().map(|s| s.to_string()).collect(),
            ..DetectionSnapshot::attentive()
        }
    }

    fn run(classifier: &mut EventClassifier, snapshot: &DetectionSnapshot, secs: i64) -> Vec<Event> {
        (0..=secs)
            .flat_map(|s| classifier.classify(snapshot, at(s)))
            .collect()
    }

    #[test]
    fn test_focus_lost_after_six_seconds() {
        let mut classifier = classifier();
        let events = run(&mut classifier, &looking_away(), 6);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, EventType::FocusLost);
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.duration, Some(6.0));
        assert!(event.description.contains("6 seconds"));
    }

    #[test]
    fn test_focus_within_threshold_is_quiet() {
        let mut classifier = classifier();
        assert!(run(&mut classifier, &looking_away(), 5).is_empty());
    }

    #[test]
    fn test_no_face_fires_once_per_occurrence() {
        let mut classifier = classifier();
        let events = run(&mut classifier, &no_face(), 30);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::NoFace);
        assert_eq!(events[0].severity, Severity::High);
        assert_eq!(events[0].duration, Some(11.0));
    }

    #[test]
    fn test_no_face_refires_after_face_returns() {
        let mut classifier = classifier();
        let mut events = run(&mut classifier, &no_face(), 12);
        events.extend(classifier.classify(&DetectionSnapshot::attentive(), at(13)));
        for s in 14..=40 {
            events.extend(classifier.classify(&no_face(), at(s)));
        }
        let no_face_count = events
            .iter()
            .filter(|e| e.event_type == EventType::NoFace)
            .count();
        assert_eq!(no_face_count, 2);
    }

    #[test]
    fn test_repeat_sustained_events_rearms() {
        let config = MonitorConfig {
            repeat_sustained_events: true,
            ..MonitorConfig::default()
        };
        let mut classifier = EventClassifier::new(&config).unwrap();
        let events = run(&mut classifier, &no_face(), 30);
        // Fires at 11s, re-arms, fires again at 22s
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_multiple_faces_debounced_by_cooldown() {
        let mut classifier = classifier();
        let crowd = DetectionSnapshot {
            face_count: 2,
            ..DetectionSnapshot::attentive()
        };

        assert_eq!(classifier.classify(&crowd, at(0)).len(), 1);
        assert!(classifier.classify(&crowd, at(2)).is_empty());
        assert!(classifier.classify(&crowd, at(4)).is_empty());
        assert_eq!(classifier.classify(&crowd, at(6)).len(), 1);
    }

    #[test]
    fn test_phone_three_ticks_one_event() {
        let mut classifier = classifier();
        let events = run(&mut classifier, &with_objects(&["cell phone"]), 2);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::PhoneDetected);
        assert_eq!(events[0].severity, Severity::High);
        assert!(events[0].description.contains("cell phone"));
    }

    #[test]
    fn test_object_categories() {
        let mut classifier = classifier();
        let events = classifier.classify(&with_objects(&["book", "Laptop", "person"]), at(0));

        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::NotesDetected, EventType::DeviceDetected]);
        assert_eq!(events[0].severity, Severity::Medium);
        assert_eq!(events[1].severity, Severity::Medium);
        assert!(events[1].description.contains("Laptop"));
    }

    #[test]
    fn test_duplicate_labels_in_one_tick() {
        let mut classifier = classifier();
        let events = classifier.classify(&with_objects(&["phone", "Phone", "cell phone"]), at(0));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_rules_fire_together() {
        let mut classifier = classifier();
        let snapshot = DetectionSnapshot {
            face_count: 3,
            objects_detected: vec!["phone".to_string(), "notes".to_string()],
            ..DetectionSnapshot::attentive()
        };
        let events = classifier.classify(&snapshot, at(0));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_cooldown_suppressed_sustained_condition_retries() {
        let config = MonitorConfig {
            event_cooldown_ms: 20_000,
            ..MonitorConfig::default()
        };
        let mut classifier = EventClassifier::new(&config).unwrap();

        // First occurrence logs at 6s
        assert_eq!(run(&mut classifier, &looking_away(), 6).len(), 1);
        classifier.classify(&DetectionSnapshot::attentive(), at(7));

        // Second occurrence becomes eligible at 14s but is cooling until 26s
        let mut later = Vec::new();
        for s in 8..=30 {
            later.extend(classifier.classify(&looking_away(), at(s)));
        }
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].timestamp, at(26));
    }

    #[test]
    fn test_tracker_state_exposed() {
        let mut classifier = classifier();
        assert_eq!(classifier.focus_state(), SignalState::Idle);
        classifier.classify(&looking_away(), at(0));
        assert!(matches!(
            classifier.focus_state(),
            SignalState::Active { fired: false, .. }
        ));
    }
}
