//! Sustained-condition tracking
//!
//! A [`SignalTracker`] turns a per-tick boolean (looking away, no face) into a
//! single "sustained for longer than the threshold" transition per continuous
//! occurrence. The state machine is `Idle -> Active { since } -> Idle`; any tick
//! where the condition is false returns it to `Idle` and the timer restarts from
//! zero on the next occurrence. There is no grace period.
//!
//! The tracker reports eligibility; the classifier decides whether an event is
//! actually logged and calls [`SignalTracker::acknowledge`] when it is.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Tracker state for one continuous signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SignalState {
    Idle,
    Active {
        since: DateTime<Utc>,
        /// An event has been logged for this occurrence
        fired: bool,
    },
}

/// A condition that has held for longer than its threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SustainedCondition {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

/// Per-signal temporal state machine
#[derive(Debug, Clone)]
pub struct SignalTracker {
    name: &'static str,
    threshold_secs: f64,
    rearm: bool,
    state: SignalState,
}

impl SignalTracker {
    pub fn new(name: &'static str, threshold_secs: f64) -> Self {
        Self {
            name,
            threshold_secs,
            rearm: false,
            state: SignalState::Idle,
        }
    }

    /// Restart the timer after each acknowledged firing instead of latching
    pub fn with_rearm(mut self, rearm: bool) -> Self {
        self.rearm = rearm;
        self
    }

    /// Feed one tick. Returns `Some` while the condition has been held for
    /// strictly longer than the threshold and no event was logged for it yet.
    pub fn update(&mut self, condition: bool, now: DateTime<Utc>) -> Option<SustainedCondition> {
        if !condition {
            self.state = SignalState::Idle;
            return None;
        }

        match self.state {
            SignalState::Idle => {
                self.state = SignalState::Active {
                    since: now,
                    fired: false,
                };
                None
            }
            SignalState::Active { fired: true, .. } => None,
            SignalState::Active { since, fired: false } => {
                let elapsed_secs = elapsed_secs(since, now);
                if elapsed_secs > self.threshold_secs {
                    Some(SustainedCondition {
                        started_at: since,
                        elapsed_secs,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Mark the current occurrence as logged
    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        if let SignalState::Active { since, .. } = self.state {
            self.state = if self.rearm {
                SignalState::Active {
                    since: now,
                    fired: false,
                }
            } else {
                SignalState::Active { since, fired: true }
            };
        }
    }

    pub fn reset(&mut self) {
        self.state = SignalState::Idle;
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn threshold_secs(&self) -> f64 {
        self.threshold_secs
    }
}

fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - since).num_milliseconds() as f64 / 1000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_just_under_threshold_never_fires() {
        let mut tracker = SignalTracker::new("focus", 5.0);
        assert!(tracker.update(true, at_ms(0)).is_none());
        assert!(tracker.update(true, at_ms(4_999)).is_none());
        assert!(tracker.update(true, at_ms(5_000)).is_none());
    }

    #[test]
    fn test_just_over_threshold_fires() {
        let mut tracker = SignalTracker::new("focus", 5.0);
        tracker.update(true, at_ms(0));
        let sustained = tracker.update(true, at_ms(5_001)).unwrap();
        assert_eq!(sustained.started_at, t0());
        assert!((sustained.elapsed_secs - 5.001).abs() < 1e-9);
    }

    #[test]
    fn test_fires_once_per_occurrence_once_acknowledged() {
        let mut tracker = SignalTracker::new("no_face", 10.0);
        let mut fired = 0;
        for second in 0..=30 {
            let now = at_ms(second * 1000);
            if tracker.update(true, now).is_some() {
                fired += 1;
                tracker.acknowledge(now);
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_stays_eligible_until_acknowledged() {
        let mut tracker = SignalTracker::new("focus", 5.0);
        tracker.update(true, at_ms(0));
        assert!(tracker.update(true, at_ms(6_000)).is_some());
        assert!(tracker.update(true, at_ms(7_000)).is_some());
        tracker.acknowledge(at_ms(7_000));
        assert!(tracker.update(true, at_ms(8_000)).is_none());
    }

    #[test]
    fn test_clearing_restarts_timer() {
        let mut tracker = SignalTracker::new("focus", 5.0);
        tracker.update(true, at_ms(0));
        tracker.update(true, at_ms(4_000));
        // One clear tick breaks the occurrence
        assert!(tracker.update(false, at_ms(4_500)).is_none());
        assert_eq!(tracker.state(), SignalState::Idle);

        tracker.update(true, at_ms(5_000));
        assert!(tracker.update(true, at_ms(9_000)).is_none());
        assert!(tracker.update(true, at_ms(10_500)).is_some());
    }

    #[test]
    fn test_refires_after_condition_clears() {
        let mut tracker = SignalTracker::new("focus", 5.0);
        tracker.update(true, at_ms(0));
        tracker.update(true, at_ms(6_000)).unwrap();
        tracker.acknowledge(at_ms(6_000));

        tracker.update(false, at_ms(7_000));
        tracker.update(true, at_ms(8_000));
        assert!(tracker.update(true, at_ms(14_000)).is_some());
    }

    #[test]
    fn test_rearm_restarts_from_firing_time() {
        let mut tracker = SignalTracker::new("no_face", 10.0).with_rearm(true);
        tracker.update(true, at_ms(0));
        tracker.update(true, at_ms(11_000)).unwrap();
        tracker.acknowledge(at_ms(11_000));

        assert!(tracker.update(true, at_ms(20_000)).is_none());
        let again = tracker.update(true, at_ms(21_500)).unwrap();
        assert_eq!(again.started_at, at_ms(11_000));
    }

    #[test]
    fn test_clock_going_backwards_is_clamped() {
        let mut tracker = SignalTracker::new("focus", 5.0);
        tracker.update(true, at_ms(10_000));
        assert!(tracker.update(true, at_ms(0)).is_none());
    }
}
