//! Per-type cooldown table
//!
//! Tracks the last accepted firing per key. The event classifier and the alert
//! manager each own their own table, so logging an event never consumes an
//! alert's cooldown and vice versa.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CooldownTable<K> {
    window: Duration,
    last_fired: HashMap<K, DateTime<Utc>>,
}

impl<K: Eq + Hash> CooldownTable<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: HashMap::new(),
        }
    }

    /// Whether `key` fired less than one window before `now`
    pub fn is_cooling(&self, key: &K, now: DateTime<Utc>) -> bool {
        match self.last_fired.get(key) {
            // A window too large for chrono never expires
            Some(last) => match chrono::Duration::from_std(self.window) {
                Ok(window) => now - *last < window,
                Err(_) => true,
            },
            None => false,
        }
    }

    /// Accept a firing unless the key is cooling down. Accepted firings
    /// overwrite the previous timestamp.
    pub fn try_fire(&mut self, key: K, now: DateTime<Utc>) -> bool {
        if self.is_cooling(&key, now) {
            return false;
        }
        self.last_fired.insert(key, now);
        true
    }

    pub fn last_fired(&self, key: &K) -> Option<DateTime<Utc>> {
        self.last_fired.get(key).copied()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_suppresses_within_window() {
        let mut table = CooldownTable::new(Duration::from_millis(5000));
        assert!(table.try_fire("phone", at_ms(0)));
        assert!(!table.try_fire("phone", at_ms(1000)));
        assert!(!table.try_fire("phone", at_ms(4999)));
        assert!(table.try_fire("phone", at_ms(5000)));
    }

    #[test]
    fn test_suppressed_attempt_does_not_extend_window() {
        let mut table = CooldownTable::new(Duration::from_millis(5000));
        table.try_fire("phone", at_ms(0));
        table.try_fire("phone", at_ms(3000));
        assert_eq!(table.last_fired(&"phone"), Some(at_ms(0)));
        assert!(table.try_fire("phone", at_ms(6000)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut table = CooldownTable::new(Duration::from_millis(5000));
        assert!(table.try_fire("phone", at_ms(0)));
        assert!(table.try_fire("notes", at_ms(100)));
        assert!(table.is_cooling(&"phone", at_ms(200)));
        assert!(!table.is_cooling(&"device", at_ms(200)));
    }

    #[test]
    fn test_huge_window_does_not_wrap() {
        let mut table = CooldownTable::new(Duration::from_secs(u64::MAX));
        assert!(table.try_fire("phone", at_ms(0)));
        assert!(!table.try_fire("phone", at_ms(10 * 86_400_000)));

        let mut table = CooldownTable::new(Duration::from_millis(u64::MAX));
        assert!(table.try_fire("phone", at_ms(0)));
        assert!(table.is_cooling(&"phone", at_ms(86_400_000)));
    }

    #[test]
    fn test_zero_window_never_suppresses() {
        let mut table = CooldownTable::new(Duration::ZERO);
        assert!(table.try_fire(1u8, at_ms(0)));
        assert!(table.try_fire(1u8, at_ms(0)));
    }
}
