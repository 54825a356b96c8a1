//! User-facing alerts
//!
//! Alerts are ephemeral notifications with their own cooldown clock, separate
//! from the event log. The alert list is bounded; when full, the oldest alert is
//! dropped. High-severity alerts also play an audible cue.

use crate::config::MonitorConfig;
use crate::cooldown::CooldownTable;
use crate::types::{Alert, AudioSnapshot, Severity};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

/// Alert key raised when the backend rejects a write
pub const PERSISTENCE_ERROR: &str = "persistence_error";

/// Side effect played for accepted high-severity alerts
pub trait AlertCue: Send + Sync {
    fn play(&self, alert: &Alert);
}

/// Plays nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentCue;

impl AlertCue for SilentCue {
    fn play(&self, _alert: &Alert) {}
}

/// Rings the terminal bell on stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct BellCue;

impl AlertCue for BellCue {
    fn play(&self, _alert: &Alert) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Audio-only signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSignal {
    MultipleVoices,
    Speech,
    BackgroundNoise,
}

impl AudioSignal {
    /// Signals present in one audio window, most severe first
    pub fn from_snapshot(audio: &AudioSnapshot) -> Vec<AudioSignal> {
        let mut signals = Vec::new();
        if audio.multiple_voices {
            signals.push(AudioSignal::MultipleVoices);
        }
        if audio.is_speaking {
            signals.push(AudioSignal::Speech);
        }
        if audio.background_noise {
            signals.push(AudioSignal::BackgroundNoise);
        }
        signals
    }

    pub fn key(self) -> &'static str {
        match self {
            AudioSignal::MultipleVoices => "multiple_voices",
            AudioSignal::Speech => "speech",
            AudioSignal::BackgroundNoise => "background_noise",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            AudioSignal::MultipleVoices => Severity::High,
            AudioSignal::Speech => Severity::Medium,
            AudioSignal::BackgroundNoise => Severity::Low,
        }
    }

    pub fn message(self, volume: f64) -> String {
        match self {
            AudioSignal::MultipleVoices => "Multiple voices detected".to_string(),
            AudioSignal::Speech => format!("Speech detected (volume {volume:.0})"),
            AudioSignal::BackgroundNoise => format!("Background noise detected (volume {volume:.0})"),
        }
    }
}

/// Debounced alert list
pub struct AlertManager {
    cooldowns: CooldownTable<String>,
    alerts: VecDeque<Alert>,
    capacity: usize,
    cue: Arc<dyn AlertCue>,
}

impl AlertManager {
    pub fn new(config: &MonitorConfig) -> Self {
        let capacity = config.alert_capacity.max(1);
        Self {
            cooldowns: CooldownTable::new(config.alert_cooldown()),
            alerts: VecDeque::with_capacity(capacity),
            capacity,
            cue: Arc::new(SilentCue),
        }
    }

    pub fn with_cue(mut self, cue: Arc<dyn AlertCue>) -> Self {
        self.cue = cue;
        self
    }

    /// Raise an alert unless its type fired within the cooldown window
    pub fn raise(
        &mut self,
        alert_type: &str,
        message: impl Into<String>,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if !self.cooldowns.try_fire(alert_type.to_string(), now) {
            debug!("alert {alert_type} suppressed by cooldown");
            return None;
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            alert_type: alert_type.to_string(),
            message: message.into(),
            severity,
            timestamp: now,
            acknowledged: false,
        };

        self.alerts.push_back(alert.clone());
        while self.alerts.len() > self.capacity {
            self.alerts.pop_front();
        }

        if severity == Severity::High {
            self.cue.play(&alert);
        }

        Some(alert)
    }

    /// Mark one alert as acknowledged. Returns false for unknown ids.
    pub fn acknowledge(&mut self, alert_id: &str) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn acknowledge_all(&mut self) -> usize {
        let mut count = 0;
        for alert in self.alerts.iter_mut().filter(|a| !a.acknowledged) {
            alert.acknowledged = true;
            count += 1;
        }
        count
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    /// Retained alerts, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.acknowledged).count()
    }
}
