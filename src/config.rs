//! Monitor configuration
//!
//! Thresholds, cooldown windows and loop periods are tunable. Object vocabularies
//! are checked when the configuration is loaded and compiled into a static
//! label -> category map, so classification never does open-ended string matching.

use crate::error::{ConfigError, MonitorError};
use crate::types::ObjectCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Seconds of continuous looking-away before a focus event
pub const DEFAULT_FOCUS_LOSS_THRESHOLD_SECS: f64 = 5.0;

/// Seconds of continuous face absence before a no-face event
pub const DEFAULT_NO_FACE_THRESHOLD_SECS: f64 = 10.0;

/// Minimum gap between two logged events of the same type
pub const DEFAULT_EVENT_COOLDOWN_MS: u64 = 5000;

/// Minimum gap between two alerts of the same type
pub const DEFAULT_ALERT_COOLDOWN_MS: u64 = 5000;

/// Video sampling period
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 1000;

/// Audio analysis period (roughly one display frame)
pub const DEFAULT_AUDIO_INTERVAL_MS: u64 = 50;

/// Detection calls slower than this are dropped
pub const DEFAULT_DETECTION_TIMEOUT_MS: u64 = 5000;

/// Upper bound for either cooldown window (one day)
pub const MAX_COOLDOWN_MS: u64 = 86_400_000;

/// Number of alerts retained, oldest dropped first
pub const DEFAULT_ALERT_CAPACITY: usize = 50;

/// Object labels per category, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectLabels {
    pub phone: Vec<String>,
    pub notes: Vec<String>,
    pub device: Vec<String>,
}

impl Default for ObjectLabels {
    fn default() -> Self {
        fn labels(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            phone: labels(&["phone", "cell phone", "mobile phone", "smartphone"]),
            notes: labels(&["book", "paper", "notes", "notebook"]),
            device: labels(&[
                "laptop",
                "tablet",
                "keyboard",
                "mouse",
                "remote",
                "tv",
                "monitor",
                "headphones",
                "smartwatch",
            ]),
        }
    }
}

/// Configuration for a monitored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub focus_loss_threshold_secs: f64,
    pub no_face_threshold_secs: f64,
    pub event_cooldown_ms: u64,
    pub alert_cooldown_ms: u64,
    pub sampling_interval_ms: u64,
    pub audio_interval_ms: u64,
    pub detection_timeout_ms: u64,
    pub alert_capacity: usize,
    /// Re-arm a sustained condition after it fires, so a very long occurrence
    /// produces one event per threshold period instead of one in total
    pub repeat_sustained_events: bool,
    pub object_labels: ObjectLabels,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            focus_loss_threshold_secs: DEFAULT_FOCUS_LOSS_THRESHOLD_SECS,
            no_face_threshold_secs: DEFAULT_NO_FACE_THRESHOLD_SECS,
            event_cooldown_ms: DEFAULT_EVENT_COOLDOWN_MS,
            alert_cooldown_ms: DEFAULT_ALERT_COOLDOWN_MS,
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            audio_interval_ms: DEFAULT_AUDIO_INTERVAL_MS,
            detection_timeout_ms: DEFAULT_DETECTION_TIMEOUT_MS,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            repeat_sustained_events: false,
            object_labels: ObjectLabels::default(),
        }
    }
}

impl MonitorConfig {
    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, MonitorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every value and compile the object vocabulary
    pub fn validate(&self) -> Result<ObjectVocabulary, ConfigError> {
        check_threshold("focus_loss_threshold_secs", self.focus_loss_threshold_secs)?;
        check_threshold("no_face_threshold_secs", self.no_face_threshold_secs)?;
        check_cooldown("event_cooldown_ms", self.event_cooldown_ms)?;
        check_cooldown("alert_cooldown_ms", self.alert_cooldown_ms)?;
        if self.sampling_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("sampling_interval_ms"));
        }
        if self.audio_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("audio_interval_ms"));
        }
        if self.detection_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("detection_timeout_ms"));
        }
        if self.alert_capacity == 0 {
            return Err(ConfigError::ZeroValue("alert_capacity"));
        }
        ObjectVocabulary::from_labels(&self.object_labels)
    }

    pub fn event_cooldown(&self) -> Duration {
        Duration::from_millis(self.event_cooldown_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.alert_cooldown_ms)
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn audio_interval(&self) -> Duration {
        Duration::from_millis(self.audio_interval_ms)
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }
}

fn check_cooldown(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value > MAX_COOLDOWN_MS {
        return Err(ConfigError::TooLarge {
            field,
            value,
            max: MAX_COOLDOWN_MS,
        });
    }
    Ok(())
}

fn check_threshold(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { field, value })
    }
}

/// Normalize a detector label: trim, lowercase, and collapse runs of
/// whitespace, `_` and `-` into single spaces
pub fn normalize_label(label: &str) -> String {
    label
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compiled normalized label -> category map
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVocabulary {
    labels: HashMap<String, ObjectCategory>,
}

impl Default for ObjectVocabulary {
    fn default() -> Self {
        // The built-in vocabulary has no empty or duplicate labels.
        Self::from_labels(&ObjectLabels::default()).unwrap_or_else(|_| Self {
            labels: HashMap::new(),
        })
    }
}

impl ObjectVocabulary {
    pub fn from_labels(labels: &ObjectLabels) -> Result<Self, ConfigError> {
        let mut map: HashMap<String, ObjectCategory> = HashMap::new();
        let groups = [
            (ObjectCategory::Phone, &labels.phone),
            (ObjectCategory::Notes, &labels.notes),
            (ObjectCategory::Device, &labels.device),
        ];

        for (category, raw_labels) in groups {
            for raw in raw_labels {
                let label = normalize_label(raw);
                if label.is_empty() {
                    return Err(ConfigError::EmptyLabel {
                        category: category.as_str().to_string(),
                    });
                }
                if let Some(existing) = map.get(&label) {
                    // Repeating a label inside one category is harmless
                    if *existing != category {
                        return Err(ConfigError::DuplicateLabel {
                            label,
                            first: existing.as_str().to_string(),
                            second: category.as_str().to_string(),
                        });
                    }
                    continue;
                }
                map.insert(label, category);
            }
        }

        Ok(Self { labels: map })
    }

    /// Resolve a raw detector label. Unknown labels yield `None`.
    pub fn classify(&self, raw_label: &str) -> Option<ObjectCategory> {
        self.labels.get(&normalize_label(raw_label)).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
