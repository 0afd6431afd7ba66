//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Eye aspect ratio below which the eyes count as closed
    pub ear_threshold: f32,

    /// Warnings fired before entering safe mode
    pub warnings_to_safe_mode: u32,

    /// Eyes closed threshold before the first warning (milliseconds)
    pub eyes_closed_threshold_ms: u64,

    /// Time a warning stays active before returning to watch (milliseconds)
    pub warning_cooldown_ms: u64,

    /// Reserved: safe mode has no exit transition, this value is not read
    pub safe_mode_duration_ms: u64,

    /// Face detection confidence threshold
    pub face_confidence: f32,

    /// Side of the square input expected by the landmark model
    pub landmark_input_size: u32,

    /// Model paths
    pub face_model_path: Option<String>,
    pub landmark_model_path: Option<String>,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.3,
            warnings_to_safe_mode: 3,
            eyes_closed_threshold_ms: 2000,
            warning_cooldown_ms: 2000,
            safe_mode_duration_ms: 5000,
            face_confidence: 0.7,
            landmark_input_size: 112,
            face_model_path: None,
            landmark_model_path: None,
        }
    }
}

impl DmsConfig {
    /// Create strict config (earlier warnings, fewer before safe mode)
    pub fn strict() -> Self {
        Self {
            eyes_closed_threshold_ms: 1000,
            warnings_to_safe_mode: 2,
            ..Default::default()
        }
    }

    /// Create lenient config (longer closures tolerated)
    pub fn lenient() -> Self {
        Self {
            eyes_closed_threshold_ms: 3000,
            warnings_to_safe_mode: 5,
            ..Default::default()
        }
    }

    /// Reject values the state machine cannot work with
    pub fn validate(&self) -> Result<(), DmsError> {
        if !(self.ear_threshold > 0.0 && self.ear_threshold.is_finite()) {
            return Err(DmsError::Config(format!(
                "ear_threshold must be positive, got {}",
                self.ear_threshold
            )));
        }
        if self.warnings_to_safe_mode == 0 {
            return Err(DmsError::Config(
                "warnings_to_safe_mode must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.face_confidence) {
            return Err(DmsError::Config(format!(
                "face_confidence must be within 0..=1, got {}",
                self.face_confidence
            )));
        }
        if self.landmark_input_size == 0 {
            return Err(DmsError::Config("landmark_input_size must be non-zero".into()));
        }
        Ok(())
    }
}
