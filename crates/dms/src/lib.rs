//! Driver Monitoring System (DMS)
//!
//! Drowsiness detection from facial landmarks:
//! - Eye aspect ratio from the 68-point landmark layout
//! - Eye-closure classification against a tunable threshold
//! - Debounced state machine with warning escalation and safe mode
//! - State-change notifications for alerting and display

pub mod analysis;
pub mod config;
pub mod detector;
pub mod geometry;
pub mod notify;
pub mod state;

pub use analysis::FrameAnalysis;
pub use config::DmsConfig;
pub use detector::{
    detect_face_and_landmarks, primary_face, Detection, FaceDetector, FaceRegion,
    LandmarkFitter, OnnxFaceDetector, OnnxLandmarkFitter,
};
pub use geometry::{
    distance, ear_indicates_closed, eye_aspect_ratio, is_eyes_closed, LandmarkSet, Point2,
};
pub use notify::{StateBus, SubscriptionId};
pub use state::{DrowsinessMachine, DrowsinessState, FrameInput, SessionState, Transition};

use thiserror::Error;
use tracing::info;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Expected {expected} landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },
}

/// Drowsiness monitor for a single session.
///
/// Turns a per-frame `Detection` into a closure decision, advances the state
/// machine and reports the result.
#[derive(Debug)]
pub struct DrowsinessMonitor {
    machine: DrowsinessMachine,
}

impl DrowsinessMonitor {
    /// Create a new monitor with configuration
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        info!(
            "Drowsiness monitor ready (EAR<{}, closure>{}ms, cool-down {}ms, safe mode after {} warnings)",
            config.ear_threshold,
            config.eyes_closed_threshold_ms,
            config.warning_cooldown_ms,
            config.warnings_to_safe_mode
        );
        Ok(Self {
            machine: DrowsinessMachine::new(config),
        })
    }

    /// Process one frame's detection at `now_ms`
    pub fn process(&mut self, detection: &Detection, now_ms: u64) -> FrameAnalysis {
        let ear_threshold = self.machine.config().ear_threshold;

        let (input, ear) = match detection.landmarks() {
            Some(landmarks) => {
                let ear = eye_aspect_ratio(landmarks);
                (
                    FrameInput::FaceFound {
                        eyes_closed: ear_indicates_closed(ear, ear_threshold),
                    },
                    Some(ear),
                )
            }
            None => (FrameInput::FaceLost, None),
        };

        let step = self.machine.process(input, now_ms);

        FrameAnalysis {
            timestamp_ms: now_ms,
            face_detected: detection.is_face(),
            face_region: detection.region().copied(),
            ear,
            eyes_closed: match input {
                FrameInput::FaceFound { eyes_closed } => Some(eyes_closed),
                FrameInput::FaceLost => None,
            },
            previous_state: step.previous,
            state: step.session.state,
            warnings: step.session.warnings,
            notifications: step.notifications,
        }
    }

    /// Register a callback for one state
    pub fn subscribe<F>(&mut self, state: DrowsinessState, callback: F) -> SubscriptionId
    where
        F: FnMut(DrowsinessState) + Send + 'static,
    {
        self.machine.subscribe(state, callback)
    }

    /// Register a callback for every state
    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(DrowsinessState) + Send + 'static,
    {
        self.machine.subscribe_all(callback)
    }

    pub fn state(&self) -> DrowsinessState {
        self.machine.state()
    }

    pub fn warnings(&self) -> u32 {
        self.machine.warnings()
    }

    pub fn config(&self) -> &DmsConfig {
        self.machine.config()
    }

    /// Reset session state (new subject or restart)
    pub fn reset_state(&mut self) {
        info!("Drowsiness session reset");
        self.machine.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::fixtures;
    use std::sync::{Arc, Mutex};

    fn face(landmarks: LandmarkSet) -> Detection {
        Detection::Face {
            region: FaceRegion::from_corners(0.0, 0.0, 200.0, 200.0, 0.9),
            landmarks,
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DmsConfig {
            warnings_to_safe_mode: 0,
            ..Default::default()
        };
        assert!(DrowsinessMonitor::new(config).is_err());
    }

    #[test]
    fn test_landmarks_drive_the_machine() {
        let mut monitor = DrowsinessMonitor::new(DmsConfig::default()).unwrap();

        let first = monitor.process(&face(fixtures::open_eyes()), 0);
        assert_eq!(first.state, DrowsinessState::FaceDetected);
        assert_eq!(first.eyes_closed, Some(false));
        assert!((first.ear.unwrap() - 0.35).abs() < 1e-5);

        let closed = monitor.process(&face(fixtures::closed_eyes()), 100);
        assert_eq!(closed.state, DrowsinessState::EyesClosedDetected);
        assert_eq!(closed.eyes_closed, Some(true));

        let warned = monitor.process(&face(fixtures::closed_eyes()), 2101);
        assert!(warned.warning_fired());
        assert_eq!(warned.warnings, 1);
        assert_eq!(warned.notifications, vec![DrowsinessState::WarnUser]);
    }

    #[test]
    fn test_no_face_frame() {
        let mut monitor = DrowsinessMonitor::new(DmsConfig::default()).unwrap();
        monitor.process(&face(fixtures::open_eyes()), 0);

        let lost = monitor.process(&Detection::NoFace, 33);
        assert!(!lost.face_detected);
        assert_eq!(lost.ear, None);
        assert_eq!(lost.eyes_closed, None);
        assert_eq!(lost.state, DrowsinessState::Initial);
    }

    #[test]
    fn test_face_without_landmarks_counts_as_lost() {
        let mut monitor = DrowsinessMonitor::new(DmsConfig::default()).unwrap();
        monitor.process(&face(fixtures::open_eyes()), 0);

        let region = FaceRegion::from_corners(0.0, 0.0, 200.0, 200.0, 0.9);
        let unfitted = monitor.process(&Detection::FaceOnly { region }, 33);
        assert!(!unfitted.face_detected);
        assert_eq!(unfitted.face_region, Some(region));
        assert_eq!(unfitted.ear, None);
        assert_eq!(unfitted.state, DrowsinessState::Initial);
    }

    #[test]
    fn test_closure_matches_exported_classifier() {
        let config = DmsConfig::default();
        let mut monitor = DrowsinessMonitor::new(config.clone()).unwrap();
        for (t, ear) in [(0, 0.3), (10, 0.29), (20, 0.31)] {
            let set = fixtures::face_with_ears(ear, ear);
            let analysis = monitor.process(&face(set.clone()), t);
            assert_eq!(
                analysis.eyes_closed,
                Some(is_eyes_closed(&set, config.ear_threshold))
            );
        }
    }

    #[test]
    fn test_one_closed_eye_is_not_drowsy() {
        let mut monitor = DrowsinessMonitor::new(DmsConfig::default()).unwrap();
        let wink = fixtures::face_with_ears(0.05, 0.4);
        for t in [0, 1000, 3000, 6000] {
            assert_eq!(monitor.process(&face(wink.clone()), t).eyes_closed, Some(false));
        }
        assert_eq!(monitor.state(), DrowsinessState::FaceDetected);
    }

    #[test]
    fn test_subscribers_see_notifications_before_return() {
        let mut monitor = DrowsinessMonitor::new(DmsConfig::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        monitor.subscribe(DrowsinessState::FaceDetected, move |s| sink.lock().unwrap().push(s));

        monitor.process(&face(fixtures::open_eyes()), 0);
        assert_eq!(*seen.lock().unwrap(), vec![DrowsinessState::FaceDetected]);

        monitor.reset_state();
        assert_eq!(monitor.state(), DrowsinessState::Initial);
        assert_eq!(monitor.warnings(), 0);
    }
}
