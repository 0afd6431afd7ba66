//! Per-frame orchestration: detect, classify, transition, report

use alerting::{AlertConfig, StatusBoard};
use camera_capture::VideoFrame;
use dms::{
    detect_face_and_landmarks, Detection, DmsConfig, DrowsinessMonitor, DrowsinessState,
    FaceDetector, FrameAnalysis, LandmarkFitter,
};
use imageproc::filter::gaussian_blur_f32;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::MonitorError;

/// One processed frame
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub detection: Detection,
    pub analysis: FrameAnalysis,
    /// Status label after this frame
    pub message: String,
}

/// Totals for a monitoring run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub faces: u64,
    pub detection_errors: u64,
    pub warnings: u32,
    pub final_state: DrowsinessState,
}

/// Drives the detectors and the drowsiness monitor frame by frame
pub struct FrameOrchestrator {
    detector: Box<dyn FaceDetector>,
    fitter: Box<dyn LandmarkFitter>,
    monitor: DrowsinessMonitor,
    board: Arc<Mutex<StatusBoard>>,
    summary: RunSummary,
    blur_sigma: f32,
}

impl FrameOrchestrator {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        fitter: Box<dyn LandmarkFitter>,
        dms_config: DmsConfig,
        alert_config: AlertConfig,
    ) -> Result<Self, MonitorError> {
        let mut monitor = DrowsinessMonitor::new(dms_config)?;
        let board = Arc::new(Mutex::new(StatusBoard::new(alert_config)));
        StatusBoard::attach(&board, &mut monitor);

        monitor.subscribe_all(|state| {
            metrics::counter!("state_notifications_total", "state" => state.as_str()).increment(1);
        });

        Ok(Self {
            detector,
            fitter,
            monitor,
            board,
            summary: RunSummary::default(),
            blur_sigma: 0.0,
        })
    }

    /// Smooth frames with a Gaussian of `sigma` before detection; zero disables
    pub fn with_blur_sigma(mut self, sigma: f32) -> Self {
        self.blur_sigma = sigma;
        self
    }

    /// Blurred copy of `frame`, or None when smoothing is off
    fn smooth(&self, frame: &VideoFrame) -> Option<VideoFrame> {
        if self.blur_sigma.is_nan() || self.blur_sigma <= 0.0 {
            return None;
        }
        let image = frame.to_rgb_image()?;
        Some(VideoFrame::from_rgb_image(
            gaussian_blur_f32(&image, self.blur_sigma),
            frame.timestamp_ns,
            frame.sequence,
        ))
    }

    /// Process one frame, stamped with the frame's capture time
    pub fn process_frame(&mut self, frame: &VideoFrame) -> ProcessedFrame {
        let min_confidence = self.monitor.config().face_confidence;
        let smoothed = self.smooth(frame);
        let detection = match detect_face_and_landmarks(
            self.detector.as_ref(),
            self.fitter.as_ref(),
            smoothed.as_ref().unwrap_or(frame),
            min_confidence,
        ) {
            Ok(detection) => detection,
            Err(e) => {
                warn!("Detection failed on frame #{}: {}", frame.sequence, e);
                metrics::counter!("detection_errors_total").increment(1);
                self.summary.detection_errors += 1;
                Detection::NoFace
            }
        };

        let analysis = self.monitor.process(&detection, frame.timestamp_ms());

        metrics::counter!("frames_processed_total").increment(1);
        self.summary.frames += 1;
        if analysis.face_detected {
            metrics::counter!("faces_detected_total").increment(1);
            self.summary.faces += 1;
        }
        if analysis.warning_fired() {
            metrics::counter!("warnings_total").increment(1);
            info!(
                "Drowsiness warning #{} at {}ms",
                analysis.warnings, analysis.timestamp_ms
            );
        }
        if analysis.state_changed() && analysis.state == DrowsinessState::SafeMode {
            warn!("Safe mode engaged after {} warnings", analysis.warnings);
        }
        metrics::gauge!("warning_count").set(analysis.warnings as f64);

        self.summary.warnings = analysis.warnings;
        self.summary.final_state = analysis.state;

        ProcessedFrame {
            detection,
            analysis,
            message: self.message(),
        }
    }

    /// Current status label
    pub fn message(&self) -> String {
        self.board
            .lock()
            .map(|b| b.message().to_string())
            .unwrap_or_default()
    }

    pub fn state(&self) -> DrowsinessState {
        self.monitor.state()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn status_board(&self) -> Arc<Mutex<StatusBoard>> {
        Arc::clone(&self.board)
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::*;
    use super::*;

    #[test]
    fn test_full_escalation_sequence() {
        let mut orch = orchestrator();

        let first = orch.process_frame(&frame(OPEN, 0, 0));
        assert_eq!(first.analysis.state, DrowsinessState::FaceDetected);
        assert_eq!(first.message, "OK!");

        let closed = orch.process_frame(&frame(CLOSED, 100, 1));
        assert_eq!(closed.analysis.state, DrowsinessState::EyesClosedDetected);
        assert_eq!(closed.message, "Eyes closed!");

        let warned = orch.process_frame(&frame(CLOSED, 2200, 2));
        assert_eq!(warned.analysis.state, DrowsinessState::WarnUser);
        assert_eq!(warned.message, "Alarm!");

        let summary = orch.summary().clone();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.faces, 3);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.final_state, DrowsinessState::WarnUser);
    }

    #[test]
    fn test_no_face_frames() {
        let mut orch = orchestrator();
        orch.process_frame(&frame(OPEN, 0, 0));
        let lost = orch.process_frame(&frame(NO_FACE, 33, 1));

        assert!(!lost.analysis.face_detected);
        assert!(lost.detection.landmarks().is_none());
        assert_eq!(orch.state(), DrowsinessState::Initial);
        assert_eq!(orch.summary().faces, 1);
    }

    #[test]
    fn test_detector_failure_counts_as_no_face() {
        let mut orch = FrameOrchestrator::new(
            Box::new(FailingDetector),
            Box::new(ScriptedFitter),
            DmsConfig::default(),
            AlertConfig::default(),
        )
        .unwrap();

        let processed = orch.process_frame(&frame(OPEN, 0, 0));
        assert_eq!(processed.analysis.state, DrowsinessState::Initial);
        assert_eq!(orch.summary().detection_errors, 1);
        assert_eq!(orch.summary().frames, 1);
    }

    #[test]
    fn test_unfitted_face_keeps_region() {
        let mut orch = FrameOrchestrator::new(
            Box::new(ScriptedDetector),
            Box::new(UnfittableFitter),
            DmsConfig::default(),
            AlertConfig::default(),
        )
        .unwrap();

        let f = frame(OPEN, 0, 0);
        let processed = orch.process_frame(&f);
        assert_eq!(processed.analysis.state, DrowsinessState::Initial);
        assert!(!processed.analysis.face_detected);
        assert!(processed.analysis.face_region.is_some());
        assert_eq!(orch.summary().faces, 0);

        let font = crate::status_font().unwrap();
        let image = crate::annotate(
            &f,
            &processed.detection,
            processed.analysis.state,
            &processed.message,
            &font,
        )
        .unwrap();
        // left edge of the face box
        assert_eq!(*image.get_pixel(0, 3), image::Rgb([0, 255, 0]));
        assert_eq!(*image.get_pixel(3, 3), image::Rgb([OPEN, OPEN, OPEN]));
    }

    /// Detector that keeps a copy of every frame it sees
    struct CapturingDetector(Arc<Mutex<Vec<VideoFrame>>>);

    impl FaceDetector for CapturingDetector {
        fn detect(&self, frame: &VideoFrame) -> Result<Vec<dms::FaceRegion>, dms::DmsError> {
            self.0.lock().unwrap().push(frame.clone());
            Ok(vec![])
        }
    }

    /// 9x9 grey frame with one bright pixel in the middle
    fn spot_frame() -> VideoFrame {
        let mut data = vec![OPEN; 9 * 9 * 3];
        let centre = (4 * 9 + 4) * 3;
        data[centre..centre + 3].copy_from_slice(&[250, 250, 250]);
        VideoFrame::new(data, 9, 9, 0, 0)
    }

    fn seen_by_detector(sigma: f32) -> VideoFrame {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut orch = FrameOrchestrator::new(
            Box::new(CapturingDetector(seen.clone())),
            Box::new(ScriptedFitter),
            DmsConfig::default(),
            AlertConfig::default(),
        )
        .unwrap()
        .with_blur_sigma(sigma);

        orch.process_frame(&spot_frame());
        let frames = seen.lock().unwrap();
        assert_eq!(frames.len(), 1);
        frames[0].clone()
    }

    #[test]
    fn test_blur_applied_before_detection() {
        let original = spot_frame();
        let blurred = seen_by_detector(1.0);

        let at = |f: &VideoFrame, x: usize, y: usize| f.data[(y * 9 + x) * 3];
        assert!(at(&blurred, 4, 4) < 250);
        assert!(at(&blurred, 5, 4) > OPEN);
        assert_eq!(blurred.timestamp_ns, original.timestamp_ns);
        assert_eq!(blurred.sequence, original.sequence);
    }

    #[test]
    fn test_zero_sigma_passes_frame_through() {
        assert_eq!(seen_by_detector(0.0).data, spot_frame().data);
    }

    #[test]
    fn test_board_is_shared() {
        let mut orch = orchestrator();
        orch.process_frame(&frame(OPEN, 0, 0));
        let board = orch.status_board();
        assert_eq!(board.lock().unwrap().fire_count(DrowsinessState::FaceDetected), 1);
    }
}
