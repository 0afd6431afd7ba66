//! Face detection and landmark fitting
//!
//! Both models sit behind traits so the monitoring loop can run against any
//! backend. The ONNX implementations use `ort`.

use camera_capture::frame::VideoFrame;
use image::{imageops, GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::geometry::{LandmarkSet, LANDMARK_COUNT};
use crate::{DmsConfig, DmsError};

/// Face bounding box in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32, confidence: f32) -> Self {
        Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
            confidence,
        }
    }

    /// Integer pixel rectangle clipped to a `width` x `height` image.
    ///
    /// None when nothing of the region lies inside the image.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).max(0.0).ceil() as u32).min(width);
        let y1 = ((self.y + self.height).max(0.0).ceil() as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Outcome of detection for one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    NoFace,
    /// A confident face whose landmarks could not be fitted
    FaceOnly { region: FaceRegion },
    Face {
        region: FaceRegion,
        landmarks: LandmarkSet,
    },
}

impl Detection {
    pub fn is_face(&self) -> bool {
        matches!(self, Detection::Face { .. })
    }

    pub fn region(&self) -> Option<&FaceRegion> {
        match self {
            Detection::Face { region, .. } | Detection::FaceOnly { region } => Some(region),
            Detection::NoFace => None,
        }
    }

    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        match self {
            Detection::Face { landmarks, .. } => Some(landmarks),
            Detection::FaceOnly { .. } | Detection::NoFace => None,
        }
    }
}

/// Finds candidate faces in a frame
pub trait FaceDetector {
    /// All candidate regions with their confidences, unfiltered
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DmsError>;
}

/// Fits the 68-point landmark layout to a face region
pub trait LandmarkFitter {
    /// `gray` is the equalized grayscale frame. `Ok(None)` when fitting fails.
    fn fit(&self, gray: &GrayImage, region: &FaceRegion) -> Result<Option<LandmarkSet>, DmsError>;
}

/// First region whose confidence is strictly above `min_confidence`
pub fn primary_face(regions: &[FaceRegion], min_confidence: f32) -> Option<FaceRegion> {
    regions
        .iter()
        .find(|r| r.confidence > min_confidence)
        .copied()
}

/// Detect the primary face of `frame` and fit its landmarks.
///
/// A failed fit keeps the region as `Detection::FaceOnly`; without landmarks
/// the frame still counts as face-lost.
pub fn detect_face_and_landmarks(
    detector: &dyn FaceDetector,
    fitter: &dyn LandmarkFitter,
    frame: &VideoFrame,
    min_confidence: f32,
) -> Result<Detection, DmsError> {
    let regions = detector.detect(frame)?;
    let Some(region) = primary_face(&regions, min_confidence) else {
        return Ok(Detection::NoFace);
    };

    let gray = GrayImage::from_raw(frame.width, frame.height, frame.to_equalized_grayscale())
        .ok_or_else(|| DmsError::ImageProcessing("Frame size does not match its data".into()))?;

    match fitter.fit(&gray, &region)? {
        Some(landmarks) => Ok(Detection::Face { region, landmarks }),
        None => {
            debug!("Landmark fit failed for frame #{}", frame.sequence);
            Ok(Detection::FaceOnly { region })
        }
    }
}

fn load_session(path: &str, what: &str) -> Result<Session, DmsError> {
    info!("Loading {} model from {}", what, path);
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| {
            error!("Failed to load {} model: {}", what, e);
            DmsError::ModelLoad(e.to_string())
        })
}

/// SSD input side (the res10 face detector is trained at 300x300)
const SSD_INPUT_SIZE: u32 = 300;

/// Per-channel means subtracted from the BGR input
const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];

/// Values per detection row: `[image_id, label, confidence, x0, y0, x1, y1]`
const SSD_ROW_LEN: usize = 7;

/// SSD-style face detector (ResNet-10 300x300 family)
pub struct OnnxFaceDetector {
    session: Session,
}

impl OnnxFaceDetector {
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = config
            .face_model_path
            .as_deref()
            .ok_or_else(|| DmsError::Config("face_model_path is not set".into()))?;
        Ok(Self {
            session: load_session(path, "face detection")?,
        })
    }

    fn preprocess(frame: &VideoFrame) -> Result<Array4<f32>, DmsError> {
        let img: RgbImage = frame
            .to_rgb_image()
            .ok_or_else(|| DmsError::ImageProcessing("Failed to create image buffer".into()))?;
        let resized = imageops::resize(
            &img,
            SSD_INPUT_SIZE,
            SSD_INPUT_SIZE,
            imageops::FilterType::Triangle,
        );

        let side = SSD_INPUT_SIZE as usize;
        let mut input = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            // channel order is BGR
            input[[0, 0, y, x]] = pixel[2] as f32 - SSD_MEAN_BGR[0];
            input[[0, 1, y, x]] = pixel[1] as f32 - SSD_MEAN_BGR[1];
            input[[0, 2, y, x]] = pixel[0] as f32 - SSD_MEAN_BGR[2];
        }
        Ok(input)
    }
}

/// Decode SSD rows (normalized corners) into regions in pixel coordinates
pub fn decode_ssd_rows(raw: &[f32], width: u32, height: u32) -> Vec<FaceRegion> {
    let (w, h) = (width as f32, height as f32);
    raw.chunks_exact(SSD_ROW_LEN)
        .map(|row| FaceRegion::from_corners(row[3] * w, row[4] * h, row[5] * w, row[6] * h, row[2]))
        .collect()
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DmsError> {
        let input = Self::preprocess(frame)?;

        let outputs = self
            .session
            .run(ort::inputs![input].map_err(|e| DmsError::Inference(e.to_string()))?)
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let detections = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let raw: Vec<f32> = detections.iter().copied().collect();

        let regions = decode_ssd_rows(&raw, frame.width, frame.height);
        debug!("Face detector produced {} candidates", regions.len());
        Ok(regions)
    }
}

/// Regression landmark model: square grayscale crop in, 136 normalized
/// coordinates (x0, y0, x1, y1, ...) relative to the crop out.
pub struct OnnxLandmarkFitter {
    session: Session,
    input_size: u32,
}

impl OnnxLandmarkFitter {
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = config
            .landmark_model_path
            .as_deref()
            .ok_or_else(|| DmsError::Config("landmark_model_path is not set".into()))?;
        Ok(Self {
            session: load_session(path, "landmark")?,
            input_size: config.landmark_input_size,
        })
    }
}

/// Map crop-relative normalized coordinates back into the full image
pub fn denormalize_landmarks(
    raw: &[f32],
    crop: (u32, u32, u32, u32),
) -> Result<LandmarkSet, DmsError> {
    let (cx, cy, cw, ch) = crop;
    let coords: Vec<f32> = raw
        .iter()
        .take(LANDMARK_COUNT * 2)
        .enumerate()
        .map(|(i, v)| {
            if i % 2 == 0 {
                cx as f32 + v * cw as f32
            } else {
                cy as f32 + v * ch as f32
            }
        })
        .collect();
    LandmarkSet::from_flat(&coords)
}

impl LandmarkFitter for OnnxLandmarkFitter {
    fn fit(&self, gray: &GrayImage, region: &FaceRegion) -> Result<Option<LandmarkSet>, DmsError> {
        let Some(crop) = region.pixel_rect(gray.width(), gray.height()) else {
            return Ok(None);
        };
        let (x, y, w, h) = crop;

        let face = imageops::crop_imm(gray, x, y, w, h).to_image();
        let resized = imageops::resize(
            &face,
            self.input_size,
            self.input_size,
            imageops::FilterType::Triangle,
        );

        let side = self.input_size as usize;
        let mut input = Array4::<f32>::zeros((1, 1, side, side));
        for (px, py, pixel) in resized.enumerate_pixels() {
            input[[0, 0, py as usize, px as usize]] = pixel[0] as f32 / 255.0;
        }

        let outputs = self
            .session
            .run(ort::inputs![input].map_err(|e| DmsError::Inference(e.to_string()))?)
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let tensor = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let raw: Vec<f32> = tensor.iter().copied().collect();

        if raw.len() < LANDMARK_COUNT * 2 {
            return Err(DmsError::Inference(format!(
                "Landmark model returned {} values, expected {}",
                raw.len(),
                LANDMARK_COUNT * 2
            )));
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Ok(None);
        }

        denormalize_landmarks(&raw, crop).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::fixtures;
    use std::cell::Cell;

    struct FixedDetector(Vec<FaceRegion>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _frame: &VideoFrame) -> Result<Vec<FaceRegion>, DmsError> {
            Ok(self.0.clone())
        }
    }

    /// Records the region it was asked to fit
    struct RecordingFitter {
        result: Option<LandmarkSet>,
        seen: Cell<Option<FaceRegion>>,
    }

    impl LandmarkFitter for RecordingFitter {
        fn fit(&self, gray: &GrayImage, region: &FaceRegion) -> Result<Option<LandmarkSet>, DmsError> {
            assert_eq!(gray.dimensions(), (8, 6));
            self.seen.set(Some(*region));
            Ok(self.result.clone())
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame::new(vec![128; 8 * 6 * 3], 8, 6, 0, 0)
    }

    fn region(confidence: f32) -> FaceRegion {
        FaceRegion::from_corners(1.0, 1.0, 5.0, 5.0, confidence)
    }

    #[test]
    fn test_primary_face_confidence_is_strict() {
        let regions = [region(0.7), region(0.71), region(0.99)];
        assert_eq!(primary_face(&regions, 0.7).unwrap().confidence, 0.71);
        assert!(primary_face(&[region(0.5)], 0.7).is_none());
    }

    #[test]
    fn test_detect_uses_first_confident_face() {
        let detector = FixedDetector(vec![region(0.2), region(0.9), region(0.95)]);
        let fitter = RecordingFitter {
            result: Some(fixtures::open_eyes()),
            seen: Cell::new(None),
        };

        let detection = detect_face_and_landmarks(&detector, &fitter, &frame(), 0.7).unwrap();
        assert!(detection.is_face());
        assert_eq!(fitter.seen.get().unwrap().confidence, 0.9);
        assert_eq!(detection.region().unwrap().confidence, 0.9);
    }

    #[test]
    fn test_no_confident_face_skips_fitting() {
        let detector = FixedDetector(vec![region(0.3)]);
        let fitter = RecordingFitter {
            result: Some(fixtures::open_eyes()),
            seen: Cell::new(None),
        };

        let detection = detect_face_and_landmarks(&detector, &fitter, &frame(), 0.7).unwrap();
        assert_eq!(detection, Detection::NoFace);
        assert!(fitter.seen.get().is_none());
    }

    #[test]
    fn test_failed_fit_keeps_region() {
        let detector = FixedDetector(vec![region(0.9)]);
        let fitter = RecordingFitter {
            result: None,
            seen: Cell::new(None),
        };
        let detection = detect_face_and_landmarks(&detector, &fitter, &frame(), 0.7).unwrap();
        assert_eq!(detection, Detection::FaceOnly { region: region(0.9) });
        assert!(!detection.is_face());
        assert!(detection.landmarks().is_none());
        assert_eq!(detection.region().unwrap().confidence, 0.9);
    }

    #[test]
    fn test_decode_ssd_rows() {
        let raw = [
            0.0, 1.0, 0.98, 0.25, 0.5, 0.75, 1.0,
            0.0, 1.0, 0.10, 0.0, 0.0, 0.1, 0.1,
        ];
        let regions = decode_ssd_rows(&raw, 400, 200);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], FaceRegion::from_corners(100.0, 100.0, 300.0, 200.0, 0.98));
        assert_eq!(regions[1].confidence, 0.10);
    }

    #[test]
    fn test_pixel_rect_clips_to_image() {
        let r = FaceRegion::from_corners(-10.0, 5.0, 50.0, 500.0, 0.9);
        assert_eq!(r.pixel_rect(40, 100), Some((0, 5, 40, 95)));

        let outside = FaceRegion::from_corners(60.0, 60.0, 80.0, 80.0, 0.9);
        assert_eq!(outside.pixel_rect(40, 40), None);
    }

    #[test]
    fn test_denormalize_landmarks() {
        let mut raw = vec![0.5; LANDMARK_COUNT * 2];
        raw[0] = 0.0;
        raw[1] = 1.0;
        let set = denormalize_landmarks(&raw, (10, 20, 100, 50)).unwrap();
        assert_eq!(set.points()[0].x, 10.0);
        assert_eq!(set.points()[0].y, 70.0);
        assert_eq!(set.points()[1].x, 60.0);
        assert_eq!(set.points()[1].y, 45.0);
    }

    #[test]
    fn test_onnx_detector_requires_model_path() {
        let config = DmsConfig::default();
        assert!(matches!(OnnxFaceDetector::new(&config), Err(DmsError::Config(_))));
        assert!(matches!(OnnxLandmarkFitter::new(&config), Err(DmsError::Config(_))));
    }
}
