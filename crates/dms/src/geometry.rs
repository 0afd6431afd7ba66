//! Landmark geometry and the eye-closure classifier

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::DmsError;

/// Number of points in a facial landmark set (iBUG 68-point layout)
pub const LANDMARK_COUNT: usize = 68;

/// Contour of the first eye (subject's right, image left)
pub const RIGHT_EYE: Range<usize> = 36..42;

/// Contour of the second eye (subject's left, image right)
pub const LEFT_EYE: Range<usize> = 42..48;

/// 2D point in image pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Ordered 68-point facial landmark set for a single face.
///
/// Construction checks the length, so the eye indices are always in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point2>", into = "Vec<Point2>")]
pub struct LandmarkSet {
    points: Vec<Point2>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2>) -> Result<Self, DmsError> {
        if points.len() != LANDMARK_COUNT {
            return Err(DmsError::LandmarkCount {
                expected: LANDMARK_COUNT,
                actual: points.len(),
            });
        }
        Ok(Self { points })
    }

    /// Build from interleaved `[x0, y0, x1, y1, ...]` coordinates
    pub fn from_flat(coords: &[f32]) -> Result<Self, DmsError> {
        if coords.len() != LANDMARK_COUNT * 2 {
            return Err(DmsError::LandmarkCount {
                expected: LANDMARK_COUNT,
                actual: coords.len() / 2,
            });
        }
        Self::new(
            coords
                .chunks_exact(2)
                .map(|c| Point2::new(c[0], c[1]))
                .collect(),
        )
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn right_eye(&self) -> &[Point2] {
        &self.points[RIGHT_EYE]
    }

    pub fn left_eye(&self) -> &[Point2] {
        &self.points[LEFT_EYE]
    }

    /// Same landmarks shifted by `(dx, dy)`
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| Point2::new(p.x + dx, p.y + dy))
                .collect(),
        }
    }
}

impl TryFrom<Vec<Point2>> for LandmarkSet {
    type Error = DmsError;

    fn try_from(points: Vec<Point2>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<LandmarkSet> for Vec<Point2> {
    fn from(set: LandmarkSet) -> Self {
        set.points
    }
}

/// Euclidean distance between two points
pub fn distance(p1: Point2, p2: Point2) -> f32 {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    (dx * dx + dy * dy).sqrt()
}

/// Aspect ratio of one six-point eye contour.
///
/// `(|p1-p5| + |p2-p4|) / (2 |p0-p3|)`: two lid-to-lid verticals over the
/// corner-to-corner width.
pub fn eye_ratio(eye: &[Point2]) -> f32 {
    let vertical_1 = distance(eye[1], eye[5]);
    let vertical_2 = distance(eye[2], eye[4]);
    let horizontal = distance(eye[0], eye[3]);
    (vertical_1 + vertical_2) / (2.0 * horizontal)
}

/// Eye aspect ratio (EAR) of a face: the larger of the two eye ratios.
///
/// Taking the max means the face only reads as closed once both eyes are
/// closed, so a single squinting or winking eye does not trigger.
pub fn eye_aspect_ratio(landmarks: &LandmarkSet) -> f32 {
    let right = eye_ratio(landmarks.right_eye());
    let left = eye_ratio(landmarks.left_eye());
    right.max(left)
}

/// Closure decision for an already computed EAR: strictly below the threshold
pub fn ear_indicates_closed(ear: f32, ear_threshold: f32) -> bool {
    ear < ear_threshold
}

/// True when the EAR falls strictly below `ear_threshold`
pub fn is_eyes_closed(landmarks: &LandmarkSet, ear_threshold: f32) -> bool {
    ear_indicates_closed(eye_aspect_ratio(landmarks), ear_threshold)
}

/// Synthetic landmark sets for tests in this crate and downstream ones.
#[doc(hidden)]
pub mod fixtures {
    use super::*;

    /// Six-point eye contour centred on `(cx, cy)` with the given lid gap
    fn eye(cx: f32, cy: f32, width: f32, gap: f32) -> [Point2; 6] {
        let half_w = width / 2.0;
        let half_g = gap / 2.0;
        [
            Point2::new(cx - half_w, cy),
            Point2::new(cx - half_w / 3.0, cy - half_g),
            Point2::new(cx + half_w / 3.0, cy - half_g),
            Point2::new(cx + half_w, cy),
            Point2::new(cx + half_w / 3.0, cy + half_g),
            Point2::new(cx - half_w / 3.0, cy + half_g),
        ]
    }

    /// Face whose eyes have ratios `right_ear` and `left_ear` (30 px wide eyes)
    pub fn face_with_ears(right_ear: f32, left_ear: f32) -> LandmarkSet {
        let width = 30.0;
        let mut points: Vec<Point2> = (0..LANDMARK_COUNT)
            .map(|i| Point2::new(100.0 + i as f32, 200.0))
            .collect();

        // ratio = (gap + gap) / (2 * width) = gap / width
        let right = eye(120.0, 100.0, width, right_ear * width);
        let left = eye(180.0, 100.0, width, left_ear * width);
        points[RIGHT_EYE].copy_from_slice(&right);
        points[LEFT_EYE].copy_from_slice(&left);

        LandmarkSet { points }
    }

    pub fn open_eyes() -> LandmarkSet {
        face_with_ears(0.35, 0.35)
    }

    pub fn closed_eyes() -> LandmarkSet {
        face_with_ears(0.1, 0.1)
    }
}
