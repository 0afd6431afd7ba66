//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides frame acquisition for the monitoring loop:
//! - Decoded RGB frames with grayscale and histogram equalization helpers
//! - Image-sequence source (replays a directory of captured frames)
//! - Background capture service feeding a bounded channel

pub mod frame;
pub mod service;
pub mod source;

pub use frame::{equalize_histogram, VideoFrame};
pub use service::CaptureService;
pub use source::{FrameSource, ImageSequenceSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("Failed to decode frame {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Open(err.to_string())
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Directory holding the frame sequence (e.g., "frames/")
    pub source_dir: PathBuf,
    /// Frame rate used to timestamp the sequence
    pub fps: u32,
    /// Capacity of the capture channel (frames in flight)
    pub channel_capacity: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("frames"),
            fps: 15,
            channel_capacity: 4,
        }
    }
}

impl CameraConfig {
    /// Nanoseconds between two consecutive frames
    pub fn frame_interval_ns(&self) -> u64 {
        1_000_000_000 / u64::from(self.fps.max(1))
    }
}
