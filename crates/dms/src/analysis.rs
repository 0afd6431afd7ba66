//! Per-frame analysis results

use serde::{Deserialize, Serialize};

use crate::detector::FaceRegion;
use crate::state::DrowsinessState;

/// Complete result of processing one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Timestamp the frame was processed at (ms)
    pub timestamp_ms: u64,

    /// Whether a face with landmarks was found
    pub face_detected: bool,

    /// Primary face bounding box (if detected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_region: Option<FaceRegion>,

    /// Eye aspect ratio (if a face was found)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ear: Option<f32>,

    /// Closure decision (if a face was found)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes_closed: Option<bool>,

    /// State before this frame
    pub previous_state: DrowsinessState,

    /// State after this frame
    pub state: DrowsinessState,

    /// Warnings fired so far this session
    pub warnings: u32,

    /// Notifications delivered while processing this frame
    pub notifications: Vec<DrowsinessState>,
}

impl FrameAnalysis {
    pub fn state_changed(&self) -> bool {
        self.previous_state != self.state
    }

    /// Warning or safe mode is active
    pub fn is_alerting(&self) -> bool {
        matches!(self.state, DrowsinessState::WarnUser | DrowsinessState::SafeMode)
    }

    /// Entered the warning state on this frame
    pub fn warning_fired(&self) -> bool {
        self.state == DrowsinessState::WarnUser && self.state_changed()
    }
}
