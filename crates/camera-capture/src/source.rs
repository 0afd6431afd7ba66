//! Frame sources

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{CameraConfig, CameraError, VideoFrame};

/// Extensions accepted by the image-sequence source
const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Anything that yields frames in capture order.
///
/// `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;
}

/// Replays a directory of still images as a video stream.
///
/// Files are read in lexicographic order and stamped at a fixed frame rate,
/// so replays are deterministic regardless of how fast frames are consumed.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_interval_ns: u64,
}

impl ImageSequenceSource {
    /// Open the directory named by the configuration
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let paths = list_frames(&config.source_dir)?;
        info!(
            "Opened image sequence {} ({} frames @ {} fps)",
            config.source_dir.display(),
            paths.len(),
            config.fps
        );

        Ok(Self {
            paths,
            cursor: 0,
            frame_interval_ns: config.frame_interval_ns(),
        })
    }

    /// Number of frames in the sequence
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };

        let image = image::open(path)
            .map_err(|e| CameraError::Decode {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .to_rgb8();

        let sequence = self.cursor as u32;
        let timestamp_ns = self.cursor as u64 * self.frame_interval_ns;
        self.cursor += 1;

        debug!("Read frame #{} from {}", sequence, path.display());
        Ok(Some(VideoFrame::from_rgb_image(image, timestamp_ns, sequence)))
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
    if !dir.is_dir() {
        return Err(CameraError::Open(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_frame {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
