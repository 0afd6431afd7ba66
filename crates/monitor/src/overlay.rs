//! Frame annotation and output

use ab_glyph::{Font, FontRef};
use alerting::Severity;
use camera_capture::VideoFrame;
use dms::{Detection, DrowsinessState, FrameAnalysis, Point2};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_polygon_mut, draw_text_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::orchestrator::ProcessedFrame;
use crate::MonitorError;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Banner height as a fraction of the frame height
const BANNER_FRACTION: f32 = 1.0 / 14.0;

/// Banners thinner than this carry no text
const MIN_TEXT_HEIGHT: u32 = 8;

static STATUS_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Font used for the status text
pub fn status_font() -> Result<FontRef<'static>, MonitorError> {
    Ok(FontRef::try_from_slice(STATUS_FONT)?)
}

/// Draw the face box, filled eye contours and a status banner carrying
/// `message`
pub fn annotate(
    frame: &VideoFrame,
    detection: &Detection,
    state: DrowsinessState,
    message: &str,
    font: &impl Font,
) -> Option<RgbImage> {
    let mut image = frame.to_rgb_image()?;

    if let Some(region) = detection.region() {
        if let Some((x, y, w, h)) = region.pixel_rect(image.width(), image.height()) {
            draw_hollow_rect_mut(&mut image, Rect::at(x as i32, y as i32).of_size(w, h), GREEN);
        }
    }
    if let Some(landmarks) = detection.landmarks() {
        for eye in [landmarks.right_eye(), landmarks.left_eye()] {
            if let Some(polygon) = eye_polygon(eye) {
                draw_polygon_mut(&mut image, &polygon, GREEN);
            }
        }
    }

    let colour = Rgb(Severity::for_state(state).rgb());
    let banner_h = ((image.height() as f32 * BANNER_FRACTION).ceil() as u32).max(1);
    let banner_y = image.height().saturating_sub(banner_h);
    let banner_w = image.width().max(1);
    draw_filled_rect_mut(
        &mut image,
        Rect::at(0, banner_y as i32).of_size(banner_w, banner_h),
        colour,
    );

    if banner_h >= MIN_TEXT_HEIGHT {
        let margin = (banner_h / 10) as i32;
        draw_text_mut(
            &mut image,
            BLACK,
            margin.max(2),
            banner_y as i32 + margin,
            banner_h as f32 * 0.8,
            font,
            &format!("Status: {message}"),
        );
    }

    Some(image)
}

/// Integer polygon for an eye contour, None when it would be degenerate
fn eye_polygon(eye: &[Point2]) -> Option<Vec<Point<i32>>> {
    let mut polygon: Vec<Point<i32>> = eye
        .iter()
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    polygon.dedup();
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }
    (polygon.len() >= 3).then_some(polygon)
}

/// One line of the analysis log
#[derive(Serialize)]
struct AnalysisRecord<'a> {
    sequence: u32,
    message: &'a str,
    #[serde(flatten)]
    analysis: &'a FrameAnalysis,
}

/// Writes annotated frames and analysis records
pub struct FrameSink {
    output_dir: Option<PathBuf>,
    font: Option<FontRef<'static>>,
    analysis: Option<BufWriter<File>>,
}

impl FrameSink {
    pub fn new(output_dir: Option<&Path>, analysis_log: Option<&Path>) -> Result<Self, MonitorError> {
        let font = match output_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                info!("Writing annotated frames to {}", dir.display());
                Some(status_font()?)
            }
            None => None,
        };
        let analysis = match analysis_log {
            Some(path) => {
                info!("Writing frame analysis to {}", path.display());
                Some(BufWriter::new(File::create(path)?))
            }
            None => None,
        };
        Ok(Self {
            output_dir: output_dir.map(Path::to_path_buf),
            font,
            analysis,
        })
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self {
            output_dir: None,
            font: None,
            analysis: None,
        }
    }

    pub fn write(&mut self, frame: &VideoFrame, processed: &ProcessedFrame) -> Result<(), MonitorError> {
        if let (Some(dir), Some(font)) = (&self.output_dir, &self.font) {
            if let Some(image) = annotate(
                frame,
                &processed.detection,
                processed.analysis.state,
                &processed.message,
                font,
            ) {
                let path = dir.join(format!("frame_{:06}.png", frame.sequence));
                image.save(&path)?;
                debug!("Wrote {}", path.display());
            }
        }

        if let Some(writer) = &mut self.analysis {
            let record = AnalysisRecord {
                sequence: frame.sequence,
                message: &processed.message,
                analysis: &processed.analysis,
            };
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), MonitorError> {
        if let Some(writer) = &mut self.analysis {
            writer.flush()?;
        }
        Ok(())
    }
}
