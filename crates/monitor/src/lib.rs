//! Drowsiness Monitor
//!
//! Frame orchestrator: pulls frames from the capture service, runs face and
//! landmark detection, feeds the drowsiness state machine and writes
//! annotated output.

pub mod orchestrator;
pub mod overlay;
pub mod settings;

pub use orchestrator::{FrameOrchestrator, ProcessedFrame, RunSummary};
pub use overlay::{annotate, status_font, FrameSink};
pub use settings::MonitorSettings;

use camera_capture::{CameraError, CaptureService, ImageSequenceSource};
use dms::{DmsError, OnnxFaceDetector, OnnxLandmarkFitter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Settings error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Overlay font is invalid")]
    Font(#[from] ab_glyph::InvalidFont),

    #[error("Analysis serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Initialize logging
pub fn init_logging(level: Level, json: bool) -> Result<(), MonitorError> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| MonitorError::Logging(e.to_string()))
}

/// Serve Prometheus metrics on `addr`
pub fn install_metrics(addr: &str) -> Result<(), MonitorError> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| MonitorError::Metrics(format!("invalid address {addr}: {e}")))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MonitorError::Metrics(e.to_string()))?;
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Consume frames until the source ends or Ctrl-C is received.
///
/// Frames are processed one at a time, in capture order.
pub async fn run_loop(
    orchestrator: &mut FrameOrchestrator,
    capture: &mut CaptureService,
    sink: &mut FrameSink,
) -> Result<RunSummary, MonitorError> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Interrupt received, stopping capture");
                capture.stop();
                break;
            }
            frame = capture.next() => {
                let Some(frame) = frame else {
                    break;
                };
                let processed = orchestrator.process_frame(&frame);
                sink.write(&frame, &processed)?;
            }
        }
    }

    sink.flush()?;
    Ok(orchestrator.summary().clone())
}

/// Build every component from `settings` and run until done
pub async fn run(settings: MonitorSettings) -> Result<RunSummary, MonitorError> {
    if let Some(addr) = &settings.metrics_addr {
        install_metrics(addr)?;
    }

    let detector = OnnxFaceDetector::new(&settings.dms)?;
    let fitter = OnnxLandmarkFitter::new(&settings.dms)?;
    let mut orchestrator = FrameOrchestrator::new(
        Box::new(detector),
        Box::new(fitter),
        settings.dms.clone(),
        settings.alerts.clone(),
    )?
    .with_blur_sigma(settings.blur_sigma);

    let source = ImageSequenceSource::open(&settings.camera)?;
    let mut capture = CaptureService::spawn(source, settings.camera.channel_capacity);
    let mut sink = FrameSink::new(
        settings.output_dir.as_deref(),
        settings.analysis_log.as_deref(),
    )?;

    let summary = run_loop(&mut orchestrator, &mut capture, &mut sink).await?;
    info!(
        "Processed {} frames ({} with a face, {} detection errors), {} warnings, final state {}",
        summary.frames, summary.faces, summary.detection_errors, summary.warnings, summary.final_state
    );

    if let Ok(board) = orchestrator.status_board().lock() {
        for (state, alert) in board.pending() {
            info!("Unacknowledged alert: {} x{}", state, alert.fire_count);
        }
    }
    Ok(summary)
}
