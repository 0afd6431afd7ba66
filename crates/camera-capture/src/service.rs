//! Background capture service

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{FrameSource, VideoFrame};

/// Async capture service for tokio.
///
/// Frames are read on a dedicated thread and handed over through a bounded
/// channel, so capture never runs ahead of processing by more than
/// `capacity` frames. The receiving side is a single consumer and sees frames
/// in capture order.
pub struct CaptureService {
    receiver: mpsc::Receiver<VideoFrame>,
    shutdown: Arc<AtomicBool>,
}

impl CaptureService {
    /// Spawn the capture thread over `source`
    pub fn spawn<S>(mut source: S, capacity: usize) -> Self
    where
        S: FrameSource + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<VideoFrame>(capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        std::thread::spawn(move || {
            while !shutdown_clone.load(Ordering::SeqCst) {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        if tx.blocking_send(frame).is_err() {
                            debug!("Capture receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Frame source exhausted");
                        break;
                    }
                    Err(e) => {
                        error!("Capture failed: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            receiver: rx,
            shutdown,
        }
    }

    /// Receive next frame (None once the source is exhausted or failed)
    pub async fn next(&mut self) -> Option<VideoFrame> {
        self.receiver.recv().await
    }

    /// Ask the capture thread to stop after its current frame
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CameraError;

    struct CountingSource {
        remaining: u32,
        fail_at_end: bool,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            if self.remaining == 0 {
                return if self.fail_at_end {
                    Err(CameraError::Decode {
                        path: "frame_0011.png".into(),
                        reason: "truncated".into(),
                    })
                } else {
                    Ok(None)
                };
            }
            self.remaining -= 1;
            let seq = 10 - self.remaining;
            Ok(Some(VideoFrame::new(vec![0; 3], 1, 1, seq as u64 * 1_000_000, seq)))
        }
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let mut service = CaptureService::spawn(
            CountingSource { remaining: 10, fail_at_end: false },
            2,
        );

        let mut sequences = Vec::new();
        while let Some(frame) = service.next().await {
            sequences.push(frame.sequence);
        }
        assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_source_error_ends_stream() {
        let mut service = CaptureService::spawn(
            CountingSource { remaining: 2, fail_at_end: true },
            4,
        );

        assert!(service.next().await.is_some());
        assert!(service.next().await.is_some());
        assert!(service.next().await.is_none());
    }
}
