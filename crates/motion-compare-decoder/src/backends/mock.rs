use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::Configuration;
use crate::core::{
    DecoderError, DecoderResult, DynVideoSource, SeekFuture, VideoFrame, VideoMetadata,
    VideoSource,
};

const BACKEND_NAME: &str = "mock";
const DEFAULT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_FPS: f64 = 30.0;

/// Synthetic source producing gradient frames; no real video is read.
pub struct MockSource {
    width: u32,
    height: u32,
    stride: usize,
    duration: Option<Duration>,
    fps: f64,
    seeks: Arc<AtomicU64>,
}

impl MockSource {
    pub fn new(duration: Duration, fps: f64) -> Self {
        Self {
            width: 64,
            height: 36,
            stride: 64,
            duration: Some(duration),
            fps,
            seeks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A source that reports no duration.
    pub fn without_duration(fps: f64) -> Self {
        Self {
            duration: None,
            ..Self::new(Duration::ZERO, fps)
        }
    }

    /// Shared counter of completed seeks.
    pub fn seek_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.seeks)
    }

    fn render(&self, position: Duration) -> DecoderResult<VideoFrame> {
        let index = (position.as_secs_f64() * self.fps + 1e-6).floor() as u64;
        let mut buffer = vec![0u8; self.stride * self.height as usize];
        for (row, chunk) in buffer.chunks_mut(self.stride).enumerate() {
            let value = ((row as u64 + index) % 256) as u8;
            chunk.fill(value);
        }
        let frame = VideoFrame::from_owned(
            self.width,
            self.height,
            self.stride,
            Some(position),
            buffer,
        )?;
        Ok(frame.with_frame_index(Some(index)))
    }
}

impl VideoSource for MockSource {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: self.duration,
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: None,
        }
    }

    fn seek(&mut self, position: Duration) -> SeekFuture<'_> {
        Box::pin(async move {
            if let Some(duration) = self.duration {
                if position > duration {
                    return Err(DecoderError::SeekOutOfRange {
                        position,
                        duration: Some(duration),
                    });
                }
            }
            // Yield once so a seek behaves like real asynchronous I/O.
            tokio::task::yield_now().await;
            self.seeks.fetch_add(1, Ordering::SeqCst);
            self.render(position)
        })
    }
}

pub fn boxed_mock(config: &Configuration) -> DecoderResult<DynVideoSource> {
    let fps = config.source_fps.unwrap_or(DEFAULT_FPS);
    let duration = config.mock_duration.unwrap_or(DEFAULT_DURATION);
    Ok(Box::new(MockSource::new(duration, fps)))
}
