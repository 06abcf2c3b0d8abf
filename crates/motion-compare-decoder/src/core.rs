use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use motion_compare_types::{FrameError, VideoFrame};

pub type DecoderResult<T> = Result<T, DecoderError>;

/// Completes once the source has settled on the requested position and the
/// frame shown at that position is decoded.
pub type SeekFuture<'a> = Pin<Box<dyn Future<Output = DecoderResult<VideoFrame>> + Send + 'a>>;

pub type DynVideoSource = Box<dyn VideoSource>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

/// A video that can be positioned frame-accurately.
///
/// Seeks on one source never overlap: `seek` takes `&mut self`, so the next
/// seek can only be issued after the previous future resolved.
pub trait VideoSource: Send + 'static {
    fn backend(&self) -> &'static str;

    fn metadata(&self) -> VideoMetadata;

    fn seek(&mut self, position: Duration) -> SeekFuture<'_>;
}

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("seek to {position:?} is outside the video ({duration:?})")]
    SeekOutOfRange {
        position: Duration,
        duration: Option<Duration>,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecoderError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
