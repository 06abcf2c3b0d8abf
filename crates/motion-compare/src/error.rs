use std::fmt;
use std::time::Duration;

use motion_compare_decoder::DecoderError;
use motion_compare_pose::PoseError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::ConfigError;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Which side of the comparison an error or measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialLabel {
    A,
    B,
}

impl fmt::Display for TrialLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialLabel::A => f.write_str("trial A"),
            TrialLabel::B => f.write_str("trial B"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("input error: {message}")]
    Input { message: String },

    /// Recoverable: the frame becomes a gap and a quality warning.
    #[error(
        "pose model timed out on frame {frame_index} ({timestamp_ms:.1} ms) after {timeout:?}"
    )]
    ModelTimeout {
        frame_index: usize,
        timestamp_ms: f64,
        timeout: Duration,
    },

    #[error(
        "unknown landmark schema on frame {frame_index} ({timestamp_ms:.1} ms): expected {expected} landmarks, model returned {actual}"
    )]
    UnknownLandmarkSchema {
        expected: usize,
        actual: usize,
        frame_index: usize,
        timestamp_ms: f64,
    },

    #[error("synchronization failed for {trial}: {reason}")]
    SynchronizationFailure { trial: TrialLabel, reason: String },

    #[error("comparison cancelled")]
    CancellationRequested,

    #[error("comparison exceeded its processing budget of {budget:?}")]
    PipelineTimeout { budget: Duration },

    #[error("seek to frame {frame_index} ({timestamp_ms:.1} ms) failed: {source}")]
    Seek {
        frame_index: usize,
        timestamp_ms: f64,
        source: DecoderError,
    },

    #[error("pose detection on frame {frame_index} ({timestamp_ms:.1} ms) failed: {source}")]
    Detection {
        frame_index: usize,
        timestamp_ms: f64,
        source: PoseError,
    },

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to encode comparison result: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(String),
}

impl AnalysisError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    pub fn sync_failure(trial: TrialLabel, reason: impl Into<String>) -> Self {
        Self::SynchronizationFailure {
            trial,
            reason: reason.into(),
        }
    }

    /// Frame-level errors the pipeline absorbs instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AnalysisError::ModelTimeout { .. })
    }
}
