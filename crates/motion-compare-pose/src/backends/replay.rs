use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{LandmarkSchema, PoseError, PoseEstimator, PoseRequest, RawLandmark, RawPose};

const DEFAULT_TOLERANCE_MS: f64 = 20.0;

/// One recorded model invocation. `landmarks: null` records a frame in which
/// the model found nobody.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp_ms: f64,
    pub landmarks: Option<Vec<RawLandmark>>,
    #[serde(default)]
    pub world_landmarks: Option<Vec<RawLandmark>>,
}

/// Landmark dump previously produced by a pose model, sorted by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRecording {
    pub schema: LandmarkSchema,
    pub frames: Vec<RecordedFrame>,
}

impl PoseRecording {
    pub fn load(path: &Path) -> Result<Self, PoseError> {
        if !path.exists() {
            return Err(PoseError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = fs::read_to_string(path)?;
        let mut recording: PoseRecording =
            serde_json::from_str(&contents).map_err(|source| PoseError::ModelFormat {
                path: path.to_path_buf(),
                source,
            })?;
        recording
            .frames
            .sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));
        Ok(recording)
    }

    fn nearest(&self, timestamp_ms: f64) -> Option<&RecordedFrame> {
        let split = self
            .frames
            .partition_point(|frame| frame.timestamp_ms < timestamp_ms);
        let after = self.frames.get(split);
        let before = split.checked_sub(1).and_then(|index| self.frames.get(index));
        match (before, after) {
            (Some(b), Some(a)) => {
                if (timestamp_ms - b.timestamp_ms) <= (a.timestamp_ms - timestamp_ms) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }
}

/// Serves poses from a [`PoseRecording`] instead of running a network.
///
/// A request matches the recorded frame nearest to its timestamp when the two
/// are at most `tolerance_ms` apart; anything further is reported as no
/// detection.
#[derive(Debug, Clone)]
pub struct ReplayPoseEstimator {
    recording: Arc<PoseRecording>,
    tolerance_ms: f64,
}

impl ReplayPoseEstimator {
    pub fn new(recording: Arc<PoseRecording>) -> Self {
        Self {
            recording,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
        }
    }

    pub fn with_tolerance_ms(mut self, tolerance_ms: f64) -> Self {
        self.tolerance_ms = tolerance_ms.max(0.0);
        self
    }
}

impl PoseEstimator for ReplayPoseEstimator {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn schema(&self) -> LandmarkSchema {
        self.recording.schema
    }

    fn detect(&self, request: &PoseRequest<'_>) -> Result<Option<RawPose>, PoseError> {
        let timestamp_ms = request.timestamp_ms();
        let Some(frame) = self.recording.nearest(timestamp_ms) else {
            return Ok(None);
        };
        if (frame.timestamp_ms - timestamp_ms).abs() > self.tolerance_ms {
            return Ok(None);
        }
        Ok(frame.landmarks.as_ref().map(|landmarks| RawPose {
            landmarks: landmarks.clone(),
            world_landmarks: frame.world_landmarks.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_compare_types::VideoFrame;

    fn recording() -> PoseRecording {
        let point = RawLandmark::new(0.5, 0.5, 0.0, 0.9);
        PoseRecording {
            schema: LandmarkSchema::Coco17,
            frames: vec![
                RecordedFrame {
                    timestamp_ms: 0.0,
                    landmarks: Some(vec![point; 17]),
                    world_landmarks: None,
                },
                RecordedFrame {
                    timestamp_ms: 33.3,
                    landmarks: None,
                    world_landmarks: None,
                },
                RecordedFrame {
                    timestamp_ms: 66.7,
                    landmarks: Some(vec![point; 17]),
                    world_landmarks: None,
                },
            ],
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame::from_owned(2, 2, 2, None, vec![0; 4]).unwrap()
    }

    #[test]
    fn replay_returns_nearest_recorded_pose() {
        let estimator = ReplayPoseEstimator::new(Arc::new(recording()));
        let frame = frame();
        let pose = estimator
            .detect(&PoseRequest::new(&frame, 70.0))
            .unwrap()
            .unwrap();
        assert_eq!(pose.landmarks.len(), 17);
    }

    #[test]
    fn replay_reports_recorded_gap() {
        let estimator = ReplayPoseEstimator::new(Arc::new(recording()));
        let frame = frame();
        assert!(estimator.detect(&PoseRequest::new(&frame, 33.0)).unwrap().is_none());
    }

    #[test]
    fn replay_ignores_frames_outside_tolerance() {
        let estimator = ReplayPoseEstimator::new(Arc::new(recording())).with_tolerance_ms(5.0);
        let frame = frame();
        assert!(estimator.detect(&PoseRequest::new(&frame, 500.0)).unwrap().is_none());
    }

    #[test]
    fn recording_load_sorts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        let mut data = recording();
        data.frames.reverse();
        fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();
        let loaded = PoseRecording::load(&path).unwrap();
        let stamps: Vec<f64> = loaded.frames.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(stamps, vec![0.0, 33.3, 66.7]);
    }

    #[test]
    fn missing_recording_is_reported() {
        let err = PoseRecording::load(Path::new("/nonexistent/dump.json")).unwrap_err();
        assert!(matches!(err, PoseError::ModelNotFound { .. }));
    }
}
