use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use motion_compare_types::{Joint, LandmarkPoint, PoseLandmarks};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    Gait,
    Squat,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Gait => "gait",
            TestType::Squat => "squat",
        }
    }
}

impl FromStr for TestType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gait" => Ok(TestType::Gait),
            "squat" => Ok(TestType::Squat),
            other => Err(AnalysisError::input(format!("unknown test type '{other}'"))),
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera placement relative to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    Frontal,
    Sagittal,
    Other,
}

impl FromStr for View {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frontal" | "front" => Ok(View::Frontal),
            "sagittal" | "side" => Ok(View::Sagittal),
            "other" => Ok(View::Other),
            other => Err(AnalysisError::input(format!("unknown camera view '{other}'"))),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Frontal => f.write_str("frontal"),
            View::Sagittal => f.write_str("sagittal"),
            View::Other => f.write_str("other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub view: View,
    pub fps: f64,
}

/// One sampled instant of a trial. `landmarks` is `None` for a detection gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub index: usize,
    pub timestamp_ms: f64,
    pub landmarks: Option<PoseLandmarks>,
}

impl Frame {
    pub fn detected(&self) -> bool {
        self.landmarks.is_some()
    }

    /// Landmark of `joint` if the frame has a pose and the point is visible
    /// enough to measure with.
    pub fn joint(&self, joint: Joint, min_visibility: f64) -> Option<&LandmarkPoint> {
        self.landmarks
            .as_ref()
            .map(|pose| pose.get(joint))
            .filter(|point| point.is_visible(min_visibility))
    }
}

/// Immutable, timestamp-ordered frames extracted from one video. Only
/// [`TrialSeries::new`] builds one, so the ordering checks always hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialSeries {
    frames: Vec<Frame>,
    source_asset_id: String,
    captured_at: Option<DateTime<Utc>>,
    protocol: Protocol,
}

impl TrialSeries {
    pub fn new(
        frames: Vec<Frame>,
        source_asset_id: impl Into<String>,
        captured_at: Option<DateTime<Utc>>,
        protocol: Protocol,
    ) -> AnalysisResult<Self> {
        for pair in frames.windows(2) {
            if pair[1].timestamp_ms <= pair[0].timestamp_ms {
                return Err(AnalysisError::input(format!(
                    "frame timestamps must be strictly increasing (frame {} at {:.3} ms follows {:.3} ms)",
                    pair[1].index, pair[1].timestamp_ms, pair[0].timestamp_ms
                )));
            }
        }
        for (position, frame) in frames.iter().enumerate() {
            if frame.index != position {
                return Err(AnalysisError::input(format!(
                    "frame at position {position} carries index {}",
                    frame.index
                )));
            }
        }
        Ok(Self {
            frames,
            source_asset_id: source_asset_id.into(),
            captured_at,
            protocol,
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn detected_count(&self) -> usize {
        self.frames.iter().filter(|frame| frame.detected()).count()
    }

    pub fn source_asset_id(&self) -> &str {
        &self.source_asset_id
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.protocol.fps
    }

    /// Derives one numeric value per frame; `None` marks frames where the
    /// value cannot be measured.
    pub fn signal<F>(&self, mut extract: F) -> Vec<Option<f64>>
    where
        F: FnMut(&Frame) -> Option<f64>,
    {
        self.frames.iter().map(|frame| extract(frame)).collect()
    }

    pub fn mean_visibility(&self) -> Option<f64> {
        let visibilities: Vec<f64> = self
            .frames
            .iter()
            .filter_map(|frame| frame.landmarks.as_ref())
            .map(PoseLandmarks::mean_visibility)
            .collect();
        if visibilities.is_empty() {
            None
        } else {
            Some(visibilities.iter().sum::<f64>() / visibilities.len() as f64)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn pose_from(mut place: impl FnMut(Joint) -> (f64, f64)) -> PoseLandmarks {
        let points = Joint::ALL
            .iter()
            .map(|joint| {
                let (x, y) = place(*joint);
                LandmarkPoint {
                    x,
                    y,
                    z: 0.0,
                    visibility: 0.9,
                    name: *joint,
                }
            })
            .collect();
        PoseLandmarks::from_ordered(points, None).expect("ordered fixture")
    }

    pub fn series_from(
        fps: f64,
        count: usize,
        view: View,
        mut pose_at: impl FnMut(f64) -> Option<PoseLandmarks>,
    ) -> TrialSeries {
        let frames = (0..count)
            .map(|index| {
                let timestamp_ms = index as f64 * 1000.0 / fps;
                Frame {
                    index,
                    timestamp_ms,
                    landmarks: pose_at(timestamp_ms),
                }
            })
            .collect();
        TrialSeries::new(frames, "asset", None, Protocol { view, fps }).expect("valid series")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{pose_from, series_from};
    use super::*;

    #[test]
    fn rejects_non_increasing_timestamps() {
        let frames = vec![
            Frame {
                index: 0,
                timestamp_ms: 0.0,
                landmarks: None,
            },
            Frame {
                index: 1,
                timestamp_ms: 0.0,
                landmarks: None,
            },
        ];
        let protocol = Protocol {
            view: View::Sagittal,
            fps: 30.0,
        };
        let err = TrialSeries::new(frames, "asset", None, protocol).unwrap_err();
        assert!(matches!(err, AnalysisError::Input { .. }));
    }

    #[test]
    fn counts_detected_frames_and_gaps() {
        let series = series_from(30.0, 10, View::Sagittal, |t| {
            (t < 150.0).then(|| pose_from(|_| (0.5, 0.5)))
        });
        assert_eq!(series.len(), 10);
        assert_eq!(series.detected_count(), 5);
        assert!(series.detected_count() <= series.len());
    }

    #[test]
    fn low_visibility_joints_are_not_measurable() {
        let mut pose = pose_from(|_| (0.5, 0.5));
        let mut points = pose.landmarks().to_vec();
        points[Joint::LeftKnee.index()].visibility = 0.1;
        pose = PoseLandmarks::from_ordered(points, None).unwrap();
        let frame = Frame {
            index: 0,
            timestamp_ms: 0.0,
            landmarks: Some(pose),
        };
        assert!(frame.joint(Joint::LeftKnee, 0.5).is_none());
        assert!(frame.joint(Joint::RightKnee, 0.5).is_some());
    }

    #[test]
    fn view_parses_aliases() {
        assert_eq!("side".parse::<View>().unwrap(), View::Sagittal);
        assert!("top".parse::<View>().is_err());
    }
}
