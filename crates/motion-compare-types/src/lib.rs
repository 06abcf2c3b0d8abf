//! Shared domain models for the motion-compare workspace.
//!
//! This crate centralizes the lightweight data structures exchanged between
//! the decoder, pose, and analysis crates: decoded frames, the raw output of a
//! pose model, and the unified joint vocabulary every downstream computation
//! is written against. Keep it backend-agnostic so every crate can depend on it
//! without pulling a model runtime or a video SDK.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type FrameResult<T> = Result<T, FrameError>;

/// Single decoded luma plane handed to the pose model.
#[derive(Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl VideoFrame {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        let required = stride
            .checked_mul(height as usize)
            .ok_or_else(|| FrameError::InvalidFrame {
                reason: "calculated plane length overflowed".into(),
            })?;
        if data.len() < required {
            return Err(FrameError::InvalidFrame {
                reason: format!(
                    "insufficient plane bytes: got {} expected at least {}",
                    data.len(),
                    required
                ),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            timestamp,
            data: Arc::from(data.into_boxed_slice()),
            frame_index: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },
}

/// Unified joint vocabulary shared by every pose schema.
///
/// The declaration order is the storage order of [`PoseLandmarks`]; it must
/// never change between releases because persisted series rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const COUNT: usize = 17;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEye => "left_eye",
            Joint::RightEye => "right_eye",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named landmark in image-normalized coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
    pub name: Joint,
}

impl LandmarkPoint {
    pub fn is_visible(&self, min_visibility: f64) -> bool {
        self.visibility >= min_visibility && self.x.is_finite() && self.y.is_finite()
    }
}

/// One detected pose expressed in the unified vocabulary.
///
/// `landmarks` always holds exactly [`Joint::COUNT`] points in [`Joint`]
/// order; deserialization goes through the same check as
/// [`PoseLandmarks::from_ordered`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedPose")]
pub struct PoseLandmarks {
    landmarks: Vec<LandmarkPoint>,
    world_landmarks: Option<Vec<LandmarkPoint>>,
}

#[derive(Deserialize)]
struct UncheckedPose {
    landmarks: Vec<LandmarkPoint>,
    world_landmarks: Option<Vec<LandmarkPoint>>,
}

impl TryFrom<UncheckedPose> for PoseLandmarks {
    type Error = String;

    fn try_from(pose: UncheckedPose) -> Result<Self, Self::Error> {
        PoseLandmarks::from_ordered(pose.landmarks, pose.world_landmarks)
            .ok_or_else(|| format!("a pose must list all {} joints in order", Joint::COUNT))
    }
}

impl PoseLandmarks {
    pub fn from_ordered(
        landmarks: Vec<LandmarkPoint>,
        world_landmarks: Option<Vec<LandmarkPoint>>,
    ) -> Option<Self> {
        let ordered = |points: &[LandmarkPoint]| {
            points.len() == Joint::COUNT
                && points
                    .iter()
                    .zip(Joint::ALL.iter())
                    .all(|(point, joint)| point.name == *joint)
        };
        if !ordered(&landmarks) {
            return None;
        }
        if let Some(world) = world_landmarks.as_ref() {
            if !ordered(world) {
                return None;
            }
        }
        Some(Self {
            landmarks,
            world_landmarks,
        })
    }

    pub fn get(&self, joint: Joint) -> &LandmarkPoint {
        &self.landmarks[joint.index()]
    }

    pub fn landmarks(&self) -> &[LandmarkPoint] {
        &self.landmarks
    }

    pub fn world_landmarks(&self) -> Option<&[LandmarkPoint]> {
        self.world_landmarks.as_deref()
    }

    pub fn mean_visibility(&self) -> f64 {
        let total: f64 = self.landmarks.iter().map(|point| point.visibility).sum();
        total / self.landmarks.len() as f64
    }
}

/// A landmark exactly as reported by a pose model, addressed by raw index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "default_visibility")]
    pub visibility: f64,
}

fn default_visibility() -> f64 {
    1.0
}

impl RawLandmark {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPose {
    pub landmarks: Vec<RawLandmark>,
    #[serde(default)]
    pub world_landmarks: Option<Vec<RawLandmark>>,
}

impl RawPose {
    pub fn new(landmarks: Vec<RawLandmark>) -> Self {
        Self {
            landmarks,
            world_landmarks: None,
        }
    }

    pub fn with_world_landmarks(mut self, world: Vec<RawLandmark>) -> Self {
        self.world_landmarks = Some(world);
        self
    }
}

/// Index layout of a pose model's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkSchema {
    /// 33-point BlazePose topology.
    BlazePose33,
    /// 17-point COCO keypoint topology.
    Coco17,
}

impl LandmarkSchema {
    pub fn arity(&self) -> usize {
        match self {
            LandmarkSchema::BlazePose33 => 33,
            LandmarkSchema::Coco17 => 17,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkSchema::BlazePose33 => "blazepose33",
            LandmarkSchema::Coco17 => "coco17",
        }
    }

    /// Raw model index carrying `joint` in this schema.
    pub fn raw_index(&self, joint: Joint) -> usize {
        match self {
            LandmarkSchema::Coco17 => joint.index(),
            LandmarkSchema::BlazePose33 => match joint {
                Joint::Nose => 0,
                Joint::LeftEye => 2,
                Joint::RightEye => 5,
                Joint::LeftEar => 7,
                Joint::RightEar => 8,
                Joint::LeftShoulder => 11,
                Joint::RightShoulder => 12,
                Joint::LeftElbow => 13,
                Joint::RightElbow => 14,
                Joint::LeftWrist => 15,
                Joint::RightWrist => 16,
                Joint::LeftHip => 23,
                Joint::RightHip => 24,
                Joint::LeftKnee => 25,
                Joint::RightKnee => 26,
                Joint::LeftAnkle => 27,
                Joint::RightAnkle => 28,
            },
        }
    }
}

impl fmt::Display for LandmarkSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_order_matches_index() {
        for (position, joint) in Joint::ALL.iter().enumerate() {
            assert_eq!(joint.index(), position);
        }
    }

    #[test]
    fn blazepose_indices_are_unique_and_in_range() {
        let schema = LandmarkSchema::BlazePose33;
        let mut seen = Vec::new();
        for joint in Joint::ALL {
            let index = schema.raw_index(joint);
            assert!(index < schema.arity());
            assert!(!seen.contains(&index), "duplicate index {index}");
            seen.push(index);
        }
    }

    #[test]
    fn pose_landmarks_reject_unordered_points() {
        let mut points: Vec<LandmarkPoint> = Joint::ALL
            .iter()
            .map(|joint| LandmarkPoint {
                x: 0.5,
                y: 0.5,
                z: 0.0,
                visibility: 1.0,
                name: *joint,
            })
            .collect();
        assert!(PoseLandmarks::from_ordered(points.clone(), None).is_some());
        points.swap(0, 1);
        assert!(PoseLandmarks::from_ordered(points, None).is_none());
    }

    #[test]
    fn deserialized_pose_must_list_every_joint() {
        let points: Vec<LandmarkPoint> = Joint::ALL
            .iter()
            .map(|joint| LandmarkPoint {
                x: 0.4,
                y: 0.6,
                z: 0.0,
                visibility: 0.9,
                name: *joint,
            })
            .collect();
        let pose = PoseLandmarks::from_ordered(points, None).unwrap();
        let json = serde_json::to_value(&pose).unwrap();
        let decoded: PoseLandmarks = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(decoded, pose);

        let mut short = json;
        short["landmarks"].as_array_mut().unwrap().pop();
        let err = serde_json::from_value::<PoseLandmarks>(short).unwrap_err();
        assert!(err.to_string().contains("all 17 joints"), "{err}");
    }

    #[test]
    fn joint_serializes_as_snake_case() {
        let json = serde_json::to_string(&Joint::LeftKnee).unwrap();
        assert_eq!(json, "\"left_knee\"");
    }

    #[test]
    fn frame_rejects_short_plane() {
        let err = VideoFrame::from_owned(4, 4, 4, None, vec![0; 8]).unwrap_err();
        assert!(err.to_string().contains("insufficient plane bytes"));
    }
}
