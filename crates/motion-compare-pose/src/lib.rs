mod backends;
mod engine;
mod error;
mod request;
mod runtime;

#[cfg(feature = "engine-replay")]
pub use backends::replay::{PoseRecording, RecordedFrame, ReplayPoseEstimator};
pub use engine::{NoopPoseEstimator, PoseEstimator};
pub use error::PoseError;
pub use motion_compare_types::{LandmarkSchema, RawLandmark, RawPose};
pub use request::PoseRequest;
pub use runtime::{PoseBackend, PoseConfig, PoseRuntime};
