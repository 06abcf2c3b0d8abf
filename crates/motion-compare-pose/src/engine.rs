use motion_compare_types::{LandmarkSchema, RawPose};

use crate::error::PoseError;
use crate::request::PoseRequest;

/// Common interface for all pose-estimation models.
///
/// Single-subject: a call yields at most one pose. `Ok(None)` means the model
/// ran and found nobody in the frame.
pub trait PoseEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Index layout of the landmarks this model emits.
    fn schema(&self) -> LandmarkSchema;

    fn warm_up(&self) -> Result<(), PoseError> {
        Ok(())
    }

    fn detect(&self, request: &PoseRequest<'_>) -> Result<Option<RawPose>, PoseError>;
}

/// Model that never detects anyone; useful for dry runs of the pipeline.
#[derive(Debug, Default)]
pub struct NoopPoseEstimator;

impl PoseEstimator for NoopPoseEstimator {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn schema(&self) -> LandmarkSchema {
        LandmarkSchema::BlazePose33
    }

    fn detect(&self, _: &PoseRequest<'_>) -> Result<Option<RawPose>, PoseError> {
        Ok(None)
    }
}
