use motion_compare_types::{Joint, LandmarkPoint, LandmarkSchema, PoseLandmarks, RawLandmark, RawPose};

use crate::error::{AnalysisError, AnalysisResult};

/// Maps raw, index-addressed model output onto the [`Joint`] vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct LandmarkNormalizer {
    schema: LandmarkSchema,
}

impl LandmarkNormalizer {
    pub fn new(schema: LandmarkSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> LandmarkSchema {
        self.schema
    }

    /// Fails with [`AnalysisError::UnknownLandmarkSchema`] when the model
    /// returned a different number of points than its schema declares.
    pub fn normalize(
        &self,
        raw: &RawPose,
        frame_index: usize,
        timestamp_ms: f64,
    ) -> AnalysisResult<PoseLandmarks> {
        let landmarks = self.map_points(&raw.landmarks, frame_index, timestamp_ms)?;
        let world_landmarks = match raw.world_landmarks.as_deref() {
            Some(world) => Some(self.map_points(world, frame_index, timestamp_ms)?),
            None => None,
        };
        PoseLandmarks::from_ordered(landmarks, world_landmarks).ok_or(
            AnalysisError::UnknownLandmarkSchema {
                expected: self.schema.arity(),
                actual: raw.landmarks.len(),
                frame_index,
                timestamp_ms,
            },
        )
    }

    fn map_points(
        &self,
        raw: &[RawLandmark],
        frame_index: usize,
        timestamp_ms: f64,
    ) -> AnalysisResult<Vec<LandmarkPoint>> {
        if raw.len() != self.schema.arity() {
            return Err(AnalysisError::UnknownLandmarkSchema {
                expected: self.schema.arity(),
                actual: raw.len(),
                frame_index,
                timestamp_ms,
            });
        }
        Ok(Joint::ALL
            .iter()
            .map(|joint| {
                let point = raw[self.schema.raw_index(*joint)];
                LandmarkPoint {
                    x: point.x,
                    y: point.y,
                    z: point.z,
                    visibility: if point.visibility.is_nan() {
                        0.0
                    } else {
                        point.visibility.clamp(0.0, 1.0)
                    },
                    name: *joint,
                }
            })
            .collect())
    }
}
