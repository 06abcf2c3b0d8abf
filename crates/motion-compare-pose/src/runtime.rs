use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

#[cfg(feature = "engine-replay")]
use crate::backends::replay::{PoseRecording, ReplayPoseEstimator};
use crate::engine::{NoopPoseEstimator, PoseEstimator};
use crate::error::PoseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseBackend {
    Noop,
    Replay,
}

impl FromStr for PoseBackend {
    type Err = PoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noop" => Ok(PoseBackend::Noop),
            "replay" => Ok(PoseBackend::Replay),
            other => Err(PoseError::backend(format!("unknown pose backend '{other}'"))),
        }
    }
}

impl PoseBackend {
    /// Backends compiled into this build.
    pub fn available() -> Vec<PoseBackend> {
        let mut backends = vec![PoseBackend::Noop];
        #[cfg(feature = "engine-replay")]
        {
            backends.push(PoseBackend::Replay);
        }
        backends
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoseBackend::Noop => "noop",
            PoseBackend::Replay => "replay",
        }
    }
}

impl fmt::Display for PoseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PoseConfig {
    pub backend: PoseBackend,
    pub model: Option<PathBuf>,
    pub match_tolerance_ms: Option<f64>,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            backend: PoseBackend::Noop,
            model: None,
            match_tolerance_ms: None,
        }
    }
}

/// Loaded model artifacts keyed by path, so one runtime never loads the same
/// model twice.
#[derive(Default)]
struct ModelRegistry {
    #[cfg(feature = "engine-replay")]
    recordings: Mutex<HashMap<PathBuf, Arc<PoseRecording>>>,
}

impl ModelRegistry {
    #[cfg(feature = "engine-replay")]
    fn recording(&self, path: &Path) -> Result<Arc<PoseRecording>, PoseError> {
        let mut guard = self
            .recordings
            .lock()
            .map_err(|_| PoseError::backend("pose model registry poisoned"))?;
        if let Some(handle) = guard.get(path) {
            return Ok(Arc::clone(handle));
        }
        let recording = Arc::new(PoseRecording::load(path)?);
        tracing::info!(
            path = %path.display(),
            frames = recording.frames.len(),
            schema = %recording.schema,
            "loaded pose recording"
        );
        guard.insert(path.to_path_buf(), Arc::clone(&recording));
        Ok(recording)
    }

    fn len(&self) -> usize {
        #[cfg(feature = "engine-replay")]
        {
            return self.recordings.lock().map(|guard| guard.len()).unwrap_or(0);
        }
        #[cfg(not(feature = "engine-replay"))]
        {
            return 0;
        }
    }

    fn clear(&self) {
        #[cfg(feature = "engine-replay")]
        {
            if let Ok(mut guard) = self.recordings.lock() {
                guard.clear();
            }
        }
    }
}

/// Process-wide owner of the pose model.
///
/// Created once at startup with [`PoseRuntime::init`], shared with the
/// pipeline through [`PoseRuntime::estimator`], and released with
/// [`PoseRuntime::shutdown`] (or on drop). Estimator handles already handed
/// out stay valid until their last clone is dropped; new requests after
/// shutdown fail with [`PoseError::RuntimeClosed`].
pub struct PoseRuntime {
    registry: ModelRegistry,
    estimator: Option<Arc<dyn PoseEstimator>>,
}

impl PoseRuntime {
    pub fn init(config: &PoseConfig) -> Result<Self, PoseError> {
        let registry = ModelRegistry::default();
        let estimator = build_estimator(&registry, config)?;
        estimator.warm_up()?;
        tracing::info!(
            backend = estimator.name(),
            schema = %estimator.schema(),
            "pose runtime initialized"
        );
        Ok(Self {
            registry,
            estimator: Some(estimator),
        })
    }

    pub fn estimator(&self) -> Result<Arc<dyn PoseEstimator>, PoseError> {
        self.estimator.clone().ok_or(PoseError::RuntimeClosed)
    }

    pub fn loaded_models(&self) -> usize {
        self.registry.len()
    }

    pub fn shutdown(&mut self) {
        if let Some(estimator) = self.estimator.take() {
            tracing::info!(backend = estimator.name(), "pose runtime shut down");
        }
        self.registry.clear();
    }
}

impl Drop for PoseRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_estimator(
    registry: &ModelRegistry,
    config: &PoseConfig,
) -> Result<Arc<dyn PoseEstimator>, PoseError> {
    match config.backend {
        PoseBackend::Noop => Ok(Arc::new(NoopPoseEstimator)),
        PoseBackend::Replay => build_replay(registry, config),
    }
}

#[cfg(feature = "engine-replay")]
fn build_replay(
    registry: &ModelRegistry,
    config: &PoseConfig,
) -> Result<Arc<dyn PoseEstimator>, PoseError> {
    let path = config
        .model
        .as_ref()
        .ok_or_else(|| PoseError::backend("replay backend requires a model path"))?;
    let recording = registry.recording(path)?;
    let mut estimator = ReplayPoseEstimator::new(recording);
    if let Some(tolerance) = config.match_tolerance_ms {
        estimator = estimator.with_tolerance_ms(tolerance);
    }
    Ok(Arc::new(estimator))
}

#[cfg(not(feature = "engine-replay"))]
fn build_replay(
    _registry: &ModelRegistry,
    _config: &PoseConfig,
) -> Result<Arc<dyn PoseEstimator>, PoseError> {
    Err(PoseError::backend(
        "replay backend is not available in this build",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LandmarkSchema;

    #[test]
    fn noop_runtime_lifecycle() {
        let mut runtime = PoseRuntime::init(&PoseConfig::default()).unwrap();
        assert_eq!(runtime.loaded_models(), 0);
        let estimator = runtime.estimator().unwrap();
        assert_eq!(estimator.name(), "noop");
        runtime.shutdown();
        assert!(matches!(runtime.estimator(), Err(PoseError::RuntimeClosed)));
        // handles obtained before shutdown keep working
        assert_eq!(estimator.schema(), LandmarkSchema::BlazePose33);
    }

    #[cfg(feature = "engine-replay")]
    #[test]
    fn replay_runtime_loads_model_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        let recording = PoseRecording {
            schema: LandmarkSchema::Coco17,
            frames: vec![crate::RecordedFrame {
                timestamp_ms: 0.0,
                landmarks: Some(vec![crate::RawLandmark::new(0.1, 0.2, 0.0, 1.0); 17]),
                world_landmarks: None,
            }],
        };
        std::fs::write(&path, serde_json::to_string(&recording).unwrap()).unwrap();

        let config = PoseConfig {
            backend: PoseBackend::Replay,
            model: Some(path.clone()),
            match_tolerance_ms: None,
        };
        let mut runtime = PoseRuntime::init(&config).unwrap();
        assert_eq!(runtime.loaded_models(), 1);
        assert_eq!(runtime.estimator().unwrap().schema(), LandmarkSchema::Coco17);
        runtime.shutdown();
        assert_eq!(runtime.loaded_models(), 0);
    }

    #[test]
    fn replay_without_model_path_fails() {
        let config = PoseConfig {
            backend: PoseBackend::Replay,
            model: None,
            match_tolerance_ms: None,
        };
        assert!(PoseRuntime::init(&config).is_err());
    }
}
