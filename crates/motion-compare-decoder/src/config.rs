use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::{DecoderError, DecoderResult, DynVideoSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    ImageSequence,
}

impl FromStr for Backend {
    type Err = DecoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "image-sequence" | "images" => Ok(Backend::ImageSequence),
            other => Err(DecoderError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::ImageSequence => "image-sequence",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compiled_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-image-sequence")]
    {
        backends.push(Backend::ImageSequence);
    }
    backends.push(Backend::Mock);
    backends
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    /// Playback rate for sources that carry no timing of their own.
    pub source_fps: Option<f64>,
    pub mock_duration: Option<Duration>,
}

impl Default for Configuration {
    fn default() -> Self {
        let backend = compiled_backends()
            .into_iter()
            .next()
            .unwrap_or(Backend::Mock);
        Self {
            backend,
            input: None,
            source_fps: None,
            mock_duration: None,
        }
    }
}

impl Configuration {
    pub fn from_env() -> DecoderResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var("MOTIONCMP_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(fps) = env::var("MOTIONCMP_SOURCE_FPS") {
            let parsed: f64 = fps.parse().map_err(|_| {
                DecoderError::configuration(format!(
                    "failed to parse MOTIONCMP_SOURCE_FPS='{fps}' as a number"
                ))
            })?;
            if !parsed.is_finite() || parsed <= 0.0 {
                return Err(DecoderError::configuration(
                    "MOTIONCMP_SOURCE_FPS must be greater than zero",
                ));
            }
            config.source_fps = Some(parsed);
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    pub fn with_input(mut self, input: PathBuf) -> Self {
        self.input = Some(input);
        self
    }

    pub fn create_source(&self) -> DecoderResult<DynVideoSource> {
        match self.backend {
            Backend::Mock => crate::backends::mock::boxed_mock(self),
            Backend::ImageSequence => {
                #[cfg(feature = "backend-image-sequence")]
                {
                    return crate::backends::image_sequence::boxed_image_sequence(self);
                }
                #[cfg(not(feature = "backend-image-sequence"))]
                {
                    return Err(DecoderError::unsupported("image-sequence"));
                }
            }
        }
    }
}
