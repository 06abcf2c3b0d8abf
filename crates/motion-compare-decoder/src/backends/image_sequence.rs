use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Configuration;
use crate::core::{
    DecoderError, DecoderResult, DynVideoSource, SeekFuture, VideoFrame, VideoMetadata,
    VideoSource,
};

const BACKEND_NAME: &str = "image-sequence";
const DEFAULT_FPS: f64 = 30.0;
const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Directory of pre-extracted frames (`000001.png`, `000002.png`, ...)
/// played back at a fixed frame rate.
pub struct ImageSequenceSource {
    frames: Arc<Vec<PathBuf>>,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> DecoderResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(DecoderError::configuration(format!(
                "image sequence frame rate must be positive, got {fps}"
            )));
        }
        let mut frames = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if supported {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(DecoderError::backend_failure(
                BACKEND_NAME,
                format!("no frames found in {}", dir.display()),
            ));
        }
        frames.sort();
        tracing::debug!(
            frames = frames.len(),
            fps,
            dir = %dir.display(),
            "opened image sequence"
        );
        Ok(Self {
            frames: Arc::new(frames),
            fps,
        })
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames.len() as f64 / self.fps)
    }
}

impl VideoSource for ImageSequenceSource {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: Some(self.duration()),
            fps: Some(self.fps),
            width: None,
            height: None,
            total_frames: Some(self.frames.len() as u64),
        }
    }

    fn seek(&mut self, position: Duration) -> SeekFuture<'_> {
        let frames = Arc::clone(&self.frames);
        let fps = self.fps;
        let duration = self.duration();
        Box::pin(async move {
            let index = (position.as_secs_f64() * fps + 1e-6).floor() as usize;
            if index >= frames.len() {
                return Err(DecoderError::SeekOutOfRange {
                    position,
                    duration: Some(duration),
                });
            }
            let path = frames[index].clone();
            let frame = tokio::task::spawn_blocking(move || load_luma(&path))
                .await
                .map_err(|err| DecoderError::backend_failure(BACKEND_NAME, err.to_string()))??;
            let frame = VideoFrame::from_owned(
                frame.0,
                frame.1,
                frame.0 as usize,
                Some(position),
                frame.2,
            )?;
            Ok(frame.with_frame_index(Some(index as u64)))
        })
    }
}

fn load_luma(path: &Path) -> DecoderResult<(u32, u32, Vec<u8>)> {
    let image = image::open(path).map_err(|err| {
        DecoderError::backend_failure(
            BACKEND_NAME,
            format!("failed to read {}: {err}", path.display()),
        )
    })?;
    let luma = image.to_luma8();
    let (width, height) = luma.dimensions();
    Ok((width, height, luma.into_raw()))
}

pub fn boxed_image_sequence(config: &Configuration) -> DecoderResult<DynVideoSource> {
    let dir = config.input.as_ref().ok_or_else(|| {
        DecoderError::configuration("image-sequence backend requires an input directory")
    })?;
    let fps = config.source_fps.unwrap_or(DEFAULT_FPS);
    Ok(Box::new(ImageSequenceSource::open(dir, fps)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frames(dir: &Path, count: usize) {
        for index in 0..count {
            let image = image::GrayImage::from_pixel(8, 4, image::Luma([index as u8 * 10]));
            image
                .save(dir.join(format!("{:06}.png", index + 1)))
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn image_sequence_reports_duration_from_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 6);
        let source = ImageSequenceSource::open(dir.path(), 30.0).unwrap();
        let metadata = source.metadata();
        assert_eq!(metadata.total_frames, Some(6));
        assert_eq!(metadata.duration, Some(Duration::from_secs_f64(0.2)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn image_sequence_seek_loads_matching_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 6);
        let mut source = ImageSequenceSource::open(dir.path(), 30.0).unwrap();
        let frame = source.seek(Duration::from_secs_f64(2.0 / 30.0)).await.unwrap();
        assert_eq!(frame.frame_index(), Some(2));
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.data()[0], 20);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::open(dir.path(), 30.0).is_err());
    }
}
