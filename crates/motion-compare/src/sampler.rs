use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use futures_util::stream::unfold;
use motion_compare_decoder::{VideoFrame, VideoMetadata, VideoSource};

use crate::error::{AnalysisError, AnalysisResult};

pub const DEFAULT_SAMPLE_FPS: f64 = 30.0;
const EPSILON_SECS: f64 = 1e-6;

pub type SampleStream<'a> = Pin<Box<dyn Stream<Item = AnalysisResult<SampledFrame>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub index: usize,
    pub timestamp: Duration,
}

impl SamplePoint {
    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp.as_secs_f64() * 1000.0
    }
}

/// Timestamps `k / fps` for every `k` whose timestamp starts inside the video.
///
/// Pure and cloneable, so a schedule can be replayed from the start at any
/// time and always yields the same points.
#[derive(Debug, Clone)]
pub struct SampleSchedule {
    fps: f64,
    total: usize,
    next: usize,
}

impl SampleSchedule {
    pub fn new(duration: Option<Duration>, fps: f64) -> AnalysisResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AnalysisError::input(format!(
                "sampling rate must be positive, got {fps}"
            )));
        }
        let seconds = duration.map(|d| d.as_secs_f64()).ok_or_else(|| {
            AnalysisError::input("video duration is unknown; metadata not loaded")
        })?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(AnalysisError::input(format!(
                "video duration must be positive, got {seconds} s"
            )));
        }

        let limit = seconds - EPSILON_SECS;
        let mut total = (limit * fps).floor().max(0.0) as usize;
        while (total as f64) / fps < limit {
            total += 1;
        }
        while total > 0 && ((total - 1) as f64) / fps >= limit {
            total -= 1;
        }

        Ok(Self {
            fps,
            total,
            next: 0,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Number of points in the full schedule, independent of progress.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for SampleSchedule {
    type Item = SamplePoint;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(SamplePoint {
            index,
            timestamp: Duration::from_secs_f64(index as f64 / self.fps),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SampleSchedule {}

pub struct SampledFrame {
    pub point: SamplePoint,
    pub frame: VideoFrame,
}

/// Frame-accurate sampler: seeks the source to each scheduled timestamp and
/// waits for the seek to settle instead of letting playback run freely.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    fps: f64,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self {
            fps: DEFAULT_SAMPLE_FPS,
        }
    }
}

impl FrameSampler {
    pub fn new(fps: f64) -> AnalysisResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AnalysisError::input(format!(
                "sampling rate must be positive, got {fps}"
            )));
        }
        Ok(Self { fps })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn schedule(&self, metadata: &VideoMetadata) -> AnalysisResult<SampleSchedule> {
        SampleSchedule::new(metadata.duration, self.fps)
    }

    /// Lazy stream of sampled frames.
    ///
    /// Nothing is sought until the stream is polled, and the seek for point
    /// `k + 1` is only issued once the consumer asks for it, so whatever the
    /// consumer does with frame `k` completes before the source moves on.
    pub fn frames<'a>(&self, source: &'a mut dyn VideoSource) -> AnalysisResult<SampleStream<'a>> {
        let schedule = self.schedule(&source.metadata())?;
        tracing::debug!(
            backend = source.backend(),
            samples = schedule.total(),
            fps = self.fps,
            "sampling video"
        );
        let stream = unfold((source, schedule), |(source, mut schedule)| async move {
            let point = schedule.next()?;
            let result = source
                .seek(point.timestamp)
                .await
                .map(|frame| SampledFrame { point, frame })
                .map_err(|source| AnalysisError::Seek {
                    frame_index: point.index,
                    timestamp_ms: point.timestamp_ms(),
                    source,
                });
            Some((result, (source, schedule)))
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use motion_compare_decoder::backends::mock::MockSource;

    #[test]
    fn schedule_counts_match_duration() {
        let twelve = SampleSchedule::new(Some(Duration::from_secs(12)), 30.0).unwrap();
        assert_eq!(twelve.total(), 360);
        let eleven = SampleSchedule::new(Some(Duration::from_secs(11)), 30.0).unwrap();
        assert_eq!(eleven.count(), 330);
    }

    #[test]
    fn partial_final_interval_is_sampled() {
        let schedule = SampleSchedule::new(Some(Duration::from_millis(1010)), 10.0).unwrap();
        let points: Vec<_> = schedule.collect();
        assert_eq!(points.len(), 11);
        assert_eq!(points.last().unwrap().timestamp, Duration::from_secs(1));
    }

    #[test]
    fn timestamps_are_evenly_spaced_and_increasing() {
        let schedule = SampleSchedule::new(Some(Duration::from_secs(3)), 30.0).unwrap();
        let stamps: Vec<f64> = schedule.map(|point| point.timestamp_ms()).collect();
        for pair in stamps.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!((pair[1] - pair[0] - 1000.0 / 30.0).abs() < 1e-6);
        }
    }

    #[test]
    fn unknown_or_invalid_duration_is_input_error() {
        assert!(matches!(
            SampleSchedule::new(None, 30.0),
            Err(AnalysisError::Input { .. })
        ));
        assert!(SampleSchedule::new(Some(Duration::ZERO), 30.0).is_err());
        assert!(SampleSchedule::new(Some(Duration::from_secs(1)), 0.0).is_err());
        assert!(FrameSampler::new(f64::NAN).is_err());
    }

    #[test]
    fn rebuilt_schedule_replays_the_same_points() {
        let sampler = FrameSampler::new(30.0).unwrap();
        let metadata = MockSource::new(Duration::from_secs(1), 30.0).metadata();
        let mut first = sampler.schedule(&metadata).unwrap();
        let head: Vec<_> = first.by_ref().take(5).collect();
        let again: Vec<_> = sampler.schedule(&metadata).unwrap().take(5).collect();
        assert_eq!(head, again);
        assert_eq!(first.len(), 25);
    }

    #[tokio::test]
    async fn stream_seeks_only_when_polled() {
        let mut source = MockSource::new(Duration::from_secs(1), 30.0);
        let seeks = source.seek_counter();
        let sampler = FrameSampler::new(30.0).unwrap();
        let mut frames = sampler.frames(&mut source).unwrap();
        assert_eq!(seeks.load(std::sync::atomic::Ordering::SeqCst), 0);

        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(first.point.index, 0);
        assert_eq!(first.frame.frame_index(), Some(0));
        assert_eq!(seeks.load(std::sync::atomic::Ordering::SeqCst), 1);

        let rest: Vec<_> = frames.collect().await;
        assert_eq!(rest.len(), 29);
        assert!(rest.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn stream_rejects_source_without_duration() {
        let mut source = MockSource::without_duration(30.0);
        let sampler = FrameSampler::default();
        assert!(matches!(
            sampler.frames(&mut source),
            Err(AnalysisError::Input { .. })
        ));
    }
}
