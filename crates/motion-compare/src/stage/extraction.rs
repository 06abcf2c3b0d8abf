use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use motion_compare_decoder::VideoSource;
use motion_compare_pose::{PoseError, PoseEstimator, PoseRequest, RawPose};
use motion_compare_types::PoseLandmarks;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressBoard, TrialProgress};
use crate::error::{AnalysisError, AnalysisResult, TrialLabel};
use crate::landmarks::LandmarkNormalizer;
use crate::sampler::{FrameSampler, SampleStream, SampledFrame};
use crate::trial::{Frame, Protocol, TrialSeries, View};

pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

type DetectTask = JoinHandle<Result<Option<RawPose>, PoseError>>;

/// Counters gathered while a trial is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExtractionStats {
    pub sampled: usize,
    pub detected: usize,
    /// Frames dropped because the pose model exceeded its per-frame budget.
    pub timeouts: usize,
    /// Frame rate reported by the source container, if any.
    pub source_fps: Option<f64>,
}

/// Caller-supplied facts about a trial that the video itself doesn't carry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialDescriptor {
    pub asset_id: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub view: View,
}

/// Turns one video into a [`TrialSeries`].
///
/// Frames are processed strictly one at a time: seek, wait, detect, wait.
/// The estimator runs on the blocking pool under a per-frame timeout; a frame
/// that times out becomes a gap, any other model failure aborts the trial.
/// A timed-out call cannot be interrupted, so it is awaited before the next
/// seek and never overlaps another detection of the same trial.
pub struct TrialExtractor {
    label: TrialLabel,
    sampler: FrameSampler,
    estimator: Arc<dyn PoseEstimator>,
    normalizer: LandmarkNormalizer,
    frame_timeout: Duration,
    progress: Option<ProgressBoard>,
}

impl TrialExtractor {
    pub fn new(
        label: TrialLabel,
        sampler: FrameSampler,
        estimator: Arc<dyn PoseEstimator>,
        frame_timeout: Duration,
    ) -> Self {
        let normalizer = LandmarkNormalizer::new(estimator.schema());
        Self {
            label,
            sampler,
            estimator,
            normalizer,
            frame_timeout,
            progress: None,
        }
    }

    pub fn with_progress(mut self, board: Option<ProgressBoard>) -> Self {
        self.progress = board;
        self
    }

    pub async fn extract(
        &self,
        source: &mut dyn VideoSource,
        descriptor: &TrialDescriptor,
        cancel: &CancellationToken,
    ) -> AnalysisResult<(TrialSeries, ExtractionStats)> {
        let metadata = source.metadata();
        let total = self.sampler.schedule(&metadata)?.total();
        let mut progress = self
            .progress
            .as_ref()
            .map(|board| board.trial(self.label, Some(total as u64)));

        let mut stats = ExtractionStats {
            source_fps: metadata.fps,
            ..ExtractionStats::default()
        };
        let mut frames = Vec::with_capacity(total);
        let mut samples = self.sampler.frames(source)?;
        let outcome = self
            .drain(&mut samples, cancel, &mut frames, &mut stats, progress.as_mut())
            .await;
        drop(samples);

        if let Err(err) = outcome {
            if let Some(progress) = progress.as_mut() {
                progress.fail(&err.to_string());
            }
            return Err(err);
        }
        if let Some(progress) = progress.as_mut() {
            progress.finish();
        }

        let series = TrialSeries::new(
            frames,
            descriptor.asset_id.clone(),
            descriptor.captured_at,
            Protocol {
                view: descriptor.view,
                fps: self.sampler.fps(),
            },
        )?;
        stats.sampled = series.len();
        stats.detected = series.detected_count();
        tracing::info!(
            trial = %self.label,
            asset = %descriptor.asset_id,
            sampled = stats.sampled,
            detected = stats.detected,
            timeouts = stats.timeouts,
            "trial extracted"
        );
        Ok((series, stats))
    }

    async fn drain(
        &self,
        samples: &mut SampleStream<'_>,
        cancel: &CancellationToken,
        frames: &mut Vec<Frame>,
        stats: &mut ExtractionStats,
        mut progress: Option<&mut TrialProgress>,
    ) -> AnalysisResult<()> {
        let mut straggler: Option<DetectTask> = None;
        loop {
            if let Some(task) = straggler.take() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AnalysisError::CancellationRequested),
                    // the frame is already a gap; only its completion matters
                    _ = task => {}
                }
            }
            // Polling the stream issues the next seek.
            if cancel.is_cancelled() {
                return Err(AnalysisError::CancellationRequested);
            }
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AnalysisError::CancellationRequested),
                next = samples.next() => next,
            };
            let Some(sampled) = next else {
                return Ok(());
            };
            let sampled = sampled?;
            let point = sampled.point;

            if cancel.is_cancelled() {
                return Err(AnalysisError::CancellationRequested);
            }
            let detected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AnalysisError::CancellationRequested),
                detected = self.detect(sampled, &mut straggler) => detected,
            };
            let landmarks = match detected {
                Ok(landmarks) => landmarks,
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(trial = %self.label, error = %err, "frame dropped");
                    stats.timeouts += 1;
                    None
                }
                Err(err) => return Err(err),
            };

            if let Some(progress) = progress.as_deref_mut() {
                progress.observe(landmarks.is_some());
            }
            frames.push(Frame {
                index: point.index,
                timestamp_ms: point.timestamp_ms(),
                landmarks,
            });
        }
    }

    /// On timeout the still-running model call is parked in `straggler`.
    async fn detect(
        &self,
        sampled: SampledFrame,
        straggler: &mut Option<DetectTask>,
    ) -> AnalysisResult<Option<PoseLandmarks>> {
        let SampledFrame { point, frame } = sampled;
        let timestamp_ms = point.timestamp_ms();
        let estimator = Arc::clone(&self.estimator);

        let mut task: DetectTask = tokio::task::spawn_blocking(move || {
            estimator.detect(&PoseRequest::new(&frame, timestamp_ms))
        });
        let raw = match tokio::time::timeout(self.frame_timeout, &mut task).await {
            Ok(joined) => joined
                .map_err(|err| AnalysisError::Join(err.to_string()))?
                .map_err(|source| AnalysisError::Detection {
                    frame_index: point.index,
                    timestamp_ms,
                    source,
                })?,
            Err(_) => {
                *straggler = Some(task);
                return Err(AnalysisError::ModelTimeout {
                    frame_index: point.index,
                    timestamp_ms,
                    timeout: self.frame_timeout,
                });
            }
        };

        raw.map(|pose| self.normalizer.normalize(&pose, point.index, timestamp_ms))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_compare_decoder::backends::mock::MockSource;
    use motion_compare_pose::{LandmarkSchema, PoseError, RawLandmark, RawPose};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Script = dyn Fn(usize, f64) -> Result<Option<RawPose>, PoseError> + Send + Sync;

    struct ScriptedEstimator {
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
        script: Box<Script>,
    }

    impl ScriptedEstimator {
        fn new(
            script: impl Fn(usize, f64) -> Result<Option<RawPose>, PoseError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                script: Box::new(script),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn max_running(&self) -> usize {
            self.max_running.load(Ordering::SeqCst)
        }
    }

    impl PoseEstimator for ScriptedEstimator {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn schema(&self) -> LandmarkSchema {
            LandmarkSchema::Coco17
        }

        fn detect(&self, request: &PoseRequest<'_>) -> Result<Option<RawPose>, PoseError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            let outcome = (self.script)(call, request.timestamp_ms());
            self.running.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    fn pose(arity: usize) -> RawPose {
        RawPose::new(vec![RawLandmark::new(0.5, 0.5, 0.0, 0.9); arity])
    }

    fn descriptor() -> TrialDescriptor {
        TrialDescriptor {
            asset_id: "asset-a".into(),
            captured_at: None,
            view: View::Sagittal,
        }
    }

    fn extractor(estimator: Arc<ScriptedEstimator>, timeout: Duration) -> TrialExtractor {
        TrialExtractor::new(
            TrialLabel::A,
            FrameSampler::new(10.0).unwrap(),
            estimator,
            timeout,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn builds_series_with_gaps() {
        let estimator = ScriptedEstimator::new(|call, _| Ok((call % 2 == 1).then(|| pose(17))));
        let mut source = MockSource::new(Duration::from_secs(2), 30.0);
        let (series, stats) = extractor(estimator.clone(), DEFAULT_FRAME_TIMEOUT)
            .extract(&mut source, &descriptor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(series.len(), 20);
        assert_eq!(series.detected_count(), 10);
        assert_eq!(stats.sampled, 20);
        assert_eq!(stats.detected, 10);
        assert_eq!(stats.source_fps, Some(30.0));
        assert_eq!(estimator.calls(), 20);
        assert!(series.frames()[1].landmarks.is_none());
        assert_eq!(series.protocol().fps, 10.0);
        for pair in series.frames().windows(2) {
            assert!(pair[1].timestamp_ms > pair[0].timestamp_ms);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_frame_becomes_gap() {
        let estimator = ScriptedEstimator::new(|call, _| {
            if call == 3 {
                std::thread::sleep(Duration::from_millis(300));
            }
            Ok(Some(pose(17)))
        });
        let mut source = MockSource::new(Duration::from_millis(500), 30.0);
        let (series, stats) = extractor(estimator, Duration::from_millis(100))
            .extract(&mut source, &descriptor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(series.len(), 5);
        assert!(series.frames()[2].landmarks.is_none());
        assert_eq!(series.detected_count(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_out_detection_finishes_before_the_next_one() {
        let estimator = ScriptedEstimator::new(|call, _| {
            if call == 3 {
                std::thread::sleep(Duration::from_millis(400));
            }
            Ok(Some(pose(17)))
        });
        let mut source = MockSource::new(Duration::from_secs(1), 30.0);
        let seeks = source.seek_counter();
        let (series, stats) = extractor(estimator.clone(), Duration::from_millis(100))
            .extract(&mut source, &descriptor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(estimator.max_running(), 1);
        assert_eq!(estimator.calls(), 10);
        assert_eq!(seeks.load(Ordering::SeqCst), 10);
        assert_eq!(series.detected_count(), 9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wrong_landmark_count_aborts() {
        let estimator = ScriptedEstimator::new(|call, _| {
            Ok(Some(pose(if call == 4 { 33 } else { 17 })))
        });
        let mut source = MockSource::new(Duration::from_secs(1), 30.0);
        let err = extractor(estimator, DEFAULT_FRAME_TIMEOUT)
            .extract(&mut source, &descriptor(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            AnalysisError::UnknownLandmarkSchema {
                expected,
                actual,
                frame_index,
                ..
            } => {
                assert_eq!((expected, actual, frame_index), (17, 33, 3));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn model_failure_is_fatal() {
        let estimator = ScriptedEstimator::new(|_, _| Err(PoseError::backend("tensor shape")));
        let mut source = MockSource::new(Duration::from_secs(1), 30.0);
        let err = extractor(estimator, DEFAULT_FRAME_TIMEOUT)
            .extract(&mut source, &descriptor(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Detection { frame_index: 0, .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_stops_seeks_and_detections() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let estimator = ScriptedEstimator::new(move |call, _| {
            if call == 10 {
                trigger.cancel();
            }
            Ok(Some(pose(17)))
        });
        let mut source = MockSource::new(Duration::from_secs(5), 30.0);
        let seeks = source.seek_counter();
        let err = extractor(estimator.clone(), DEFAULT_FRAME_TIMEOUT)
            .extract(&mut source, &descriptor(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::CancellationRequested));
        assert_eq!(seeks.load(Ordering::SeqCst), 10);
        assert_eq!(estimator.calls(), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_before_start_never_seeks() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let estimator = ScriptedEstimator::new(|_, _| Ok(None));
        let mut source = MockSource::new(Duration::from_secs(5), 30.0);
        let seeks = source.seek_counter();
        let result = extractor(estimator.clone(), DEFAULT_FRAME_TIMEOUT)
            .extract(&mut source, &descriptor(), &cancel)
            .await;
        assert!(matches!(result, Err(AnalysisError::CancellationRequested)));
        assert_eq!(seeks.load(Ordering::SeqCst), 0);
        assert_eq!(estimator.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hidden_progress_counts_every_sample() {
        let estimator = ScriptedEstimator::new(|_, _| Ok(Some(pose(17))));
        let mut source = MockSource::new(Duration::from_secs(1), 30.0);
        let (series, _) = extractor(estimator, DEFAULT_FRAME_TIMEOUT)
            .with_progress(Some(ProgressBoard::hidden()))
            .extract(&mut source, &descriptor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(series.len(), 10);
    }
}
