use std::sync::Arc;
use std::time::Duration;

use motion_compare_decoder::DynVideoSource;
use motion_compare_pose::PoseEstimator;
use tokio_util::sync::CancellationToken;

use crate::delta::DeltaCalculator;
use crate::error::{AnalysisError, AnalysisResult, TrialLabel};
use crate::metrics::{MetricConfig, MetricExtractor};
use crate::quality::{QualityConfig, QualityScorer, TrialEvidence};
use crate::result::{ComparisonResult, DEFAULT_DISCLAIMER};
use crate::sampler::{DEFAULT_SAMPLE_FPS, FrameSampler};
use crate::stage::{DEFAULT_FRAME_TIMEOUT, ProgressBoard, TrialDescriptor, TrialExtractor};
use crate::summary::SummaryGenerator;
use crate::sync::{EventConfig, SyncConfig, SyncRequest, Synchronizer};
use crate::trial::TestType;

pub struct TrialInput {
    pub source: DynVideoSource,
    pub descriptor: TrialDescriptor,
    /// Replaces the shared estimator for this trial only.
    pub estimator: Option<Arc<dyn PoseEstimator>>,
}

impl TrialInput {
    pub fn new(source: DynVideoSource, descriptor: TrialDescriptor) -> Self {
        Self {
            source,
            descriptor,
            estimator: None,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn PoseEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }
}

pub struct ComparisonRequest {
    pub test_type: TestType,
    pub trial_a: TrialInput,
    pub trial_b: TrialInput,
    pub sync: SyncRequest,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_fps: f64,
    pub frame_timeout: Duration,
    pub timeout_base: Duration,
    /// Added to the budget per second of the longer video.
    pub timeout_per_video_second: Duration,
    pub sync: SyncConfig,
    pub metrics: MetricConfig,
    pub quality: QualityConfig,
    pub show_progress: bool,
    pub disclaimer: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_fps: DEFAULT_SAMPLE_FPS,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            timeout_base: Duration::from_secs(30),
            timeout_per_video_second: Duration::from_secs(10),
            sync: SyncConfig::default(),
            metrics: MetricConfig::default(),
            quality: QualityConfig::default(),
            show_progress: false,
            disclaimer: Some(DEFAULT_DISCLAIMER.to_string()),
        }
    }
}

impl PipelineConfig {
    /// Applies one event detector setup to both anchor search and metrics.
    pub fn with_events(mut self, events: EventConfig) -> Self {
        self.sync.events = events.clone();
        self.metrics.events = events;
        self
    }

    pub fn budget(&self, longest_video: Duration) -> Duration {
        self.timeout_base + self.timeout_per_video_second.mul_f64(longest_video.as_secs_f64())
    }
}

/// Runs a complete comparison of two trial videos.
///
/// Both trials are extracted concurrently with a shared estimator; the whole
/// run is bounded by [`PipelineConfig::budget`]. Cancellation or an expired
/// budget drops both sources and yields no result.
pub async fn run_comparison(
    request: ComparisonRequest,
    estimator: Arc<dyn PoseEstimator>,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> AnalysisResult<ComparisonResult> {
    if cancel.is_cancelled() {
        return Err(AnalysisError::CancellationRequested);
    }
    let longest = [&request.trial_a, &request.trial_b]
        .iter()
        .filter_map(|trial| trial.source.metadata().duration)
        .max()
        .unwrap_or_default();
    let budget = config.budget(longest);
    tracing::debug!(budget_ms = budget.as_millis() as u64, "pipeline budget");

    match tokio::time::timeout(budget, compare(request, estimator, config, cancel)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(budget_ms = budget.as_millis() as u64, "comparison timed out");
            Err(AnalysisError::PipelineTimeout { budget })
        }
    }
}

async fn compare(
    request: ComparisonRequest,
    estimator: Arc<dyn PoseEstimator>,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> AnalysisResult<ComparisonResult> {
    let ComparisonRequest {
        test_type,
        trial_a,
        trial_b,
        sync,
        tags,
    } = request;
    let sampler = FrameSampler::new(config.sample_fps)?;
    let board = config.show_progress.then(ProgressBoard::new);

    let TrialInput {
        source: mut source_a,
        descriptor: descriptor_a,
        estimator: estimator_a,
    } = trial_a;
    let TrialInput {
        source: mut source_b,
        descriptor: descriptor_b,
        estimator: estimator_b,
    } = trial_b;

    let extractor_a = TrialExtractor::new(
        TrialLabel::A,
        sampler,
        estimator_a.unwrap_or_else(|| Arc::clone(&estimator)),
        config.frame_timeout,
    )
    .with_progress(board.clone());
    let extractor_b = TrialExtractor::new(
        TrialLabel::B,
        sampler,
        estimator_b.unwrap_or(estimator),
        config.frame_timeout,
    )
    .with_progress(board);

    let ((series_a, stats_a), (series_b, stats_b)) = tokio::try_join!(
        extractor_a.extract(source_a.as_mut(), &descriptor_a, cancel),
        extractor_b.extract(source_b.as_mut(), &descriptor_b, cancel),
    )?;
    drop(source_a);
    drop(source_b);

    if cancel.is_cancelled() {
        return Err(AnalysisError::CancellationRequested);
    }

    let result = compare_series(
        test_type,
        TrialEvidence {
            label: TrialLabel::A,
            series: &series_a,
            stats: &stats_a,
        },
        TrialEvidence {
            label: TrialLabel::B,
            series: &series_b,
            stats: &stats_b,
        },
        &sync,
        config,
    )?;
    Ok(result.with_tags(tags))
}

/// Everything after extraction: synchronization, metrics, deltas, summary
/// and quality. Deterministic for the same inputs.
pub fn compare_series(
    test_type: TestType,
    a: TrialEvidence<'_>,
    b: TrialEvidence<'_>,
    sync: &SyncRequest,
    config: &PipelineConfig,
) -> AnalysisResult<ComparisonResult> {
    let synchronization =
        Synchronizer::new(test_type, config.sync.clone()).synchronize(a.series, b.series, sync)?;
    let window = synchronization.analysis_window(a.series, b.series);
    tracing::debug!(
        frames_a = ?window.range(TrialLabel::A),
        frames_b = ?window.range(TrialLabel::B),
        warp = %synchronization.warp_method,
        "analysis window"
    );

    let metrics = MetricExtractor::new(test_type, config.metrics.clone());
    let catalog = metrics.catalog();
    let values_a = metrics.extract(a.series, window.range(TrialLabel::A));
    let values_b = metrics.extract(b.series, window.range(TrialLabel::B));

    let quality = QualityScorer::new(config.quality.clone()).score(a, b, &synchronization);
    for warning in &quality.warnings {
        tracing::warn!(code = %warning.code, "{}", warning.message);
    }

    let deltas = DeltaCalculator::new(quality.trial_a.confidence, quality.trial_b.confidence)
        .compute_all(&catalog, &values_a, &values_b);
    let summary = SummaryGenerator::new(test_type).generate(&deltas, &quality, &synchronization);
    tracing::info!(
        test_type = %test_type,
        improved = summary.improvements.len(),
        overall_confidence = quality.overall_confidence,
        "comparison complete"
    );

    Ok(ComparisonResult::new(
        test_type,
        a.series,
        b.series,
        synchronization,
        deltas,
        summary,
        quality,
    )
    .with_disclaimer(config.disclaimer.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_grows_with_the_longer_video() {
        let config = PipelineConfig::default();
        assert_eq!(config.budget(Duration::ZERO), Duration::from_secs(30));
        assert_eq!(config.budget(Duration::from_secs(12)), Duration::from_secs(150));
    }

    #[test]
    fn events_apply_to_sync_and_metrics() {
        let events = EventConfig {
            min_visibility: 0.3,
            ..EventConfig::default()
        };
        let config = PipelineConfig::default().with_events(events.clone());
        assert_eq!(config.sync.events, events);
        assert_eq!(config.metrics.events, events);
    }
}
