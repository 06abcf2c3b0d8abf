use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use motion_compare_decoder::{Backend, Configuration, DecoderError, DynVideoSource};
use motion_compare_pose::{PoseBackend, PoseConfig, PoseRuntime};
use tokio_util::sync::CancellationToken;

use crate::error::AnalysisResult;
use crate::output::{JsonFileSink, ResultSink, StdoutSink};
use crate::pipeline::{self, ComparisonRequest, PipelineConfig, TrialInput};
use crate::settings::{EffectiveSettings, TrialSettings};
use crate::sync::SyncRequest;
use crate::trial::TestType;

pub struct ExecutionPlan {
    pub decoder: Configuration,
    pub pose: PoseConfig,
    /// Dedicated pose runtime for trial B; `None` shares the first one.
    pub pose_b: Option<PoseConfig>,
    pub test_type: TestType,
    pub trial_a: TrialSettings,
    pub trial_b: TrialSettings,
    pub sync: SyncRequest,
    pub pipeline: PipelineConfig,
    pub output: Option<PathBuf>,
    pub tags: Vec<String>,
}

impl ExecutionPlan {
    pub fn from_settings(settings: EffectiveSettings) -> AnalysisResult<Self> {
        let mut decoder = Configuration::from_env()?;
        if let Some(name) = settings.backend.as_deref() {
            decoder.backend = parse_backend(name)?;
        }

        let pose = PoseConfig {
            backend: settings.pose.backend,
            model: settings.pose.model.clone(),
            match_tolerance_ms: settings.pose.match_tolerance_ms,
        };
        let pose_b = settings.pose.model_b.clone().map(|model| PoseConfig {
            model: Some(model),
            ..pose.clone()
        });

        Ok(Self {
            decoder,
            pose,
            pose_b,
            test_type: settings.test_type,
            trial_a: settings.trial_a,
            trial_b: settings.trial_b,
            sync: settings.sync,
            pipeline: settings.pipeline,
            output: settings.output,
            tags: settings.tags,
        })
    }
}

/// Opens both trials, runs the comparison and persists the artifact.
///
/// The decoder backend is never swapped for another one when it fails: the
/// only fallback left would be the synthetic mock source.
pub async fn run(plan: ExecutionPlan, cancel: &CancellationToken) -> AnalysisResult<()> {
    let ExecutionPlan {
        decoder,
        pose,
        pose_b,
        test_type,
        trial_a,
        trial_b,
        sync,
        pipeline,
        output,
        tags,
    } = plan;

    let available = Configuration::available_backends();
    if available.is_empty() {
        return Err(DecoderError::configuration(
            "no decoding backend available; rebuild with a backend feature such as \"backend-image-sequence\"",
        )
        .into());
    }
    if !available.contains(&decoder.backend) {
        return Err(DecoderError::unsupported(decoder.backend.as_str()).into());
    }

    let source_a = open_source(&decoder, &trial_a)?;
    let source_b = open_source(&decoder, &trial_b)?;

    let mut runtime = PoseRuntime::init(&pose)?;
    let mut runtime_b = pose_b.as_ref().map(PoseRuntime::init).transpose()?;
    tracing::debug!(
        models = runtime.loaded_models() + runtime_b.as_ref().map_or(0, PoseRuntime::loaded_models),
        dedicated_b = runtime_b.is_some(),
        "pose runtimes ready"
    );

    let mut input_b = TrialInput::new(source_b, trial_b.descriptor);
    if let Some(runtime_b) = runtime_b.as_ref() {
        input_b = input_b.with_estimator(runtime_b.estimator()?);
    }
    let request = ComparisonRequest {
        test_type,
        trial_a: TrialInput::new(source_a, trial_a.descriptor),
        trial_b: input_b,
        sync,
        tags,
    };

    let started = Instant::now();
    let outcome = pipeline::run_comparison(request, runtime.estimator()?, &pipeline, cancel).await;
    runtime.shutdown();
    if let Some(runtime_b) = runtime_b.as_mut() {
        runtime_b.shutdown();
    }
    let result = outcome?;
    tracing::info!(elapsed = ?started.elapsed(), "comparison finished");

    let sink: Box<dyn ResultSink> = match output {
        Some(path) => Box::new(JsonFileSink::new(path)),
        None => Box::new(StdoutSink),
    };
    tracing::debug!(sink = sink.name(), "persisting comparison result");
    sink.persist(&result).await
}

fn open_source(decoder: &Configuration, trial: &TrialSettings) -> AnalysisResult<DynVideoSource> {
    let started = Instant::now();
    let config = decoder.clone().with_input(trial.path.clone());
    match config.create_source() {
        Ok(source) => {
            tracing::info!(
                backend = config.backend.as_str(),
                input = %trial.path.display(),
                elapsed = ?started.elapsed(),
                "initialized decoder backend"
            );
            Ok(source)
        }
        Err(err) => {
            tracing::error!(
                backend = config.backend.as_str(),
                input = %trial.path.display(),
                elapsed = ?started.elapsed(),
                "decoder backend failed to initialize: {err}"
            );
            Err(err.into())
        }
    }
}

pub fn display_available_backends() {
    let names: Vec<&'static str> = Configuration::available_backends()
        .iter()
        .map(Backend::as_str)
        .collect();
    if names.is_empty() {
        println!("available backends: (none compiled)");
    } else {
        println!("available backends: {}", names.join(", "));
    }
    let pose: Vec<&'static str> = PoseBackend::available()
        .iter()
        .map(PoseBackend::as_str)
        .collect();
    println!("available pose backends: {}", pose.join(", "));
}

pub fn parse_backend(value: &str) -> Result<Backend, DecoderError> {
    Backend::from_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_decoder_backend_is_rejected() {
        assert!(parse_backend("betamax").is_err());
        assert_eq!(parse_backend("MOCK").unwrap(), Backend::Mock);
    }
}
