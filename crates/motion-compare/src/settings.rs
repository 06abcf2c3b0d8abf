use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use directories::{BaseDirs, ProjectDirs};
use motion_compare_pose::PoseBackend;
use serde::Deserialize;

use crate::cli::{CliArgs, CliSources};
use crate::pipeline::PipelineConfig;
use crate::stage::TrialDescriptor;
use crate::sync::{KeyMomentRequest, SyncMode, SyncRequest, WarpMethod};
use crate::trial::{TestType, View};

const CONFIG_FILE_NAME: &str = "motion-compare.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<String>,
    sample_fps: Option<f64>,
    frame_timeout_ms: Option<u64>,
    view: Option<String>,
    sync_mode: Option<String>,
    warp: Option<String>,
    output: Option<String>,
    disclaimer: Option<String>,
    pose: Option<PoseFileConfig>,
    pipeline: Option<PipelineFileConfig>,
    events: Option<EventsFileConfig>,
    sync: Option<SyncFileConfig>,
    quality: Option<QualityFileConfig>,
    thresholds: HashMap<String, f64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct PoseFileConfig {
    backend: Option<String>,
    model: Option<String>,
    model_b: Option<String>,
    match_tolerance_ms: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct PipelineFileConfig {
    timeout_base_secs: Option<u64>,
    timeout_per_video_second_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct EventsFileConfig {
    min_visibility: Option<f64>,
    min_prominence: Option<f64>,
    gait_window_ms: Option<f64>,
    squat_window_ms: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct SyncFileConfig {
    gait_search_window_ms: Option<f64>,
    squat_search_window_ms: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct QualityFileConfig {
    max_occlusion_pct: Option<f64>,
    min_mean_visibility: Option<f64>,
    min_anchor_confidence: Option<f64>,
    fps_tolerance: Option<f64>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub test_type: TestType,
    pub trial_a: TrialSettings,
    pub trial_b: TrialSettings,
    pub backend: Option<String>,
    pub pose: PoseSettings,
    pub sync: SyncRequest,
    pub pipeline: PipelineConfig,
    pub output: Option<PathBuf>,
    pub tags: Vec<String>,
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TrialSettings {
    pub path: PathBuf,
    pub descriptor: TrialDescriptor,
}

#[derive(Debug, Clone)]
pub struct PoseSettings {
    pub backend: PoseBackend,
    pub model: Option<PathBuf>,
    /// Separate model artifact for trial B (replay recordings are per video).
    pub model_b: Option<PathBuf>,
    pub match_tolerance_ms: Option<f64>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    Missing {
        option: &'static str,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::Missing { option } => {
                write!(f, "missing required option --{}", option)
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::Missing { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    for candidate in [project_config_path(), default_config_path()]
        .into_iter()
        .flatten()
    {
        if candidate.exists() {
            let config = read_config(&candidate)?;
            return Ok((config, Some(candidate)));
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        backend: file_backend,
        sample_fps: file_sample_fps,
        frame_timeout_ms: file_frame_timeout_ms,
        view: file_view,
        sync_mode: file_sync_mode,
        warp: file_warp,
        output: file_output,
        disclaimer: file_disclaimer,
        pose: file_pose,
        pipeline: file_pipeline,
        events: file_events,
        sync: file_sync,
        quality: file_quality,
        thresholds: file_thresholds,
    } = file;
    let file_pose = file_pose.unwrap_or_default();
    let file_pipeline = file_pipeline.unwrap_or_default();
    let file_events = file_events.unwrap_or_default();
    let file_sync = file_sync.unwrap_or_default();
    let file_quality = file_quality.unwrap_or_default();

    let test_type: TestType = cli
        .test_type
        .map(Into::into)
        .ok_or(ConfigError::Missing { option: "test-type" })?;

    let mut backend = normalize_string(cli.backend.clone());
    if backend.is_none() {
        backend = normalize_string(file_backend);
    }

    let mut view: View = cli.view.into();
    if !sources.view_from_cli {
        if let Some(value) = normalize_string(file_view) {
            view = parse_field(&value, "view", config_path.as_ref())?;
        }
    }
    let view_b = cli.view_b.map(View::from).unwrap_or(view);

    let trial_a = trial_settings(
        cli.trial_a.clone(),
        "trial-a",
        cli.asset_a.clone(),
        cli.captured_a.as_deref(),
        "captured_a",
        view,
    )?;
    let trial_b = trial_settings(
        cli.trial_b.clone(),
        "trial-b",
        cli.asset_b.clone(),
        cli.captured_b.as_deref(),
        "captured_b",
        view_b,
    )?;

    let mut pipeline = PipelineConfig {
        show_progress: cli.progress,
        ..PipelineConfig::default()
    };

    pipeline.sample_fps = cli.fps;
    if !cli.fps.is_finite() || cli.fps <= 0.0 {
        return Err(ConfigError::InvalidValue {
            path: None,
            field: "fps",
            value: cli.fps.to_string(),
        });
    }
    if !sources.fps_from_cli {
        if let Some(value) = file_sample_fps {
            pipeline.sample_fps = positive(value, "sample_fps", config_path.as_ref())?;
        }
    }

    pipeline.frame_timeout = Duration::from_millis(cli.frame_timeout_ms);
    if !sources.frame_timeout_from_cli {
        if let Some(value) = file_frame_timeout_ms {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "frame_timeout_ms",
                    value: value.to_string(),
                });
            }
            pipeline.frame_timeout = Duration::from_millis(value);
        }
    }

    if let Some(secs) = file_pipeline.timeout_base_secs {
        pipeline.timeout_base = Duration::from_secs(secs);
    }
    if let Some(secs) = file_pipeline.timeout_per_video_second_secs {
        pipeline.timeout_per_video_second = Duration::from_secs(secs);
    }

    let mut events = pipeline.sync.events.clone();
    if let Some(value) = file_events.min_visibility {
        events.min_visibility = unit_interval(value, "events.min_visibility", config_path.as_ref())?;
    }
    if let Some(value) = file_events.min_prominence {
        events.min_prominence = non_negative(value, "events.min_prominence", config_path.as_ref())?;
    }
    if let Some(value) = file_events.gait_window_ms {
        events.gait_event_window_ms = positive(value, "events.gait_window_ms", config_path.as_ref())?;
    }
    if let Some(value) = file_events.squat_window_ms {
        events.squat_event_window_ms =
            positive(value, "events.squat_window_ms", config_path.as_ref())?;
    }
    pipeline = pipeline.with_events(events);

    if let Some(value) = file_sync.gait_search_window_ms {
        pipeline.sync.gait_search_window_ms =
            positive(value, "sync.gait_search_window_ms", config_path.as_ref())?;
    }
    if let Some(value) = file_sync.squat_search_window_ms {
        pipeline.sync.squat_search_window_ms = Some(positive(
            value,
            "sync.squat_search_window_ms",
            config_path.as_ref(),
        )?);
    }

    if let Some(value) = file_quality.max_occlusion_pct {
        pipeline.quality.max_occlusion_pct =
            non_negative(value, "quality.max_occlusion_pct", config_path.as_ref())?;
    }
    if let Some(value) = file_quality.min_mean_visibility {
        pipeline.quality.min_mean_visibility =
            unit_interval(value, "quality.min_mean_visibility", config_path.as_ref())?;
    }
    if let Some(value) = file_quality.min_anchor_confidence {
        pipeline.quality.min_anchor_confidence =
            unit_interval(value, "quality.min_anchor_confidence", config_path.as_ref())?;
    }
    if let Some(value) = file_quality.fps_tolerance {
        pipeline.quality.fps_tolerance =
            non_negative(value, "quality.fps_tolerance", config_path.as_ref())?;
    }

    for (key, value) in file_thresholds {
        let value = non_negative(value, "thresholds", config_path.as_ref())?;
        pipeline.metrics.thresholds.insert(key, value);
    }

    if let Some(text) = normalize_string(file_disclaimer) {
        pipeline.disclaimer = Some(text);
    }

    let mut sync_mode: SyncMode = cli.sync_mode.into();
    if !sources.sync_mode_from_cli {
        if let Some(value) = normalize_string(file_sync_mode) {
            sync_mode = parse_field(&value, "sync_mode", config_path.as_ref())?;
        }
    }
    let mut warp: WarpMethod = cli.warp.into();
    if !sources.warp_from_cli {
        if let Some(value) = normalize_string(file_warp) {
            warp = parse_field(&value, "warp", config_path.as_ref())?;
        }
    }
    let manual_anchor = match (cli.anchor_a, cli.anchor_b) {
        (Some(a), Some(b)) => Some((a, b)),
        (None, None) => None,
        (Some(_), None) => return Err(ConfigError::Missing { option: "anchor-b" }),
        (None, Some(_)) => return Err(ConfigError::Missing { option: "anchor-a" }),
    };
    let key_moments = cli
        .key_moments
        .iter()
        .map(|value| {
            KeyMomentRequest::from_str(value).map_err(|_| ConfigError::InvalidValue {
                path: None,
                field: "key-moment",
                value: value.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let sync = SyncRequest {
        mode: sync_mode,
        manual_anchor,
        key_moments,
        warp,
    };

    let model = cli
        .pose_model
        .clone()
        .map(expand_pathbuf)
        .or_else(|| {
            normalize_string(file_pose.model)
                .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
        });
    let model_b = cli
        .pose_model_b
        .clone()
        .map(expand_pathbuf)
        .or_else(|| {
            normalize_string(file_pose.model_b)
                .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
        });
    let pose_backend = match normalize_string(cli.pose_backend.clone()) {
        Some(value) => parse_field(&value, "pose-backend", None)?,
        None => match normalize_string(file_pose.backend) {
            Some(value) => parse_field(&value, "pose.backend", config_path.as_ref())?,
            None if model.is_some() => PoseBackend::Replay,
            None => PoseBackend::Noop,
        },
    };
    let match_tolerance_ms = match file_pose.match_tolerance_ms {
        Some(value) => Some(non_negative(
            value,
            "pose.match_tolerance_ms",
            config_path.as_ref(),
        )?),
        None => Some(500.0 / pipeline.sample_fps),
    };

    let output = cli.output.clone().map(expand_pathbuf).or_else(|| {
        normalize_string(file_output)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
    });

    let tags = cli
        .tags
        .iter()
        .filter_map(|tag| normalize_string(Some(tag.clone())))
        .collect();

    Ok(EffectiveSettings {
        test_type,
        trial_a,
        trial_b,
        backend,
        pose: PoseSettings {
            backend: pose_backend,
            model,
            model_b,
            match_tolerance_ms,
        },
        sync,
        pipeline,
        output,
        tags,
        config_dir,
    })
}

fn trial_settings(
    path: Option<PathBuf>,
    option: &'static str,
    asset_id: Option<String>,
    captured_at: Option<&str>,
    captured_field: &'static str,
    view: View,
) -> Result<TrialSettings, ConfigError> {
    let path = path.map(expand_pathbuf).ok_or(ConfigError::Missing { option })?;
    let asset_id = normalize_string(asset_id)
        .or_else(|| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| path.display().to_string());
    let captured_at = captured_at
        .map(|value| parse_timestamp(value, captured_field))
        .transpose()?;
    Ok(TrialSettings {
        path,
        descriptor: TrialDescriptor {
            asset_id,
            captured_at,
            view,
        },
    })
}

fn parse_timestamp(value: &str, field: &'static str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|stamp| stamp.with_timezone(&Utc))
        .map_err(|_| ConfigError::InvalidValue {
            path: None,
            field,
            value: value.to_string(),
        })
}

fn parse_field<T: FromStr>(
    value: &str,
    field: &'static str,
    path: Option<&PathBuf>,
) -> Result<T, ConfigError> {
    T::from_str(value).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field,
        value: value.to_string(),
    })
}

fn positive(value: f64, field: &'static str, path: Option<&PathBuf>) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            path: path.cloned(),
            field,
            value: value.to_string(),
        })
    }
}

fn non_negative(
    value: f64,
    field: &'static str,
    path: Option<&PathBuf>,
) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            path: path.cloned(),
            field,
            value: value.to_string(),
        })
    }
}

fn unit_interval(
    value: f64,
    field: &'static str,
    path: Option<&PathBuf>,
) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            path: path.cloned(),
            field,
            value: value.to_string(),
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "motion-compare", "motion-compare")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    const TRIALS: [&str; 7] = [
        "motion-compare",
        "--test-type",
        "gait",
        "--trial-a",
        "/videos/initial.mp4",
        "--trial-b",
        "/videos/followup.mp4",
    ];

    fn parse_args(extra: &[&str]) -> (CliArgs, CliSources) {
        let args: Vec<&str> = TRIALS.iter().chain(extra).copied().collect();
        let matches = CliArgs::command()
            .try_get_matches_from(args)
            .expect("valid arguments");
        let cli = CliArgs::from_arg_matches(&matches).expect("matches");
        let sources = CliSources::from_matches(&matches);
        (cli, sources)
    }

    fn file(contents: &str) -> FileConfig {
        toml::from_str(contents).expect("valid toml")
    }

    #[test]
    fn defaults_without_config_file() {
        let (cli, sources) = parse_args(&[]);
        let settings = merge(&cli, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.test_type, TestType::Gait);
        assert_eq!(settings.trial_a.descriptor.asset_id, "initial");
        assert_eq!(settings.trial_b.descriptor.view, View::Sagittal);
        assert_eq!(settings.pipeline.sample_fps, 30.0);
        assert_eq!(settings.pose.backend, PoseBackend::Noop);
        assert_eq!(settings.sync.mode, SyncMode::Auto);
        assert!(settings.output.is_none());
    }

    #[test]
    fn file_values_fill_in_what_the_cli_left_default() {
        let (cli, sources) = parse_args(&["--warp", "none"]);
        let config = file(
            r#"
            sample_fps = 25.0
            sync_mode = "hybrid"
            warp = "dtw-light"
            output = "out/result.json"

            [pose]
            model = "dumps/a.json"

            [quality]
            max_occlusion_pct = 35.0

            [thresholds]
            "gait.cadence_spm" = 2.5
            "#,
        );
        let settings = merge(
            &cli,
            &sources,
            config,
            Some(PathBuf::from("/etc/motion/motion-compare.toml")),
        )
        .unwrap();
        assert_eq!(settings.pipeline.sample_fps, 25.0);
        assert_eq!(settings.sync.mode, SyncMode::Hybrid);
        assert_eq!(settings.sync.warp, WarpMethod::None);
        assert_eq!(
            settings.output,
            Some(PathBuf::from("/etc/motion/out/result.json"))
        );
        assert_eq!(settings.pose.backend, PoseBackend::Replay);
        assert_eq!(
            settings.pose.model,
            Some(PathBuf::from("/etc/motion/dumps/a.json"))
        );
        assert_eq!(settings.pose.match_tolerance_ms, Some(20.0));
        assert_eq!(settings.pipeline.quality.max_occlusion_pct, 35.0);
        assert_eq!(settings.pipeline.metrics.thresholds["gait.cadence_spm"], 2.5);
    }

    #[test]
    fn cli_fps_wins_over_file() {
        let (cli, sources) = parse_args(&["--fps", "60"]);
        let settings = merge(&cli, &sources, file("sample_fps = 25.0"), None).unwrap();
        assert_eq!(settings.pipeline.sample_fps, 60.0);
    }

    #[test]
    fn event_overrides_reach_sync_and_metrics() {
        let (cli, sources) = parse_args(&[]);
        let config = file("[events]\nmin_visibility = 0.3\ngait_window_ms = 300.0");
        let settings = merge(&cli, &sources, config, None).unwrap();
        assert_eq!(settings.pipeline.sync.events.min_visibility, 0.3);
        assert_eq!(settings.pipeline.metrics.events.gait_event_window_ms, 300.0);
    }

    #[test]
    fn manual_anchor_needs_both_frames() {
        let (cli, sources) = parse_args(&["--anchor-a", "12"]);
        let err = merge(&cli, &sources, FileConfig::default(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { option: "anchor-b" }));

        let (cli, sources) = parse_args(&["--anchor-a", "12", "--anchor-b", "20"]);
        let settings = merge(&cli, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.sync.manual_anchor, Some((12, 20)));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let (cli, sources) = parse_args(&["--key-moment", "heel:ten:4"]);
        let err = merge(&cli, &sources, FileConfig::default(), None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "key-moment",
                ..
            }
        ));

        let (cli, sources) = parse_args(&["--captured-a", "yesterday"]);
        let err = merge(&cli, &sources, FileConfig::default(), None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "captured_a",
                ..
            }
        ));

        let (cli, sources) = parse_args(&[]);
        let err = merge(&cli, &sources, file("[quality]\nmin_mean_visibility = 1.5"), None)
            .unwrap_err();
        assert!(err.to_string().contains("quality.min_mean_visibility"));
    }

    #[test]
    fn captured_at_is_normalized_to_utc() {
        let (cli, sources) = parse_args(&["--captured-b", "2024-03-01T10:00:00+02:00"]);
        let settings = merge(&cli, &sources, FileConfig::default(), None).unwrap();
        let captured = settings.trial_b.descriptor.captured_at.unwrap();
        assert_eq!(captured.to_rfc3339(), "2024-03-01T08:00:00+00:00");
    }

    #[test]
    fn missing_trial_is_reported() {
        let matches = CliArgs::command()
            .try_get_matches_from(["motion-compare", "--test-type", "squat"])
            .unwrap();
        let cli = CliArgs::from_arg_matches(&matches).unwrap();
        let sources = CliSources::from_matches(&matches);
        let err = merge(&cli, &sources, FileConfig::default(), None).unwrap_err();
        assert_eq!(err.to_string(), "missing required option --trial-a");
    }

    #[test]
    fn explicit_config_must_exist() {
        let err = load_config(Some(Path::new("/nonexistent/motion-compare.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn explicit_config_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "backend = \"mock\"\n[pose]\nbackend = \"noop\"\n").unwrap();
        let (config, found) = load_config(Some(&path)).unwrap();
        assert_eq!(found, Some(path));
        assert_eq!(config.backend.as_deref(), Some("mock"));
    }
}
