use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};

use crate::sync::{SyncMode, WarpMethod};
use crate::trial::{TestType, View};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TestTypeArg {
    Gait,
    Squat,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ViewArg {
    Frontal,
    Sagittal,
    Other,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncModeArg {
    Auto,
    Manual,
    Hybrid,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum WarpArg {
    None,
    DtwLight,
}

impl From<TestTypeArg> for TestType {
    fn from(value: TestTypeArg) -> Self {
        match value {
            TestTypeArg::Gait => TestType::Gait,
            TestTypeArg::Squat => TestType::Squat,
        }
    }
}

impl From<ViewArg> for View {
    fn from(value: ViewArg) -> Self {
        match value {
            ViewArg::Frontal => View::Frontal,
            ViewArg::Sagittal => View::Sagittal,
            ViewArg::Other => View::Other,
        }
    }
}

impl From<SyncModeArg> for SyncMode {
    fn from(value: SyncModeArg) -> Self {
        match value {
            SyncModeArg::Auto => SyncMode::Auto,
            SyncModeArg::Manual => SyncMode::Manual,
            SyncModeArg::Hybrid => SyncMode::Hybrid,
        }
    }
}

impl From<WarpArg> for WarpMethod {
    fn from(value: WarpArg) -> Self {
        match value {
            WarpArg::None => WarpMethod::None,
            WarpArg::DtwLight => WarpMethod::DtwLight,
        }
    }
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub fps_from_cli: bool,
    pub view_from_cli: bool,
    pub sync_mode_from_cli: bool,
    pub warp_from_cli: bool,
    pub frame_timeout_from_cli: bool,
}

impl CliSources {
    pub(crate) fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            fps_from_cli: value_from_cli(matches, "fps"),
            view_from_cli: value_from_cli(matches, "view"),
            sync_mode_from_cli: value_from_cli(matches, "sync_mode"),
            warp_from_cli: value_from_cli(matches, "warp"),
            frame_timeout_from_cli: value_from_cli(matches, "frame_timeout_ms"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "motion-compare",
    about = "Compare two movement assessment videos and report metric changes",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Movement test recorded in both videos
    #[arg(long = "test-type", value_enum)]
    pub test_type: Option<TestTypeArg>,

    /// Initial assessment video (trial A)
    #[arg(long = "trial-a", value_name = "PATH")]
    pub trial_a: Option<PathBuf>,

    /// Reassessment video (trial B)
    #[arg(long = "trial-b", value_name = "PATH")]
    pub trial_b: Option<PathBuf>,

    /// Asset identifier recorded for trial A (defaults to the file name)
    #[arg(long = "asset-a")]
    pub asset_a: Option<String>,

    /// Asset identifier recorded for trial B (defaults to the file name)
    #[arg(long = "asset-b")]
    pub asset_b: Option<String>,

    /// Capture time of trial A (RFC 3339)
    #[arg(long = "captured-a", value_name = "RFC3339")]
    pub captured_a: Option<String>,

    /// Capture time of trial B (RFC 3339)
    #[arg(long = "captured-b", value_name = "RFC3339")]
    pub captured_b: Option<String>,

    /// Camera view of both trials
    #[arg(long = "view", value_enum, default_value_t = ViewArg::Sagittal)]
    pub view: ViewArg,

    /// Camera view of trial B when it differs from trial A
    #[arg(long = "view-b", value_enum)]
    pub view_b: Option<ViewArg>,

    /// Lock decoding to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Pose estimation backend
    #[arg(long = "pose-backend")]
    pub pose_backend: Option<String>,

    /// Pose model artifact (a landmark recording for the replay backend)
    #[arg(long = "pose-model", value_name = "FILE")]
    pub pose_model: Option<PathBuf>,

    /// Pose model artifact used for trial B only
    #[arg(long = "pose-model-b", value_name = "FILE")]
    pub pose_model_b: Option<PathBuf>,

    /// How trial B is aligned to trial A
    #[arg(long = "sync-mode", id = "sync_mode", value_enum, default_value_t = SyncModeArg::Auto)]
    pub sync_mode: SyncModeArg,

    /// Manual anchor frame in trial A
    #[arg(long = "anchor-a", value_name = "FRAME")]
    pub anchor_a: Option<usize>,

    /// Manual anchor frame in trial B
    #[arg(long = "anchor-b", value_name = "FRAME")]
    pub anchor_b: Option<usize>,

    /// Paired key moment as name:frame_a:frame_b (repeatable)
    #[arg(long = "key-moment", value_name = "NAME:A:B")]
    pub key_moments: Vec<String>,

    /// Time warp applied between key moments
    #[arg(long = "warp", value_enum, default_value_t = WarpArg::None)]
    pub warp: WarpArg,

    /// Sampling rate in frames per second
    #[arg(long = "fps", default_value_t = 30.0)]
    pub fps: f64,

    /// Per-frame pose model budget in milliseconds
    #[arg(
        long = "frame-timeout-ms",
        id = "frame_timeout_ms",
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub frame_timeout_ms: u64,

    /// Free-form tag stored with the result (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Write the comparison result to this file instead of stdout
    #[arg(long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Show per-trial progress bars
    #[arg(long = "progress")]
    pub progress: bool,

    /// Print the list of available decoding backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,
}
