use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult, TrialLabel};
use crate::kinematics::FrameGeometry;
use crate::result::round;
use crate::signal::{self, Extremum, ExtremumSearch};
use crate::trial::{TestType, TrialSeries};

/// Key moment name that replaces the detected anchor pair.
pub const ANCHOR_OVERRIDE: &str = "anchor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Hybrid,
}

impl FromStr for SyncMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "manual" => Ok(SyncMode::Manual),
            "hybrid" => Ok(SyncMode::Hybrid),
            other => Err(AnalysisError::input(format!(
                "unknown synchronization mode '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Auto => "auto",
            SyncMode::Manual => "manual",
            SyncMode::Hybrid => "hybrid",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarpMethod {
    /// One constant time offset between the trials.
    #[default]
    None,
    /// Piecewise-linear stretch through the anchor and every key moment.
    DtwLight,
}

impl FromStr for WarpMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Ok(WarpMethod::None),
            "dtw-light" => Ok(WarpMethod::DtwLight),
            other => Err(AnalysisError::input(format!(
                "unknown warp method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for WarpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WarpMethod::None => "none",
            WarpMethod::DtwLight => "dtw-light",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorType {
    GaitInitialContact,
    SquatBottom,
    Manual,
}

impl AnchorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorType::GaitInitialContact => "initial contact",
            AnchorType::SquatBottom => "squat bottom",
            AnchorType::Manual => "manual anchor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorEvent {
    #[serde(rename = "type")]
    pub kind: AnchorType,
    pub frame_index: usize,
    #[serde(serialize_with = "round::one_decimal")]
    pub timestamp_ms: f64,
    #[serde(serialize_with = "round::two_decimals")]
    pub confidence: f64,
}

/// Caller-supplied correspondence between one frame of each trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMomentRequest {
    pub name: String,
    pub frame_a: usize,
    pub frame_b: usize,
}

impl FromStr for KeyMomentRequest {
    type Err = AnalysisError;

    /// Parses `name:frame_a:frame_b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AnalysisError::input(format!("key moment '{s}' is not name:frame_a:frame_b"));
        let mut parts = s.split(':');
        let (Some(name), Some(a), Some(b), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_string(),
            frame_a: a.trim().parse().map_err(|_| invalid())?,
            frame_b: b.trim().parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMomentPair {
    pub name: String,
    pub frame_a: usize,
    pub frame_b: usize,
    #[serde(serialize_with = "round::one_decimal")]
    pub timestamp_a_ms: f64,
    #[serde(serialize_with = "round::one_decimal")]
    pub timestamp_b_ms: f64,
}

/// How trial B's timeline maps onto trial A's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronizationMap {
    pub mode: SyncMode,
    #[serde(rename = "anchor_A")]
    pub anchor_a: AnchorEvent,
    #[serde(rename = "anchor_B")]
    pub anchor_b: AnchorEvent,
    pub key_moment_pairs: Vec<KeyMomentPair>,
    pub warp_method: WarpMethod,
    /// `t_B(anchor) − t_A(anchor)`.
    #[serde(serialize_with = "round::one_decimal")]
    pub offset_ms: f64,
}

impl SynchronizationMap {
    /// Maps a trial B timestamp onto trial A's timeline.
    pub fn map_b_to_a(&self, timestamp_b_ms: f64) -> f64 {
        if self.warp_method == WarpMethod::None || self.key_moment_pairs.is_empty() {
            return timestamp_b_ms - self.offset_ms;
        }

        let mut points: Vec<(f64, f64)> = Vec::with_capacity(self.key_moment_pairs.len() + 1);
        points.push((self.anchor_b.timestamp_ms, self.anchor_a.timestamp_ms));
        points.extend(
            self.key_moment_pairs
                .iter()
                .map(|pair| (pair.timestamp_b_ms, pair.timestamp_a_ms)),
        );
        points.sort_by(|x, y| x.0.total_cmp(&y.0));

        let first = points[0];
        let last = points[points.len() - 1];
        if timestamp_b_ms <= first.0 {
            return timestamp_b_ms - (first.0 - first.1);
        }
        if timestamp_b_ms >= last.0 {
            return timestamp_b_ms - (last.0 - last.1);
        }
        for segment in points.windows(2) {
            let (b0, a0) = segment[0];
            let (b1, a1) = segment[1];
            if timestamp_b_ms <= b1 {
                let ratio = (timestamp_b_ms - b0) / (b1 - b0);
                return a0 + ratio * (a1 - a0);
            }
        }
        timestamp_b_ms - self.offset_ms
    }

    fn is_warped(&self) -> bool {
        self.warp_method == WarpMethod::DtwLight && !self.key_moment_pairs.is_empty()
    }

    /// Frames of each trial that take part in the comparison.
    ///
    /// Both windows start at the anchors. Without a warp they hold the same
    /// number of frames, cut to the shorter remainder. With a warp, trial B's
    /// window holds the frames whose mapped time stays within the part of
    /// trial A's timeline that both trials cover, so the two windows may
    /// differ in length.
    pub fn analysis_window(&self, trial_a: &TrialSeries, trial_b: &TrialSeries) -> AnalysisWindow {
        let start_a = self.anchor_a.frame_index.min(trial_a.len());
        let start_b = self.anchor_b.frame_index.min(trial_b.len());
        if !self.is_warped() {
            let len = (trial_a.len() - start_a).min(trial_b.len() - start_b);
            return AnalysisWindow {
                start_a,
                end_a: start_a + len,
                start_b,
                end_b: start_b + len,
            };
        }

        let (Some(last_a), Some(last_b)) = (trial_a.frames().last(), trial_b.frames().last()) else {
            return AnalysisWindow {
                start_a,
                end_a: start_a,
                start_b,
                end_b: start_b,
            };
        };
        let end_ms = last_a.timestamp_ms.min(self.map_b_to_a(last_b.timestamp_ms)) + WARP_EPSILON_MS;
        let end_a = trial_a
            .frames()
            .partition_point(|frame| frame.timestamp_ms <= end_ms)
            .max(start_a);
        let end_b = trial_b
            .frames()
            .partition_point(|frame| self.map_b_to_a(frame.timestamp_ms) <= end_ms)
            .max(start_b);
        AnalysisWindow {
            start_a,
            end_a,
            start_b,
            end_b,
        }
    }
}

/// Slack for float error when comparing mapped timestamps.
const WARP_EPSILON_MS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub start_a: usize,
    pub end_a: usize,
    pub start_b: usize,
    pub end_b: usize,
}

impl AnalysisWindow {
    pub fn range(&self, trial: TrialLabel) -> Range<usize> {
        match trial {
            TrialLabel::A => self.start_a..self.end_a,
            TrialLabel::B => self.start_b..self.end_b,
        }
    }
}

/// Parameters of the extremum search shared by anchor detection and the
/// event-based metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct EventConfig {
    pub min_visibility: f64,
    pub min_prominence: f64,
    /// Neighbourhood a gait event must dominate on each side.
    pub gait_event_window_ms: f64,
    pub squat_event_window_ms: f64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            min_visibility: 0.5,
            min_prominence: 0.2,
            gait_event_window_ms: 400.0,
            squat_event_window_ms: 1000.0,
        }
    }
}

impl EventConfig {
    pub fn radius(&self, test_type: TestType, series: &TrialSeries) -> usize {
        let window_ms = match test_type {
            TestType::Gait => self.gait_event_window_ms,
            TestType::Squat => self.squat_event_window_ms,
        };
        ((window_ms / series.frame_interval_ms()).round() as usize).max(1)
    }

    /// Signal whose extrema mark the events of `test_type`: step separation
    /// for gait, pelvis height (image y, growing downwards) for squats.
    pub fn event_signal(&self, test_type: TestType, series: &TrialSeries) -> Vec<Option<f64>> {
        series.signal(|frame| {
            let geometry = FrameGeometry::new(frame, self.min_visibility);
            match test_type {
                TestType::Gait => geometry.step_separation(),
                TestType::Squat => geometry.mid_hip().map(|point| point.y),
            }
        })
    }

    pub fn search(&self, test_type: TestType, series: &TrialSeries, window: Range<usize>) -> ExtremumSearch {
        ExtremumSearch {
            window,
            radius: self.radius(test_type, series),
            min_prominence: self.min_prominence,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub events: EventConfig,
    pub gait_search_window_ms: f64,
    /// `None` searches the whole trial.
    pub squat_search_window_ms: Option<f64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            events: EventConfig::default(),
            gait_search_window_ms: 4000.0,
            squat_search_window_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub mode: SyncMode,
    pub manual_anchor: Option<(usize, usize)>,
    pub key_moments: Vec<KeyMomentRequest>,
    pub warp: WarpMethod,
}

pub struct Synchronizer {
    test_type: TestType,
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(test_type: TestType, config: SyncConfig) -> Self {
        Self { test_type, config }
    }

    /// Locates the canonical anchor of the test type in one trial.
    pub fn detect_anchor(&self, series: &TrialSeries, trial: TrialLabel) -> AnalysisResult<AnchorEvent> {
        let events = &self.config.events;
        let samples = events.event_signal(self.test_type, series);
        let (kind, limit_ms) = match self.test_type {
            TestType::Gait => (AnchorType::GaitInitialContact, Some(self.config.gait_search_window_ms)),
            TestType::Squat => (AnchorType::SquatBottom, self.config.squat_search_window_ms),
        };
        let end = match limit_ms {
            Some(limit) => series
                .frames()
                .partition_point(|frame| frame.timestamp_ms <= limit),
            None => series.len(),
        };

        let search = events.search(self.test_type, series, 0..end);
        let hit = signal::find_extremum(&samples, Extremum::Maximum, &search).ok_or_else(|| {
            let measured = samples[..end].iter().filter(|v| v.is_some()).count();
            AnalysisError::sync_failure(
                trial,
                format!(
                    "no {} found in the first {end} frames ({measured} measurable)",
                    kind.as_str()
                ),
            )
        })?;

        let frame = &series.frames()[hit.index];
        tracing::debug!(
            %trial,
            frame = hit.index,
            timestamp_ms = frame.timestamp_ms,
            prominence = hit.prominence,
            "anchor detected"
        );
        Ok(AnchorEvent {
            kind,
            frame_index: hit.index,
            timestamp_ms: frame.timestamp_ms,
            confidence: hit.prominence,
        })
    }

    pub fn synchronize(
        &self,
        trial_a: &TrialSeries,
        trial_b: &TrialSeries,
        request: &SyncRequest,
    ) -> AnalysisResult<SynchronizationMap> {
        if request.mode == SyncMode::Auto && !request.key_moments.is_empty() {
            return Err(AnalysisError::input(
                "key moments require manual or hybrid synchronization",
            ));
        }

        let (mut anchor_a, mut anchor_b) = match request.mode {
            SyncMode::Auto | SyncMode::Hybrid => (
                self.detect_anchor(trial_a, TrialLabel::A)?,
                self.detect_anchor(trial_b, TrialLabel::B)?,
            ),
            SyncMode::Manual => {
                let (frame_a, frame_b) = request.manual_anchor.ok_or_else(|| {
                    AnalysisError::input("manual synchronization requires an anchor frame for each trial")
                })?;
                (
                    manual_anchor(trial_a, TrialLabel::A, frame_a)?,
                    manual_anchor(trial_b, TrialLabel::B, frame_b)?,
                )
            }
        };

        let mut key_moment_pairs = Vec::new();
        for moment in &request.key_moments {
            let a = manual_anchor(trial_a, TrialLabel::A, moment.frame_a)?;
            let b = manual_anchor(trial_b, TrialLabel::B, moment.frame_b)?;
            if moment.name == ANCHOR_OVERRIDE {
                anchor_a = a;
                anchor_b = b;
                continue;
            }
            if key_moment_pairs
                .iter()
                .any(|pair: &KeyMomentPair| pair.name == moment.name)
            {
                return Err(AnalysisError::input(format!(
                    "key moment '{}' given more than once",
                    moment.name
                )));
            }
            key_moment_pairs.push(KeyMomentPair {
                name: moment.name.clone(),
                frame_a: moment.frame_a,
                frame_b: moment.frame_b,
                timestamp_a_ms: a.timestamp_ms,
                timestamp_b_ms: b.timestamp_ms,
            });
        }

        if request.warp == WarpMethod::DtwLight {
            check_monotonic(&anchor_a, &anchor_b, &key_moment_pairs)?;
        }

        let offset_ms = anchor_b.timestamp_ms - anchor_a.timestamp_ms;
        tracing::info!(
            mode = %request.mode,
            anchor_a = anchor_a.frame_index,
            anchor_b = anchor_b.frame_index,
            offset_ms,
            key_moments = key_moment_pairs.len(),
            "trials synchronized"
        );
        Ok(SynchronizationMap {
            mode: request.mode,
            anchor_a,
            anchor_b,
            key_moment_pairs,
            warp_method: request.warp,
            offset_ms,
        })
    }
}

fn manual_anchor(series: &TrialSeries, trial: TrialLabel, frame_index: usize) -> AnalysisResult<AnchorEvent> {
    let frame = series.frames().get(frame_index).ok_or_else(|| {
        AnalysisError::sync_failure(
            trial,
            format!(
                "frame {frame_index} is outside the trial ({} frames)",
                series.len()
            ),
        )
    })?;
    if !frame.detected() {
        return Err(AnalysisError::sync_failure(
            trial,
            format!("frame {frame_index} has no detected pose"),
        ));
    }
    Ok(AnchorEvent {
        kind: AnchorType::Manual,
        frame_index,
        timestamp_ms: frame.timestamp_ms,
        confidence: 1.0,
    })
}

fn check_monotonic(
    anchor_a: &AnchorEvent,
    anchor_b: &AnchorEvent,
    pairs: &[KeyMomentPair],
) -> AnalysisResult<()> {
    let mut points: Vec<(usize, usize)> = pairs
        .iter()
        .map(|pair| (pair.frame_a, pair.frame_b))
        .collect();
    points.push((anchor_a.frame_index, anchor_b.frame_index));
    points.sort_unstable();
    for segment in points.windows(2) {
        if segment[1].0 == segment[0].0 || segment[1].1 <= segment[0].1 {
            return Err(AnalysisError::sync_failure(
                TrialLabel::B,
                format!(
                    "key moments are not in the same order in both trials (A {} -> B {}, A {} -> B {})",
                    segment[0].0, segment[0].1, segment[1].0, segment[1].1
                ),
            ));
        }
    }
    Ok(())
}
