use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::kinematics::{FrameGeometry, Side};
use crate::signal::{self, Extremum};
use crate::sync::EventConfig;
use crate::trial::{Frame, TestType, TrialSeries};

/// Version tag of the formula set below; bump on any formula change.
pub const METRIC_FORMULA_VERSION: &str = "kinematics.v1";

pub const DEFAULT_THRESHOLD: f64 = 1.0;

/// Net pelvis travel (image widths) below which a gait trial is treated as
/// treadmill walking towards +x.
const MIN_TRAVEL: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Directionality {
    LowerIsBetter,
    HigherIsBetter,
    CloserToZeroIsBetter,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub label: String,
    pub unit: String,
    pub directionality: Directionality,
}

/// A metric of the catalog together with its effective change threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub metric: Metric,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    pub value: Option<f64>,
    /// Share of window frames the value could be computed from.
    pub coverage: f64,
}

impl MetricValue {
    fn missing() -> Self {
        Self {
            value: None,
            coverage: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Formula {
    Cadence,
    StepTimeSymmetry,
    StancePct(Side),
    PelvicDrop,
    TrunkLean,
    KneeValgus(Side),
    KneeFlexion,
    Repetitions,
}

struct Definition {
    formula: Formula,
    key: &'static str,
    label: &'static str,
    unit: &'static str,
    directionality: Directionality,
    threshold: f64,
}

const fn def(
    formula: Formula,
    key: &'static str,
    label: &'static str,
    unit: &'static str,
    directionality: Directionality,
    threshold: f64,
) -> Definition {
    Definition {
        formula,
        key,
        label,
        unit,
        directionality,
        threshold,
    }
}

const GAIT: &[Definition] = &[
    def(Formula::Cadence, "gait.cadence_spm", "Cadence", "steps/min", Directionality::HigherIsBetter, 1.0),
    def(Formula::StepTimeSymmetry, "gait.step_time_symmetry_pct", "Step time asymmetry", "%", Directionality::LowerIsBetter, 1.0),
    def(Formula::StancePct(Side::Left), "gait.stance_pct_left", "Stance (left)", "%", Directionality::Unknown, 1.0),
    def(Formula::StancePct(Side::Right), "gait.stance_pct_right", "Stance (right)", "%", Directionality::Unknown, 1.0),
    def(Formula::PelvicDrop, "gait.peak_pelvic_drop_deg", "Peak pelvic drop", "deg", Directionality::LowerIsBetter, 1.0),
    def(Formula::TrunkLean, "gait.peak_trunk_lean_deg", "Peak trunk lean", "deg", Directionality::LowerIsBetter, 1.0),
    def(Formula::KneeValgus(Side::Left), "gait.peak_knee_valgus_left_deg", "Peak knee valgus (left)", "deg", Directionality::LowerIsBetter, 1.0),
    def(Formula::KneeValgus(Side::Right), "gait.peak_knee_valgus_right_deg", "Peak knee valgus (right)", "deg", Directionality::LowerIsBetter, 1.0),
];

const SQUAT: &[Definition] = &[
    def(Formula::KneeFlexion, "squat.peak_knee_flexion_deg", "Peak knee flexion", "deg", Directionality::HigherIsBetter, 2.0),
    def(Formula::TrunkLean, "squat.peak_trunk_lean_deg", "Peak trunk lean", "deg", Directionality::LowerIsBetter, 1.0),
    def(Formula::KneeValgus(Side::Left), "squat.peak_knee_valgus_left_deg", "Peak knee valgus (left)", "deg", Directionality::LowerIsBetter, 1.0),
    def(Formula::KneeValgus(Side::Right), "squat.peak_knee_valgus_right_deg", "Peak knee valgus (right)", "deg", Directionality::LowerIsBetter, 1.0),
    def(Formula::Repetitions, "squat.repetitions", "Repetitions", "count", Directionality::Unknown, 1.0),
];

fn definitions(test_type: TestType) -> &'static [Definition] {
    match test_type {
        TestType::Gait => GAIT,
        TestType::Squat => SQUAT,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricConfig {
    pub events: EventConfig,
    /// Per-metric threshold overrides keyed by metric key.
    pub thresholds: HashMap<String, f64>,
}

/// Computes the fixed, ordered metric set of one test type.
///
/// Every metric is a pure function of the frames inside the analysis window;
/// a metric that cannot be measured is `None`, never estimated.
pub struct MetricExtractor {
    test_type: TestType,
    config: MetricConfig,
}

impl MetricExtractor {
    pub fn new(test_type: TestType, config: MetricConfig) -> Self {
        Self { test_type, config }
    }

    pub fn catalog(&self) -> Vec<MetricSpec> {
        definitions(self.test_type)
            .iter()
            .map(|definition| MetricSpec {
                metric: Metric {
                    key: definition.key.to_string(),
                    label: definition.label.to_string(),
                    unit: definition.unit.to_string(),
                    directionality: definition.directionality,
                },
                threshold: self
                    .config
                    .thresholds
                    .get(definition.key)
                    .copied()
                    .unwrap_or(definition.threshold),
            })
            .collect()
    }

    /// Values in catalog order.
    pub fn extract(&self, series: &TrialSeries, window: Range<usize>) -> Vec<MetricValue> {
        let end = window.end.min(series.len());
        let window = window.start.min(end)..end;
        let steps = (self.test_type == TestType::Gait).then(|| self.gait_steps(series, window.clone()));

        definitions(self.test_type)
            .iter()
            .map(|definition| match definition.formula {
                Formula::Cadence => steps.as_ref().map(StepEvents::cadence),
                Formula::StepTimeSymmetry => steps.as_ref().map(StepEvents::symmetry),
                Formula::StancePct(side) => Some(self.stance_pct(series, window.clone(), side)),
                Formula::PelvicDrop => Some(self.peak(series, window.clone(), |g| g.pelvic_tilt())),
                Formula::TrunkLean => Some(self.peak(series, window.clone(), |g| g.trunk_lean())),
                Formula::KneeValgus(side) => {
                    Some(self.peak(series, window.clone(), |g| g.knee_valgus(side)))
                }
                Formula::KneeFlexion => Some(self.peak(series, window.clone(), |g| {
                    let sides: Vec<f64> = [Side::Left, Side::Right]
                        .into_iter()
                        .filter_map(|side| g.knee_flexion(side))
                        .collect();
                    signal::mean(&sides)
                })),
                Formula::Repetitions => Some(self.repetitions(series, window.clone())),
            }
            .unwrap_or_else(MetricValue::missing))
            .collect()
    }

    fn geometry<'a>(&self, frame: &'a Frame) -> FrameGeometry<'a> {
        FrameGeometry::new(frame, self.config.events.min_visibility)
    }

    fn peak<F>(&self, series: &TrialSeries, window: Range<usize>, measure: F) -> MetricValue
    where
        F: Fn(&FrameGeometry<'_>) -> Option<f64>,
    {
        let frames = &series.frames()[window.clone()];
        let values: Vec<f64> = frames
            .iter()
            .filter_map(|frame| measure(&self.geometry(frame)))
            .filter(|value| value.is_finite())
            .collect();
        MetricValue {
            value: values.iter().copied().reduce(f64::max),
            coverage: ratio(values.len(), window.len()),
        }
    }

    fn gait_steps(&self, series: &TrialSeries, window: Range<usize>) -> StepEvents {
        let events = &self.config.events;
        let samples = events.event_signal(TestType::Gait, series);
        let search = events.search(TestType::Gait, series, window.clone());

        let mut steps: Vec<(f64, Side)> = signal::find_extrema(&samples, Extremum::Maximum, &search)
            .into_iter()
            .map(|hit| (hit.index, Side::Left))
            .chain(
                signal::find_extrema(&samples, Extremum::Minimum, &search)
                    .into_iter()
                    .map(|hit| (hit.index, Side::Right)),
            )
            .map(|(index, side)| (time_at(series, signal::refine_index(&samples, index)), side))
            .collect();
        steps.sort_by(|a, b| a.0.total_cmp(&b.0));

        StepEvents {
            steps,
            coverage: signal::coverage(&samples, window),
        }
    }

    /// Mean share of each complete stride spent in stance.
    ///
    /// Relative to the pelvis, the ankle is furthest forward at contact and
    /// furthest back at toe-off; stance runs from one to the other. Only
    /// strides bounded by two contacts inside the window count, so the value
    /// does not depend on where the window cuts the gait cycle.
    fn stance_pct(&self, series: &TrialSeries, window: Range<usize>, side: Side) -> MetricValue {
        let direction = self.travel_direction(series, window.clone());
        let offsets = series.signal(|frame| {
            self.geometry(frame)
                .ankle_offset(side)
                .map(|offset| direction * offset)
        });
        let search = self.config.events.search(TestType::Gait, series, window.clone());
        let events = |kind: Extremum| -> Vec<f64> {
            signal::find_extrema(&offsets, kind, &search)
                .into_iter()
                .map(|hit| time_at(series, signal::refine_index(&offsets, hit.index)))
                .collect()
        };
        let contacts = events(Extremum::Maximum);
        let toe_offs = events(Extremum::Minimum);

        let shares: Vec<f64> = contacts
            .windows(2)
            .filter_map(|stride| {
                let (contact, next_contact) = (stride[0], stride[1]);
                let toe_off = toe_offs
                    .iter()
                    .copied()
                    .find(|time| *time > contact && *time < next_contact)?;
                Some(100.0 * (toe_off - contact) / (next_contact - contact))
            })
            .collect();
        match signal::mean(&shares) {
            Some(value) => MetricValue {
                value: Some(value),
                coverage: signal::coverage(&offsets, window),
            },
            None => MetricValue::missing(),
        }
    }

    /// Sign of the pelvis travel along x; treadmill walking counts as +x.
    fn travel_direction(&self, series: &TrialSeries, window: Range<usize>) -> f64 {
        let hips: Vec<f64> = series.frames()[window]
            .iter()
            .filter_map(|frame| self.geometry(frame).mid_hip())
            .map(|point| point.x)
            .collect();
        match (hips.first(), hips.last()) {
            (Some(first), Some(last)) if (last - first).abs() >= MIN_TRAVEL => (last - first).signum(),
            _ => 1.0,
        }
    }

    fn repetitions(&self, series: &TrialSeries, window: Range<usize>) -> MetricValue {
        let events = &self.config.events;
        let samples = events.event_signal(TestType::Squat, series);
        let coverage = signal::coverage(&samples, window.clone());
        if coverage == 0.0 {
            return MetricValue::missing();
        }
        let search = events.search(TestType::Squat, series, window);
        let count = signal::find_extrema(&samples, Extremum::Maximum, &search).len();
        MetricValue {
            value: Some(count as f64),
            coverage,
        }
    }
}

struct StepEvents {
    /// Refined event times with the foot that just landed in front.
    steps: Vec<(f64, Side)>,
    coverage: f64,
}

impl StepEvents {
    fn cadence(&self) -> MetricValue {
        let intervals: Vec<f64> = self.steps.windows(2).map(|pair| pair[1].0 - pair[0].0).collect();
        let value = signal::mean(&intervals)
            .filter(|mean| *mean > 0.0)
            .map(|mean| 60_000.0 / mean);
        MetricValue {
            value,
            coverage: if value.is_some() { self.coverage } else { 0.0 },
        }
    }

    /// `|L − R| / mean(L, R) × 100` over the mean step times ending on each
    /// foot. Intervals spanning a missed step are skipped.
    fn symmetry(&self) -> MetricValue {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for pair in self.steps.windows(2) {
            let ((start, from), (end, to)) = (pair[0], pair[1]);
            if from == to {
                continue;
            }
            match to {
                Side::Left => left.push(end - start),
                Side::Right => right.push(end - start),
            }
        }
        let value = match (signal::mean(&left), signal::mean(&right)) {
            (Some(l), Some(r)) if l + r > 0.0 => Some((l - r).abs() / ((l + r) / 2.0) * 100.0),
            _ => None,
        };
        MetricValue {
            value,
            coverage: if value.is_some() { self.coverage } else { 0.0 },
        }
    }
}

/// Timestamp at a fractional frame position.
fn time_at(series: &TrialSeries, position: f64) -> f64 {
    let frames = series.frames();
    let base = position.floor().max(0.0) as usize;
    let fraction = position - base as f64;
    match (frames.get(base), frames.get(base + 1)) {
        (Some(current), Some(next)) => {
            current.timestamp_ms + fraction * (next.timestamp_ms - current.timestamp_ms)
        }
        (Some(current), None) => current.timestamp_ms + fraction * series.frame_interval_ms(),
        _ => position * series.frame_interval_ms(),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::View;
    use crate::trial::fixtures::{pose_from, series_from};
    use motion_compare_types::{Joint, PoseLandmarks};

    fn walker(cadence_spm: f64, travel_per_s: f64) -> impl FnMut(f64) -> Option<PoseLandmarks> {
        let stride_ms = 2.0 * 60_000.0 / cadence_spm;
        move |t| {
            let hip_x = 0.3 + travel_per_s * t / 1000.0;
            let swing = 0.1 * (2.0 * std::f64::consts::PI * (t - 150.0) / stride_ms).sin();
            Some(pose_from(|joint| match joint {
                Joint::LeftAnkle => (hip_x + swing, 0.9),
                Joint::RightAnkle => (hip_x - swing, 0.9),
                Joint::LeftKnee => (hip_x + swing / 2.0 + 0.02, 0.7),
                Joint::RightKnee => (hip_x - swing / 2.0 - 0.02, 0.7),
                Joint::LeftHip => (hip_x + 0.02, 0.5),
                Joint::RightHip => (hip_x - 0.02, 0.5),
                Joint::LeftShoulder => (hip_x + 0.05, 0.3),
                Joint::RightShoulder => (hip_x - 0.03, 0.3),
                _ => (hip_x, 0.2),
            }))
        }
    }

    fn value(extractor: &MetricExtractor, values: &[MetricValue], key: &str) -> Option<f64> {
        let position = extractor
            .catalog()
            .iter()
            .position(|spec| spec.metric.key == key)
            .unwrap();
        values[position].value
    }

    #[test]
    fn catalog_order_is_fixed_and_overridable() {
        let mut config = MetricConfig::default();
        config.thresholds.insert("gait.cadence_spm".into(), 3.0);
        let extractor = MetricExtractor::new(TestType::Gait, config);
        let catalog = extractor.catalog();
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog[0].metric.key, "gait.cadence_spm");
        assert_eq!(catalog[0].threshold, 3.0);
        assert_eq!(catalog[1].threshold, DEFAULT_THRESHOLD);
        let squat = MetricExtractor::new(TestType::Squat, MetricConfig::default()).catalog();
        assert_eq!(squat[0].metric.key, "squat.peak_knee_flexion_deg");
        assert_eq!(squat[0].threshold, 2.0);
    }

    #[test]
    fn cadence_matches_synthetic_stride() {
        let series = series_from(30.0, 300, View::Sagittal, walker(108.0, 0.0));
        let extractor = MetricExtractor::new(TestType::Gait, MetricConfig::default());
        let values = extractor.extract(&series, 0..300);
        let cadence = value(&extractor, &values, "gait.cadence_spm").unwrap();
        assert!((cadence - 108.0).abs() < 0.05, "cadence {cadence}");
        let symmetry = value(&extractor, &values, "gait.step_time_symmetry_pct").unwrap();
        assert!(symmetry < 0.5, "symmetry {symmetry}");
        assert_eq!(values[0].coverage, 1.0);
    }

    #[test]
    fn stance_share_is_half_on_a_treadmill() {
        let series = series_from(30.0, 300, View::Sagittal, walker(100.0, 0.0));
        let extractor = MetricExtractor::new(TestType::Gait, MetricConfig::default());
        let values = extractor.extract(&series, 0..300);
        let left = value(&extractor, &values, "gait.stance_pct_left").unwrap();
        let right = value(&extractor, &values, "gait.stance_pct_right").unwrap();
        assert!((left - 50.0).abs() < 0.5, "left stance {left}");
        assert!((right - 50.0).abs() < 0.5, "right stance {right}");
    }

    #[test]
    fn stance_share_ignores_partial_strides_at_window_edges() {
        let series = series_from(30.0, 300, View::Sagittal, walker(100.0, 0.1));
        let extractor = MetricExtractor::new(TestType::Gait, MetricConfig::default());
        let stance = |window: Range<usize>| {
            let values = extractor.extract(&series, window);
            value(&extractor, &values, "gait.stance_pct_left").unwrap()
        };
        let whole = stance(0..300);
        for window in [7..300, 0..281, 20..251] {
            let cut = stance(window.clone());
            assert!((cut - whole).abs() < 0.5, "{window:?}: {cut} vs {whole}");
        }
    }

    #[test]
    fn geometric_peaks_follow_pose() {
        let series = series_from(30.0, 120, View::Frontal, walker(100.0, 0.0));
        let extractor = MetricExtractor::new(TestType::Gait, MetricConfig::default());
        let values = extractor.extract(&series, 0..120);
        let lean = value(&extractor, &values, "gait.peak_trunk_lean_deg").unwrap();
        let expected = (0.01f64).atan2(0.2).to_degrees();
        assert!((lean - expected).abs() < 1e-6, "lean {lean}");
        assert_eq!(value(&extractor, &values, "gait.peak_pelvic_drop_deg"), Some(0.0));
    }

    #[test]
    fn missing_poses_yield_missing_values() {
        let series = series_from(30.0, 90, View::Sagittal, |_| None);
        let extractor = MetricExtractor::new(TestType::Gait, MetricConfig::default());
        let values = extractor.extract(&series, 0..90);
        assert!(values.iter().all(|metric| metric.value.is_none()));
        assert!(values.iter().all(|metric| metric.coverage == 0.0));
    }

    #[test]
    fn squat_depth_and_repetitions() {
        // two squats of 3 s each, bottom at 1.5 s and 4.5 s
        let series = series_from(30.0, 180, View::Frontal, |t| {
            let depth = 0.5 - 0.5 * (2.0 * std::f64::consts::PI * t / 3000.0).cos();
            let hip_y = 0.5 + 0.15 * depth;
            let knee_x = 0.1 * depth;
            Some(pose_from(|joint| match joint {
                Joint::LeftHip => (0.55, hip_y),
                Joint::RightHip => (0.45, hip_y),
                Joint::LeftKnee => (0.55 + knee_x, 0.7),
                Joint::RightKnee => (0.45 - knee_x, 0.7),
                Joint::LeftAnkle => (0.55, 0.9),
                Joint::RightAnkle => (0.45, 0.9),
                Joint::LeftShoulder => (0.55, hip_y - 0.2),
                Joint::RightShoulder => (0.45, hip_y - 0.2),
                _ => (0.5, 0.1),
            }))
        });
        let extractor = MetricExtractor::new(TestType::Squat, MetricConfig::default());
        let values = extractor.extract(&series, 0..180);
        assert_eq!(value(&extractor, &values, "squat.repetitions"), Some(2.0));
        let flexion = value(&extractor, &values, "squat.peak_knee_flexion_deg").unwrap();
        assert!(flexion > 20.0, "flexion {flexion}");
        // knees travel outwards, never medial
        assert_eq!(value(&extractor, &values, "squat.peak_knee_valgus_left_deg"), Some(0.0));
    }
}
