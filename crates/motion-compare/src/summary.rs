use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::delta::{DeltaStatus, MetricDelta};
use crate::metrics::METRIC_FORMULA_VERSION;
use crate::quality::{QualityReport, WarningCode};
use crate::sync::SynchronizationMap;
use crate::trial::TestType;

const MISSING: &str = "n/a";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub improvements: Vec<String>,
    pub still_to_improve: Vec<String>,
    pub key_findings: Vec<String>,
    pub metrics_table_markdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_text: Option<String>,
    pub limitations: Vec<String>,
}

/// Renders the human-readable parts of a comparison from its deltas.
pub struct SummaryGenerator {
    test_type: TestType,
}

impl SummaryGenerator {
    pub fn new(test_type: TestType) -> Self {
        Self { test_type }
    }

    pub fn generate(
        &self,
        deltas: &[MetricDelta],
        quality: &QualityReport,
        synchronization: &SynchronizationMap,
    ) -> Summary {
        let labels_with = |wanted: &[DeltaStatus]| -> Vec<String> {
            deltas
                .iter()
                .filter(|delta| wanted.contains(&delta.status))
                .map(|delta| delta.metric.label.clone())
                .collect()
        };

        Summary {
            improvements: labels_with(&[DeltaStatus::Improved]),
            still_to_improve: labels_with(&[DeltaStatus::Worse, DeltaStatus::Unchanged]),
            key_findings: deltas.iter().filter_map(finding).collect(),
            metrics_table_markdown: metrics_table(deltas),
            technical_text: Some(self.technical_text(deltas, quality, synchronization)),
            patient_text: Some(self.patient_text(deltas)),
            limitations: limitations(deltas, quality),
        }
    }

    fn technical_text(
        &self,
        deltas: &[MetricDelta],
        quality: &QualityReport,
        synchronization: &SynchronizationMap,
    ) -> String {
        let count = |status: DeltaStatus| deltas.iter().filter(|d| d.status == status).count();
        format!(
            "{} comparison synchronized in {} mode on {} (offset {:.1} ms, warp {}). \
             {} improved, {} worse, {} unchanged, {} not assessable. \
             Overall data confidence {:.2}; formulas {}.",
            self.test_type.as_str().to_ascii_uppercase(),
            synchronization.mode,
            synchronization.anchor_a.kind.as_str(),
            synchronization.offset_ms,
            synchronization.warp_method,
            count(DeltaStatus::Improved),
            count(DeltaStatus::Worse),
            count(DeltaStatus::Unchanged),
            count(DeltaStatus::Na),
            quality.overall_confidence,
            METRIC_FORMULA_VERSION,
        )
    }

    fn patient_text(&self, deltas: &[MetricDelta]) -> String {
        let movement = match self.test_type {
            TestType::Gait => "walking",
            TestType::Squat => "squat",
        };
        let lowered = |status: DeltaStatus| -> Vec<String> {
            deltas
                .iter()
                .filter(|d| d.status == status)
                .map(|d| d.metric.label.to_lowercase())
                .collect()
        };
        let improved = lowered(DeltaStatus::Improved);
        let worse = lowered(DeltaStatus::Worse);

        let mut text = String::new();
        if improved.is_empty() {
            let _ = write!(
                text,
                "Your {movement} measurements are similar to your first assessment."
            );
        } else {
            let _ = write!(
                text,
                "Since your first assessment your {movement} has improved in: {}.",
                improved.join(", ")
            );
        }
        if !worse.is_empty() {
            let _ = write!(text, " Areas to keep working on: {}.", worse.join(", "));
        }
        text
    }
}

fn finding(delta: &MetricDelta) -> Option<String> {
    let verb = match delta.status {
        DeltaStatus::Improved => "improved",
        DeltaStatus::Worse => "worsened",
        DeltaStatus::Unchanged | DeltaStatus::Na => return None,
    };
    Some(format!(
        "{} {verb} from {} to {} {} ({}).",
        delta.metric.label,
        format_value(delta.value_a),
        format_value(delta.value_b),
        delta.metric.unit,
        format_signed(delta.delta),
    ))
}

/// One row per delta, in the order given.
pub fn metrics_table(deltas: &[MetricDelta]) -> String {
    let mut table = String::from("| Metric | A | B | Delta | Status |\n|---|---|---|---|---|\n");
    for delta in deltas {
        let _ = writeln!(
            table,
            "| {} ({}) | {} | {} | {} | {} |",
            delta.metric.label,
            delta.metric.unit,
            format_value(delta.value_a),
            format_value(delta.value_b),
            format_signed(delta.delta),
            delta.status.as_str(),
        );
    }
    table
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.1}"),
        None => MISSING.to_string(),
    }
}

fn format_signed(value: Option<f64>) -> String {
    match value {
        Some(value) if (value * 10.0).round() == 0.0 => "0.0".to_string(),
        Some(value) => format!("{value:+.1}"),
        None => MISSING.to_string(),
    }
}

fn limitations(deltas: &[MetricDelta], quality: &QualityReport) -> Vec<String> {
    let mut items = vec![
        "Measurements come from 2-D monocular video; out-of-plane motion is not captured."
            .to_string(),
        format!(
            "Metric formulas ({METRIC_FORMULA_VERSION}) are standard 2-D definitions pending clinical validation."
        ),
    ];
    let missing = deltas
        .iter()
        .filter(|delta| delta.value_a.is_none() || delta.value_b.is_none())
        .count();
    if missing > 0 {
        items.push(format!(
            "{missing} metric(s) could not be measured in at least one trial."
        ));
    }
    items.extend(
        quality
            .warnings
            .iter()
            .filter(|warning| {
                matches!(
                    warning.code,
                    WarningCode::HighOcclusion | WarningCode::ModelTimeouts | WarningCode::ViewMismatch
                )
            })
            .map(|warning| warning.message.clone()),
    );
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Thresholds;
    use crate::metrics::{Directionality, Metric};
    use crate::quality::TrialQuality;
    use crate::sync::{AnchorEvent, AnchorType, SyncMode, WarpMethod};

    fn delta(label: &str, a: Option<f64>, b: Option<f64>, status: DeltaStatus) -> MetricDelta {
        MetricDelta {
            metric: Metric {
                key: format!("gait.{}", label.to_lowercase()),
                label: label.to_string(),
                unit: "deg".into(),
                directionality: Directionality::LowerIsBetter,
            },
            value_a: a,
            value_b: b,
            delta: a.zip(b).map(|(a, b)| b - a),
            status,
            confidence: 0.8,
            thresholds: Thresholds { absolute: 1.0 },
        }
    }

    fn quality() -> QualityReport {
        let trial = TrialQuality {
            sampled_frames: 100,
            detected_frames: 100,
            detection_rate: 1.0,
            mean_visibility: 0.9,
            confidence: 0.9,
            occlusion_pct: 0.0,
            timeouts: 0,
        };
        QualityReport {
            overall_confidence: 0.9,
            trial_a: trial.clone(),
            trial_b: trial,
            warnings: Vec::new(),
        }
    }

    fn sync() -> SynchronizationMap {
        let anchor = AnchorEvent {
            kind: AnchorType::GaitInitialContact,
            frame_index: 3,
            timestamp_ms: 100.0,
            confidence: 0.9,
        };
        SynchronizationMap {
            mode: SyncMode::Auto,
            anchor_a: anchor,
            anchor_b: anchor,
            key_moment_pairs: Vec::new(),
            warp_method: WarpMethod::None,
            offset_ms: 0.0,
        }
    }

    fn deltas() -> Vec<MetricDelta> {
        vec![
            delta("Lean", Some(10.0), Some(8.0), DeltaStatus::Improved),
            delta("Drop", Some(4.0), Some(4.3), DeltaStatus::Unchanged),
            delta("Valgus", Some(3.0), Some(6.04), DeltaStatus::Worse),
            delta("Stance", Some(60.0), None, DeltaStatus::Na),
        ]
    }

    #[test]
    fn table_has_one_row_per_metric_in_order() {
        let table = metrics_table(&deltas());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2 + 4);
        assert_eq!(lines[0], "| Metric | A | B | Delta | Status |");
        assert!(lines[2].starts_with("| Lean (deg) | 10.0 | 8.0 | -2.0 | IMPROVED |"));
        assert!(lines[3].starts_with("| Drop (deg)"));
        assert_eq!(lines[4], "| Valgus (deg) | 3.0 | 6.0 | +3.0 | WORSE |");
        assert_eq!(lines[5], "| Stance (deg) | 60.0 | n/a | n/a | NA |");
    }

    #[test]
    fn buckets_follow_status() {
        let summary = SummaryGenerator::new(TestType::Gait).generate(&deltas(), &quality(), &sync());
        assert_eq!(summary.improvements, vec!["Lean"]);
        assert_eq!(summary.still_to_improve, vec!["Drop", "Valgus"]);
        assert_eq!(summary.key_findings.len(), 2);
        assert!(summary.key_findings[0].starts_with("Lean improved from 10.0 to 8.0"));
        assert!(summary.key_findings[1].starts_with("Valgus worsened"));
        assert!(summary.limitations.iter().any(|item| item.contains("kinematics.v1")));
        assert!(summary.limitations.iter().any(|item| item.starts_with("1 metric(s)")));
        let patient = summary.patient_text.unwrap();
        assert!(patient.contains("improved in: lean"));
        assert!(patient.contains("keep working on: valgus"));
    }

    #[test]
    fn technical_text_reports_counts() {
        let summary = SummaryGenerator::new(TestType::Gait).generate(&deltas(), &quality(), &sync());
        let text = summary.technical_text.unwrap();
        assert!(text.starts_with("GAIT comparison synchronized in auto mode on initial contact"));
        assert!(text.contains("1 improved, 1 worse, 1 unchanged, 1 not assessable"));
    }
}
