use serde::{Deserialize, Serialize};

use crate::metrics::{Directionality, Metric, MetricSpec, MetricValue};
use crate::result::round;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaStatus {
    Improved,
    Worse,
    Unchanged,
    Na,
}

impl DeltaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaStatus::Improved => "IMPROVED",
            DeltaStatus::Worse => "WORSE",
            DeltaStatus::Unchanged => "UNCHANGED",
            DeltaStatus::Na => "NA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub absolute: f64,
}

/// Change of one metric between trial A and trial B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    #[serde(flatten)]
    pub metric: Metric,
    #[serde(rename = "value_A", serialize_with = "round::one_decimal_opt")]
    pub value_a: Option<f64>,
    #[serde(rename = "value_B", serialize_with = "round::one_decimal_opt")]
    pub value_b: Option<f64>,
    /// `value_B − value_A` on unrounded values.
    #[serde(serialize_with = "round::one_decimal_opt")]
    pub delta: Option<f64>,
    pub status: DeltaStatus,
    #[serde(serialize_with = "round::two_decimals")]
    pub confidence: f64,
    pub thresholds: Thresholds,
}

/// Status of a change from `value_a` to `value_b`.
///
/// Changes smaller than `threshold` are `Unchanged`; metrics without a
/// known better direction or without both values are `Na`.
pub fn classify(
    directionality: Directionality,
    value_a: Option<f64>,
    value_b: Option<f64>,
    threshold: f64,
) -> DeltaStatus {
    let (Some(a), Some(b)) = (value_a, value_b) else {
        return DeltaStatus::Na;
    };
    if directionality == Directionality::Unknown {
        return DeltaStatus::Na;
    }
    let delta = b - a;
    if delta.abs() < threshold {
        return DeltaStatus::Unchanged;
    }
    let improved = match directionality {
        Directionality::LowerIsBetter => delta < 0.0,
        Directionality::HigherIsBetter => delta > 0.0,
        Directionality::CloserToZeroIsBetter => b.abs() < a.abs(),
        Directionality::Unknown => return DeltaStatus::Na,
    };
    if improved {
        DeltaStatus::Improved
    } else {
        DeltaStatus::Worse
    }
}

/// Turns paired metric values into deltas. Confidence combines the weaker
/// trial's data quality with the weaker metric coverage.
#[derive(Debug, Clone, Copy)]
pub struct DeltaCalculator {
    confidence_a: f64,
    confidence_b: f64,
}

impl DeltaCalculator {
    pub fn new(confidence_a: f64, confidence_b: f64) -> Self {
        Self {
            confidence_a,
            confidence_b,
        }
    }

    pub fn compute(&self, spec: &MetricSpec, value_a: MetricValue, value_b: MetricValue) -> MetricDelta {
        let status = classify(
            spec.metric.directionality,
            value_a.value,
            value_b.value,
            spec.threshold,
        );
        let delta = match (value_a.value, value_b.value) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        };
        let confidence = self.confidence_a.min(self.confidence_b)
            * value_a.coverage.min(value_b.coverage);
        MetricDelta {
            metric: spec.metric.clone(),
            value_a: value_a.value,
            value_b: value_b.value,
            delta,
            status,
            confidence: confidence.clamp(0.0, 1.0),
            thresholds: Thresholds {
                absolute: spec.threshold,
            },
        }
    }

    /// Deltas in catalog order.
    pub fn compute_all(
        &self,
        catalog: &[MetricSpec],
        values_a: &[MetricValue],
        values_b: &[MetricValue],
    ) -> Vec<MetricDelta> {
        catalog
            .iter()
            .zip(values_a.iter().zip(values_b))
            .map(|(spec, (a, b))| self.compute(spec, *a, *b))
            .collect()
    }
}
