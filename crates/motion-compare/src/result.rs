use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delta::MetricDelta;
use crate::error::AnalysisResult;
use crate::metrics::METRIC_FORMULA_VERSION;
use crate::quality::QualityReport;
use crate::summary::Summary;
use crate::sync::SynchronizationMap;
use crate::trial::{Protocol, TestType, TrialSeries};

pub const SCHEMA_VERSION: &str = "1.0";
pub const COMPARE_TYPE: &str = "DYNAMIC_COMPARE";

pub const DEFAULT_DISCLAIMER: &str = "Automated 2-D video analysis for clinical follow-up. \
     It does not replace a clinical examination or constitute a diagnosis.";

/// Serializers that round measured values when the result is written out.
/// Values are kept at full precision in memory.
pub mod round {
    use serde::Serializer;

    pub fn to_decimals(value: f64, decimals: i32) -> f64 {
        let factor = 10f64.powi(decimals);
        let rounded = (value * factor).round() / factor;
        // avoid "-0.0" in the artifact
        if rounded == 0.0 {
            0.0
        } else {
            rounded
        }
    }

    pub fn one_decimal<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_decimals(*value, 1))
    }

    pub fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_decimals(*value, 2))
    }

    pub fn one_decimal_opt<S: Serializer>(
        value: &Option<f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&to_decimals(*value, 1)),
            None => serializer.serialize_none(),
        }
    }
}

/// Trial metadata carried in the artifact. Raw video never leaves the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialInfo {
    pub source_asset_id: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub protocol: Protocol,
    pub sampled_frames: usize,
    pub detected_frames: usize,
}

impl TrialInfo {
    pub fn from_series(series: &TrialSeries) -> Self {
        Self {
            source_asset_id: series.source_asset_id().to_string(),
            captured_at: series.captured_at(),
            protocol: series.protocol(),
            sampled_frames: series.len(),
            detected_frames: series.detected_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub schema_version: String,
    pub compare_type: String,
    pub test_type: TestType,
    #[serde(rename = "trial_A")]
    pub trial_a: TrialInfo,
    #[serde(rename = "trial_B")]
    pub trial_b: TrialInfo,
    pub synchronization: SynchronizationMap,
    pub metric_deltas: Vec<MetricDelta>,
    pub summary: Summary,
    pub quality: QualityReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    pub metric_formula_version: String,
}

impl ComparisonResult {
    pub fn new(
        test_type: TestType,
        trial_a: &TrialSeries,
        trial_b: &TrialSeries,
        synchronization: SynchronizationMap,
        metric_deltas: Vec<MetricDelta>,
        summary: Summary,
        quality: QualityReport,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            compare_type: COMPARE_TYPE.to_string(),
            test_type,
            trial_a: TrialInfo::from_series(trial_a),
            trial_b: TrialInfo::from_series(trial_b),
            synchronization,
            metric_deltas,
            summary,
            quality,
            tags: Vec::new(),
            disclaimer: None,
            metric_formula_version: METRIC_FORMULA_VERSION.to_string(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_disclaimer(mut self, disclaimer: Option<String>) -> Self {
        self.disclaimer = disclaimer;
        self
    }

    pub fn to_json(&self, pretty: bool) -> AnalysisResult<String> {
        let encoded = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(encoded)
    }

    pub fn from_json(json: &str) -> AnalysisResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
